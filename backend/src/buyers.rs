use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Form};
use log::info;
use serde::Serialize;

use crate::ads::owned_ad;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::forms::{self, ContactForm, ValidationErrors};
use crate::i18n::Locale;
use crate::models::{Ad, AdSearch, AdSearchResult, EntityKind, Id, UserId};
use crate::notify::Notification;
use crate::state::AppState;
use crate::views::{Flash, Outcome, Redirect};

#[derive(Debug, Serialize)]
pub struct ContactedBuyer {
    pub result: AdSearchResult,
    pub buyer: UserId,
}

#[derive(Debug, Serialize)]
pub struct PendingBuyer {
    pub result: AdSearchResult,
    pub buyer: UserId,
    pub form: ContactForm,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

#[derive(Debug, Serialize)]
pub struct BuyersPage {
    pub ad: Ad,
    pub contacted: Vec<ContactedBuyer>,
    pub not_contacted: Vec<PendingBuyer>,
}

pub fn listing_url(ad: Id) -> String {
    format!("/ads/{}/buyers", ad)
}

pub fn contact_url(result: Id) -> String {
    format!("/buyers/contact/{}", result)
}

/// Rejected contact attempt, shown again on its row.
struct RowErrors {
    result: Id,
    form: ContactForm,
    errors: ValidationErrors,
}

async fn listing(
    state: &AppState,
    ad: Ad,
    mut failed: Option<RowErrors>,
) -> Result<BuyersPage, AppError> {
    let mut contacted = Vec::new();
    let mut not_contacted = Vec::new();

    for result in state.stores.results.for_target(ad.entity_ref()).await? {
        let Some(search) = state
            .stores
            .searches
            .get(result.ad_search)
            .await?
            .filter(|search| search.public)
        else {
            continue;
        };
        if result.contacted {
            contacted.push(ContactedBuyer {
                result,
                buyer: search.user,
            });
            continue;
        }

        let (form, errors) = match failed.take() {
            Some(row) if row.result == result.id => (row.form, Some(row.errors)),
            other => {
                failed = other;
                (ContactForm::default(), None)
            }
        };
        not_contacted.push(PendingBuyer {
            action: contact_url(result.id),
            result,
            buyer: search.user,
            form,
            errors,
        });
    }

    Ok(BuyersPage {
        ad,
        contacted,
        not_contacted,
    })
}

/// GET /ads/:id/buyers
pub async fn list_buyers(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Id>,
) -> Result<Outcome<BuyersPage>, AppError> {
    let ad = owned_ad(&state, user, id).await?;
    listing(&state, ad, None).await.map(Outcome::Render)
}

/// Result, ad and public search behind `result_id`, provided the ad is `user`'s.
async fn resolve(
    state: &AppState,
    user: UserId,
    result_id: Id,
) -> Result<(AdSearchResult, Ad, AdSearch), AppError> {
    let result = state
        .stores
        .results
        .get(result_id)
        .await?
        .filter(|result| result.target.kind == EntityKind::Ad)
        .ok_or(AppError::NotFound)?;
    let ad = owned_ad(state, user, result.target.id).await?;
    let search = state
        .stores
        .searches
        .get(result.ad_search)
        .await?
        .filter(|search| search.public)
        .ok_or(AppError::NotFound)?;
    Ok((result, ad, search))
}

/// POST /buyers/contact/:adsearchresult_id
pub async fn contact_buyer(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(result_id): Path<Id>,
    headers: HeaderMap,
    Form(form): Form<ContactForm>,
) -> Result<Outcome<BuyersPage>, AppError> {
    let (mut result, ad, ad_search) = resolve(&state, user, result_id).await?;
    let locale = Locale::from_headers(&headers);

    if result.contacted {
        return Ok(Outcome::Redirect(
            Redirect::to(listing_url(ad.id))
                .with(Flash::warning(locale.buyer_already_contacted())),
        ));
    }

    if let Err(errors) = forms::validate(&form) {
        let failed = RowErrors {
            result: result.id,
            form,
            errors,
        };
        return listing(&state, ad, Some(failed)).await.map(Outcome::Rejected);
    }

    result.contacted = true;
    state.stores.results.update(&result).await?;
    info!(
        "User {} contacted buyer {} about ad {}",
        user, ad_search.user, ad.id
    );
    let location = listing_url(ad.id);
    state.notifier.notify(Notification::VendorMessage {
        buyer: ad_search.user,
        ad,
        ad_search,
        message: form.message,
    });

    Ok(Outcome::Redirect(
        Redirect::to(location).with(Flash::info(locale.buyer_contacted())),
    ))
}
