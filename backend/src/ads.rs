use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Form};
use chrono::Utc;
use log::{error, info};
use serde::Serialize;

use crate::auth::{CurrentUser, Viewer};
use crate::error::AppError;
use crate::filter::QueryParams;
use crate::forms::{
    self, AdForm, AdSubmission, ContactForm, FormSetErrors, PictureChange, PictureFormSet,
    ValidationErrors, MAX_PICTURES, NON_FIELD_ERRORS,
};
use crate::geocode::GeoInfo;
use crate::i18n::Locale;
use crate::matching;
use crate::models::{Ad, AdPicture, EntityRef, Id, NewAd, NewAdContact, NewAdPicture, UserId};
use crate::notify::Notification;
use crate::slug::unique_slug;
use crate::state::AppState;
use crate::views::{Flash, Outcome, Redirect};

pub const COMPLETE_URL: &str = "/ads/complete";

#[derive(Debug, Serialize)]
pub struct AdDetailPage {
    pub ad: Ad,
    pub pictures: Vec<AdPicture>,
    pub contact_form: ContactForm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
    pub sent_mail: bool,
    pub messages: Vec<Flash>,
}

#[derive(Debug, Serialize)]
pub struct AdFormPage {
    /// `None` while creating.
    pub ad: Option<Ad>,
    pub form: AdForm,
    pub pictures: Vec<AdPicture>,
    pub picture_forms: PictureFormSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture_errors: Option<FormSetErrors>,
}

#[derive(Debug, Serialize)]
pub struct AdDeletePage {
    pub ad: Ad,
}

#[derive(Debug, Serialize)]
pub struct AdCompletePage {
    pub user: UserId,
    pub account_url: String,
}

async fn pictures_of(state: &AppState, ad: &Ad) -> Result<Vec<AdPicture>, AppError> {
    Ok(state.stores.pictures.for_target(ad.entity_ref()).await?)
}

/// Ad as seen by `viewer`: deleted ads are gone, hidden ones only show to their owner.
async fn viewable_ad(state: &AppState, id: Id, viewer: Option<UserId>) -> Result<Ad, AppError> {
    let ad = state
        .stores
        .ads
        .get(id)
        .await?
        .filter(|ad| !ad.is_deleted())
        .ok_or(AppError::NotFound)?;
    if !ad.visible && viewer != Some(ad.user) {
        return Err(AppError::NotFound);
    }
    Ok(ad)
}

pub(crate) async fn owned_ad(state: &AppState, user: UserId, id: Id) -> Result<Ad, AppError> {
    state
        .stores
        .ads
        .get_owned(user, id)
        .await?
        .filter(|ad| !ad.is_deleted())
        .ok_or(AppError::NotFound)
}

/// GET /ads/:id
pub async fn ad_detail(
    State(state): State<AppState>,
    Extension(Viewer(viewer)): Extension<Viewer>,
    Path(id): Path<Id>,
) -> Result<Outcome<AdDetailPage>, AppError> {
    let ad = viewable_ad(&state, id, viewer).await?;
    let pictures = pictures_of(&state, &ad).await?;
    Ok(Outcome::Render(AdDetailPage {
        ad,
        pictures,
        contact_form: ContactForm::default(),
        errors: None,
        sent_mail: false,
        messages: Vec::new(),
    }))
}

/// POST /ads/:id
pub async fn contact_owner(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<Id>,
    headers: HeaderMap,
    Form(contact_form): Form<ContactForm>,
) -> Result<Outcome<AdDetailPage>, AppError> {
    let sender = viewer.require()?;
    let ad = viewable_ad(&state, id, Some(sender)).await?;
    let pictures = pictures_of(&state, &ad).await?;
    let locale = Locale::from_headers(&headers);

    let mut errors = forms::validate(&contact_form).err().unwrap_or_default();
    if sender == ad.user {
        errors.add(NON_FIELD_ERRORS, locale.own_ad_contact());
    }
    if !errors.is_empty() {
        return Ok(Outcome::Rejected(AdDetailPage {
            ad,
            pictures,
            contact_form,
            errors: Some(errors),
            sent_mail: false,
            messages: Vec::new(),
        }));
    }

    let recipient = state
        .registry
        .owner_of(ad.entity_ref())
        .await?
        .ok_or(AppError::NotFound)?;
    state
        .stores
        .contacts
        .insert(NewAdContact {
            user: sender,
            target: ad.entity_ref(),
            message: contact_form.message.clone(),
        })
        .await?;
    info!("User {} contacted owner of ad {}", sender, ad.id);
    state.notifier.notify(Notification::UserMessage {
        ad: ad.clone(),
        sender,
        recipient,
        message: contact_form.message,
    });

    Ok(Outcome::Render(AdDetailPage {
        ad,
        pictures,
        contact_form: ContactForm::default(),
        errors: None,
        sent_mail: true,
        messages: vec![Flash::info(locale.message_sent())],
    }))
}

/// GET /ads/new
pub async fn new_ad(
    Extension(CurrentUser(_)): Extension<CurrentUser>,
) -> Result<Outcome<AdFormPage>, AppError> {
    Ok(Outcome::Render(AdFormPage {
        ad: None,
        form: AdForm {
            visible: true,
            ..AdForm::default()
        },
        pictures: Vec::new(),
        picture_forms: PictureFormSet::default(),
        errors: None,
        picture_errors: None,
    }))
}

/// Picture rows may only touch pictures of this ad, and the ad keeps at most
/// [`MAX_PICTURES`] of them.
fn check_pictures(existing: &[AdPicture], changes: &[PictureChange]) -> Result<(), FormSetErrors> {
    let mut count = existing.len();
    for change in changes {
        let id = match change {
            PictureChange::Add { .. } => {
                count += 1;
                continue;
            }
            PictureChange::Edit { id, .. } => *id,
            PictureChange::Remove { id } => {
                count = count.saturating_sub(1);
                *id
            }
        };
        if !existing.iter().any(|picture| picture.id == id) {
            return Err(FormSetErrors::non_form("Select a valid choice."));
        }
    }
    if count > MAX_PICTURES {
        return Err(FormSetErrors::non_form(format!(
            "Please submit {} or fewer pictures.",
            MAX_PICTURES
        )));
    }
    Ok(())
}

async fn apply_pictures(
    state: &AppState,
    target: EntityRef,
    existing: Vec<AdPicture>,
    changes: Vec<PictureChange>,
) -> Result<(), AppError> {
    let mut existing: HashMap<Id, AdPicture> =
        existing.into_iter().map(|picture| (picture.id, picture)).collect();
    for change in changes {
        match change {
            PictureChange::Add { image, title } => {
                state
                    .stores
                    .pictures
                    .insert(NewAdPicture { target, image, title })
                    .await?;
            }
            PictureChange::Edit { id, image, title } => {
                if let Some(mut picture) = existing.remove(&id) {
                    if let Some(image) = image {
                        picture.image = image;
                    }
                    picture.title = title;
                    state.stores.pictures.update(&picture).await?;
                }
            }
            PictureChange::Remove { id } => state.stores.pictures.delete(id).await?,
        }
    }
    Ok(())
}

/// Validated submission, ready to geocode and persist.
struct ValidAd {
    form: AdForm,
    changes: Vec<PictureChange>,
}

/// Validates both halves of the submission; on failure returns the page to re-render.
fn validate_submission(
    submission: AdSubmission,
    ad: Option<Ad>,
    existing: Vec<AdPicture>,
) -> Result<(ValidAd, Vec<AdPicture>), AdFormPage> {
    let form_result = forms::validate(&submission.form);
    let picture_result = submission
        .pictures
        .clean()
        .and_then(|changes| check_pictures(&existing, &changes).map(|()| changes));

    match (form_result, picture_result) {
        (Ok(()), Ok(changes)) => Ok((
            ValidAd {
                form: submission.form,
                changes,
            },
            existing,
        )),
        (form_result, picture_result) => Err(AdFormPage {
            ad,
            form: submission.form,
            pictures: existing,
            picture_forms: submission.pictures,
            errors: form_result.err(),
            picture_errors: picture_result.err(),
        }),
    }
}

async fn geocode(state: &AppState, address: &str) -> Option<GeoInfo> {
    match state.geocoder.geocode(address).await {
        Ok(info) => Some(info),
        Err(e) => {
            error!("Geocoding {:?} failed: {}", address, e);
            None
        }
    }
}

fn address_not_found(mut page: AdFormPage, locale: Locale) -> Outcome<AdFormPage> {
    page.errors = Some(ValidationErrors::single(
        NON_FIELD_ERRORS,
        locale.address_not_found(),
    ));
    Outcome::Rejected(page)
}

/// POST /ads/new
pub async fn create_ad(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    headers: HeaderMap,
    Form(form): Form<Vec<(String, String)>>,
) -> Result<Outcome<AdFormPage>, AppError> {
    let params: QueryParams = form.into_iter().collect();
    let submission = AdSubmission::bind(&params);

    if let Err(errors) = forms::validate(&submission.form) {
        state
            .notifier
            .notify(Notification::InvalidAdForm { user, errors });
    }
    let (valid, _) = match validate_submission(submission, None, Vec::new()) {
        Ok(valid) => valid,
        Err(page) => return Ok(Outcome::Rejected(page)),
    };

    let Some(geo) = geocode(&state, &valid.form.user_entered_address).await else {
        let page = AdFormPage {
            ad: None,
            form: valid.form,
            pictures: Vec::new(),
            picture_forms: PictureFormSet::bind(&params),
            errors: None,
            picture_errors: None,
        };
        return Ok(address_not_found(page, Locale::from_headers(&headers)));
    };

    let slug = unique_slug(
        &*state.stores.ads,
        valid.form.description.as_deref(),
        &valid.form.user_entered_address,
        None,
    )
    .await?;
    let ad = state
        .stores
        .ads
        .insert(NewAd {
            user,
            slug,
            description: valid.form.description,
            user_entered_address: valid.form.user_entered_address,
            address: geo.address,
            location: geo.location,
            visible: valid.form.visible,
        })
        .await?;
    info!("User {} created ad {} ({})", user, ad.id, ad.slug);

    apply_pictures(&state, ad.entity_ref(), Vec::new(), valid.changes).await?;
    matching::refresh_for_ad(&state.stores, &ad).await?;

    Ok(Outcome::Redirect(Redirect::to(COMPLETE_URL)))
}

/// GET /ads/:id/edit
pub async fn edit_ad(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Id>,
) -> Result<Outcome<AdFormPage>, AppError> {
    let ad = owned_ad(&state, user, id).await?;
    let pictures = pictures_of(&state, &ad).await?;
    Ok(Outcome::Render(AdFormPage {
        form: AdForm::initial(&ad),
        ad: Some(ad),
        pictures,
        picture_forms: PictureFormSet::default(),
        errors: None,
        picture_errors: None,
    }))
}

/// POST /ads/:id/edit
pub async fn update_ad(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Id>,
    headers: HeaderMap,
    Form(form): Form<Vec<(String, String)>>,
) -> Result<Outcome<AdFormPage>, AppError> {
    let mut ad = owned_ad(&state, user, id).await?;
    let existing = pictures_of(&state, &ad).await?;
    let params: QueryParams = form.into_iter().collect();
    let submission = AdSubmission::bind(&params);

    let (valid, existing) = match validate_submission(submission, Some(ad.clone()), existing) {
        Ok(valid) => valid,
        Err(page) => return Ok(Outcome::Rejected(page)),
    };

    let Some(geo) = geocode(&state, &valid.form.user_entered_address).await else {
        let page = AdFormPage {
            ad: Some(ad),
            form: valid.form,
            pictures: existing,
            picture_forms: PictureFormSet::bind(&params),
            errors: None,
            picture_errors: None,
        };
        return Ok(address_not_found(page, Locale::from_headers(&headers)));
    };

    if valid.form.description != ad.description {
        ad.slug = unique_slug(
            &*state.stores.ads,
            valid.form.description.as_deref(),
            &valid.form.user_entered_address,
            Some(ad.id),
        )
        .await?;
    }
    ad.description = valid.form.description;
    ad.user_entered_address = valid.form.user_entered_address;
    ad.visible = valid.form.visible;
    ad.address = geo.address;
    ad.location = geo.location;
    state.stores.ads.update(&ad).await?;
    info!("User {} updated ad {} ({})", user, ad.id, ad.slug);

    apply_pictures(&state, ad.entity_ref(), existing, valid.changes).await?;
    matching::refresh_for_ad(&state.stores, &ad).await?;

    Ok(Outcome::Redirect(Redirect::to(COMPLETE_URL)))
}

/// GET /ads/:id/delete
pub async fn confirm_delete_ad(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Id>,
) -> Result<Outcome<AdDeletePage>, AppError> {
    let ad = owned_ad(&state, user, id).await?;
    Ok(Outcome::Render(AdDeletePage { ad }))
}

/// POST /ads/:id/delete
pub async fn delete_ad(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Id>,
    headers: HeaderMap,
) -> Result<Outcome<AdDeletePage>, AppError> {
    let mut ad = owned_ad(&state, user, id).await?;
    ad.delete_date = Some(Utc::now());
    state.stores.ads.update(&ad).await?;
    info!("User {} deleted ad {}", user, ad.id);
    matching::refresh_for_ad(&state.stores, &ad).await?;

    Ok(Outcome::Redirect(
        Redirect::to(state.config.account_url.clone())
            .with(Flash::info(Locale::from_headers(&headers).ad_deleted())),
    ))
}

/// GET /ads/complete
pub async fn ad_complete(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Outcome<AdCompletePage> {
    Outcome::Render(AdCompletePage {
        user,
        account_url: state.config.account_url.clone(),
    })
}
