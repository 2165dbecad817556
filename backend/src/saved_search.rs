use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Form};
use log::info;
use serde::Serialize;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::forms::AdSearchUpdateForm;
use crate::i18n::Locale;
use crate::matching;
use crate::models::{AdSearch, Id, UserId};
use crate::state::AppState;
use crate::views::{Flash, Outcome, Redirect};

#[derive(Debug, Serialize)]
pub struct AdSearchUpdatePage {
    pub ad_search: AdSearch,
    pub form: AdSearchUpdateForm,
}

#[derive(Debug, Serialize)]
pub struct AdSearchDeletePage {
    pub ad_search: AdSearch,
}

async fn owned_search(state: &AppState, user: UserId, id: Id) -> Result<AdSearch, AppError> {
    state
        .stores
        .searches
        .get_owned(user, id)
        .await?
        .ok_or(AppError::NotFound)
}

/// GET /adsearch/:id/update
pub async fn edit_search(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Id>,
) -> Result<Outcome<AdSearchUpdatePage>, AppError> {
    let ad_search = owned_search(&state, user, id).await?;
    Ok(Outcome::Render(AdSearchUpdatePage {
        form: AdSearchUpdateForm::initial(&ad_search),
        ad_search,
    }))
}

/// POST /adsearch/:id/update
pub async fn update_search(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Id>,
    headers: HeaderMap,
    Form(form): Form<AdSearchUpdateForm>,
) -> Result<Outcome<AdSearchUpdatePage>, AppError> {
    let mut ad_search = owned_search(&state, user, id).await?;

    ad_search.public = form.public;
    state.stores.searches.update(&ad_search).await?;
    info!("User {} set search {} public={}", user, id, form.public);
    matching::refresh_for_search(&state.stores, &ad_search).await?;

    let locale = Locale::from_headers(&headers);
    Ok(Outcome::Redirect(
        Redirect::to(state.config.account_url.clone()).with(Flash::info(
            locale.search_updated(&state.config.account_url),
        )),
    ))
}

/// GET /adsearch/:id/delete
pub async fn confirm_delete_search(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Id>,
) -> Result<Outcome<AdSearchDeletePage>, AppError> {
    let ad_search = owned_search(&state, user, id).await?;
    Ok(Outcome::Render(AdSearchDeletePage { ad_search }))
}

/// POST /adsearch/:id/delete
pub async fn delete_search(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Id>,
    headers: HeaderMap,
) -> Result<Outcome<AdSearchDeletePage>, AppError> {
    let ad_search = owned_search(&state, user, id).await?;
    let removed = state.stores.results.delete_for_search(ad_search.id).await?;
    state.stores.searches.delete(ad_search.id).await?;
    info!("User {} deleted search {} ({} results)", user, id, removed);

    let locale = Locale::from_headers(&headers);
    Ok(Outcome::Redirect(
        Redirect::to(state.config.account_url.clone())
            .with(Flash::info(locale.search_deleted())),
    ))
}
