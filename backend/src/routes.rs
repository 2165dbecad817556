use axum::routing::{get, post};
use axum::{middleware, Router};

use crate::auth::{authenticate, identify};
use crate::state::AppState;
use crate::{ads, buyers, saved_search, search};

pub fn router(state: AppState) -> Router {
    // Writes on these routes check the viewer themselves.
    let public_routes = Router::new()
        .route("/search", get(search::search_page).post(search::save_search))
        .route(
            "/search/:search_id",
            get(search::saved_search_page).post(search::update_saved_search),
        )
        .route("/ads/:id", get(ads::ad_detail).post(ads::contact_owner))
        .layer(middleware::from_fn_with_state(state.clone(), identify));

    let protected_routes = Router::new()
        .route("/ads/new", get(ads::new_ad).post(ads::create_ad))
        .route(ads::COMPLETE_URL, get(ads::ad_complete))
        .route("/ads/:id/edit", get(ads::edit_ad).post(ads::update_ad))
        .route(
            "/ads/:id/delete",
            get(ads::confirm_delete_ad).post(ads::delete_ad),
        )
        .route("/ads/:id/buyers", get(buyers::list_buyers))
        .route(
            "/buyers/contact/:adsearchresult_id",
            post(buyers::contact_buyer),
        )
        .route(
            "/adsearch/:id/update",
            get(saved_search::edit_search).post(saved_search::update_search),
        )
        .route(
            "/adsearch/:id/delete",
            get(saved_search::confirm_delete_search).post(saved_search::delete_search),
        )
        .layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/", get(|| async { "geoads" }))
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
