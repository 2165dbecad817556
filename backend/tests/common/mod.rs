#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use geoads_backend::auth::create_token;
use geoads_backend::config::AppConfig;
use geoads_backend::geocode::FixedGeocoder;
use geoads_backend::matching;
use geoads_backend::models::{Ad, NewAd, UserId};
use geoads_backend::notify::{self, Notification, NotificationReceiver};
use geoads_backend::routes;
use geoads_backend::slug::unique_slug;
use geoads_backend::state::AppState;
use geoads_backend::store::Stores;

pub const JWT_SECRET: &str = "test-secret";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub notifications: NotificationReceiver,
}

impl TestApp {
    /// Notifications queued so far.
    pub fn sent(&mut self) -> Vec<Notification> {
        let mut sent = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            sent.push(notification);
        }
        sent
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        port: 0,
        jwt_secret: JWT_SECRET.to_string(),
        bypass_geocode: true,
        geocoder_url: "http://127.0.0.1:9/geocode".to_string(),
        geocoder_api_key: None,
        home_ads_count: 10,
        paginate_by: 14,
        site_name: "geoads".to_string(),
        operator_email: "contact@localhost".to_string(),
        account_url: "/accounts/profile/".to_string(),
    }
}

pub fn test_state() -> (AppState, NotificationReceiver) {
    let (notifier, rx) = notify::queue();
    let state = AppState::new(test_config(), Stores::in_memory(), Arc::new(notifier))
        .expect("bypass geocoder never fails to build");
    (state, rx)
}

pub fn setup_with_state(state: AppState, notifications: NotificationReceiver) -> TestApp {
    TestApp {
        router: routes::router(state.clone()),
        state,
        notifications,
    }
}

pub fn setup_test_app() -> TestApp {
    let (state, rx) = test_state();
    setup_with_state(state, rx)
}

pub fn token(user: i64) -> String {
    create_token(UserId(user), JWT_SECRET).expect("token")
}

fn encode_form(form: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(form)
        .finish()
}

pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    user: Option<i64>,
    form: &[(&str, &str)],
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method.clone()).uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
    }
    let body = if method == Method::POST {
        builder = builder.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        Body::from(encode_form(form))
    } else {
        Body::empty()
    };

    call(router, builder.body(body).expect("request")).await
}

pub async fn call(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

pub async fn get_request(router: &Router, uri: &str, user: Option<i64>) -> (StatusCode, Value) {
    let (status, _, body) = send(router, Method::GET, uri, user, &[]).await;
    (status, body)
}

pub async fn post_form(
    router: &Router,
    uri: &str,
    user: Option<i64>,
    form: &[(&str, &str)],
) -> (StatusCode, HeaderMap, Value) {
    send(router, Method::POST, uri, user, form).await
}

pub fn location(headers: &HeaderMap) -> &str {
    headers
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

/// Inserts a visible ad at the fixed address and refreshes matching.
pub async fn seed_ad(state: &AppState, user: i64, description: &str) -> Ad {
    seed_ad_with(state, user, description, true).await
}

pub async fn seed_ad_with(state: &AppState, user: i64, description: &str, visible: bool) -> Ad {
    let slug = unique_slug(&*state.stores.ads, Some(description), "Paris", None)
        .await
        .expect("slug");
    let ad = state
        .stores
        .ads
        .insert(NewAd {
            user: UserId(user),
            slug,
            description: Some(description.to_string()),
            user_entered_address: "1 rue de la Paix, Paris".to_string(),
            address: FixedGeocoder::address(),
            location: FixedGeocoder::location(),
            visible,
        })
        .await
        .expect("insert ad");
    matching::refresh_for_ad(&state.stores, &ad)
        .await
        .expect("matching");
    ad
}
