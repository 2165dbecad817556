mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use base64::{engine::general_purpose, Engine};
use common::*;
use geoads_backend::filter::AdFilter;
use geoads_backend::geocode::{FixedGeocoder, GeoInfo, GeocodeError, Geocoder};
use geoads_backend::models::{EntityRef, NewAdPicture, UserId};
use geoads_backend::notify::Notification;

struct FailingGeocoder;

#[async_trait]
impl Geocoder for FailingGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeoInfo, GeocodeError> {
        Err(GeocodeError::NoMatch(address.to_string()))
    }
}

#[tokio::test]
async fn test_create_ad_with_bypassed_geocoding() {
    // Setup
    let mut app = setup_test_app();
    let image = general_purpose::STANDARD.encode(b"fake jpeg");

    // Execute
    let (status, headers, _) = post_form(
        &app.router,
        "/ads/new",
        Some(1),
        &[
            ("description", "Sunny flat near the Opera"),
            ("user_entered_address", "5 rue de Verneuil, Paris"),
            ("visible", "on"),
            ("pictures-0-image", image.as_str()),
            ("pictures-0-title", "Living room"),
        ],
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/ads/complete");

    let ad = app.state.stores.ads.get(1).await.unwrap().expect("ad saved");
    assert_eq!(ad.user, UserId(1));
    assert_eq!(ad.slug, "sunny-flat-near-the-opera");
    assert_eq!(ad.location, FixedGeocoder::location());
    assert_eq!(
        ad.address[0]["formatted_address"],
        "1 Rue de la Paix, 75002 Paris, France"
    );

    let pictures = app
        .state
        .stores
        .pictures
        .for_target(EntityRef::ad(ad.id))
        .await
        .unwrap();
    assert_eq!(pictures.len(), 1);
    assert_eq!(pictures[0].image, b"fake jpeg".to_vec());
    assert_eq!(pictures[0].title.as_deref(), Some("Living room"));
    assert!(app.sent().is_empty());
}

#[tokio::test]
async fn test_create_ad_requires_login() {
    let app = setup_test_app();

    let (status, _) = get_request(&app.router, "/ads/new", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = post_form(
        &app.router,
        "/ads/new",
        None,
        &[("user_entered_address", "Paris")],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_ad_form_notifies_operators() {
    let mut app = setup_test_app();

    let (status, _, body) =
        post_form(&app.router, "/ads/new", Some(1), &[("description", "No address")]).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"]["user_entered_address"][0],
        "This field is required."
    );
    let sent = app.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0],
        Notification::InvalidAdForm { user, .. } if *user == UserId(1)
    ));
    let total = app.state.stores.ads.count(&AdFilter::default()).await.unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_invalid_picture_blocks_the_whole_submission() {
    let mut app = setup_test_app();

    let (status, _, body) = post_form(
        &app.router,
        "/ads/new",
        Some(1),
        &[
            ("user_entered_address", "Paris"),
            ("pictures-0-image", "%%% not base64"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body.get("errors").is_none());
    assert_eq!(
        body["picture_errors"]["forms"][0]["image"][0],
        "Upload a valid image."
    );
    assert!(app.state.stores.ads.get(1).await.unwrap().is_none());
    assert!(app.sent().is_empty());
}

#[tokio::test]
async fn test_geocoding_failure_saves_nothing() {
    let (state, rx) = test_state();
    let state = state.with_geocoder(Arc::new(FailingGeocoder));
    let app = setup_with_state(state, rx);

    let (status, _, body) = post_form(
        &app.router,
        "/ads/new",
        Some(1),
        &[("description", "Lost flat"), ("user_entered_address", "Nowhere")],
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"]["__all__"][0],
        "This address could not be located, please check it."
    );
    assert!(app.state.stores.ads.get(1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_contact_owner_queues_message() {
    let mut app = setup_test_app();
    let ad = seed_ad(&app.state, 1, "Flat with balcony").await;

    let (status, _, body) =
        post_form(&app.router, "/ads/1", Some(2), &[("message", "Is it still free?")]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sent_mail"], true);
    assert_eq!(body["messages"][0]["message"], "Your message has been sent.");

    let contacts = app
        .state
        .stores
        .contacts
        .for_target(ad.entity_ref())
        .await
        .unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].user, UserId(2));

    let sent = app.sent();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        Notification::UserMessage {
            sender,
            recipient,
            message,
            ..
        } => {
            assert_eq!(*sender, UserId(2));
            assert_eq!(*recipient, UserId(1));
            assert_eq!(message, "Is it still free?");
        }
        other => panic!("unexpected notification {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_contact_form_sends_nothing() {
    let mut app = setup_test_app();
    let ad = seed_ad(&app.state, 1, "Flat with balcony").await;

    let (status, _, body) = post_form(&app.router, "/ads/1", Some(2), &[("message", " ")]).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["sent_mail"], false);
    assert_eq!(body["errors"]["message"][0], "This field is required.");
    assert!(app
        .state
        .stores
        .contacts
        .for_target(ad.entity_ref())
        .await
        .unwrap()
        .is_empty());
    assert!(app.sent().is_empty());
}

#[tokio::test]
async fn test_owner_cannot_contact_themselves() {
    let mut app = setup_test_app();
    let ad = seed_ad(&app.state, 1, "Flat with balcony").await;

    let (status, _, body) =
        post_form(&app.router, "/ads/1", Some(1), &[("message", "Anyone there?")]).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["sent_mail"], false);
    assert_eq!(
        body["errors"]["__all__"][0],
        "You cannot send a message about your own ad."
    );
    assert_eq!(body["contact_form"]["message"], "Anyone there?");
    assert!(app
        .state
        .stores
        .contacts
        .for_target(ad.entity_ref())
        .await
        .unwrap()
        .is_empty());
    assert!(app.sent().is_empty());
}

#[tokio::test]
async fn test_contact_requires_login() {
    let app = setup_test_app();
    seed_ad(&app.state, 1, "Flat with balcony").await;

    let (status, body) = get_request(&app.router, "/ads/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sent_mail"], false);

    let (status, _, _) = post_form(&app.router, "/ads/1", None, &[("message", "Hi")]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_hidden_and_deleted_ads_are_not_found() {
    let app = setup_test_app();
    seed_ad_with(&app.state, 1, "Draft flat", false).await;

    let (status, _) = get_request(&app.router, "/ads/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get_request(&app.router, "/ads/1", Some(2)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get_request(&app.router, "/ads/1", Some(1)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = post_form(&app.router, "/ads/1/delete", Some(2), &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, headers, body) = post_form(&app.router, "/ads/1/delete", Some(1), &[]).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/accounts/profile/");
    assert_eq!(body["messages"][0]["message"], "Your ad has been deleted.");

    let ad = app.state.stores.ads.get(1).await.unwrap().unwrap();
    assert!(ad.delete_date.is_some());
    let (status, _) = get_request(&app.router, "/ads/1", Some(1)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_edit_is_owner_only() {
    let app = setup_test_app();
    seed_ad(&app.state, 1, "Flat with balcony").await;

    let (status, _) = get_request(&app.router, "/ads/1/edit", Some(2)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = post_form(
        &app.router,
        "/ads/1/edit",
        Some(2),
        &[("user_entered_address", "Elsewhere")],
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get_request(&app.router, "/ads/1/edit", Some(1)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["form"]["description"], "Flat with balcony");
}

#[tokio::test]
async fn test_edit_updates_slug_and_pictures() {
    let app = setup_test_app();
    let ad = seed_ad(&app.state, 1, "Flat with balcony").await;
    let image = general_purpose::STANDARD.encode(b"first");
    post_form(
        &app.router,
        "/ads/1/edit",
        Some(1),
        &[
            ("description", "Flat with balcony"),
            ("user_entered_address", "Paris"),
            ("visible", "on"),
            ("pictures-0-image", image.as_str()),
        ],
    )
    .await;
    let pictures = app
        .state
        .stores
        .pictures
        .for_target(ad.entity_ref())
        .await
        .unwrap();
    assert_eq!(pictures.len(), 1);
    let picture_id = pictures[0].id.to_string();

    let (status, headers, _) = post_form(
        &app.router,
        "/ads/1/edit",
        Some(1),
        &[
            ("description", "Renovated loft"),
            ("user_entered_address", "Paris"),
            ("visible", "on"),
            ("pictures-0-id", picture_id.as_str()),
            ("pictures-0-DELETE", "on"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/ads/complete");
    let updated = app.state.stores.ads.get(1).await.unwrap().unwrap();
    assert_eq!(updated.slug, "renovated-loft");
    assert_eq!(updated.description.as_deref(), Some("Renovated loft"));
    assert!(app
        .state
        .stores
        .pictures
        .for_target(ad.entity_ref())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_edit_rejects_pictures_of_other_ads() {
    let app = setup_test_app();
    seed_ad(&app.state, 1, "Flat with balcony").await;

    let (status, _, body) = post_form(
        &app.router,
        "/ads/1/edit",
        Some(1),
        &[
            ("user_entered_address", "Paris"),
            ("pictures-0-id", "42"),
            ("pictures-0-title", "Not mine"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["picture_errors"]["non_form_errors"][0],
        "Select a valid choice."
    );
}

#[tokio::test]
async fn test_duplicate_picture_rows_save_nothing() {
    // Setup
    let app = setup_test_app();
    let ad = seed_ad(&app.state, 1, "Flat with balcony").await;
    for n in 0..4 {
        app.state
            .stores
            .pictures
            .insert(NewAdPicture {
                target: ad.entity_ref(),
                image: format!("picture {}", n).into_bytes(),
                title: None,
            })
            .await
            .unwrap();
    }
    let image = general_purpose::STANDARD.encode(b"extra");

    // Execute
    let (status, _, body) = post_form(
        &app.router,
        "/ads/1/edit",
        Some(1),
        &[
            ("description", "Renovated loft"),
            ("user_entered_address", "Paris"),
            ("visible", "on"),
            ("pictures-0-image", image.as_str()),
            ("pictures-1-image", image.as_str()),
            ("pictures-2-id", "1"),
            ("pictures-2-DELETE", "on"),
            ("pictures-3-id", "1"),
            ("pictures-3-DELETE", "on"),
        ],
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["picture_errors"]["forms"][3]["id"][0],
        "Please correct the duplicate data for id, which must be unique."
    );
    let pictures = app
        .state
        .stores
        .pictures
        .for_target(ad.entity_ref())
        .await
        .unwrap();
    assert_eq!(pictures.len(), 4);
    assert!(pictures.iter().any(|picture| picture.id == 1));
    let unchanged = app.state.stores.ads.get(1).await.unwrap().unwrap();
    assert_eq!(unchanged.slug, ad.slug);
    assert_eq!(unchanged.description, ad.description);
}

#[tokio::test]
async fn test_edit_geocoding_failure_keeps_the_ad() {
    let (state, rx) = test_state();
    let state = state.with_geocoder(Arc::new(FailingGeocoder));
    let app = setup_with_state(state, rx);
    let ad = seed_ad(&app.state, 1, "Flat with balcony").await;

    let (status, _, body) = post_form(
        &app.router,
        "/ads/1/edit",
        Some(1),
        &[
            ("description", "Renovated loft"),
            ("user_entered_address", "Nowhere"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"]["__all__"][0],
        "This address could not be located, please check it."
    );
    assert_eq!(body["form"]["description"], "Renovated loft");
    let unchanged = app.state.stores.ads.get(1).await.unwrap().unwrap();
    assert_eq!(unchanged.slug, ad.slug);
    assert_eq!(unchanged.description, ad.description);
    assert_eq!(unchanged.user_entered_address, ad.user_entered_address);
    assert_eq!(unchanged.location, ad.location);
    assert!(unchanged.visible);
    assert_eq!(unchanged.update_date, ad.update_date);
}

#[tokio::test]
async fn test_complete_page() {
    let app = setup_test_app();

    let (status, body) = get_request(&app.router, "/ads/complete", Some(7)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"], 7);
    assert_eq!(body["account_url"], "/accounts/profile/");
}
