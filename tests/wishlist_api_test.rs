//! Wishlist endpoints, including the move-to-cart transfer.

mod common;

use axum::http::StatusCode;
use common::{assert_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn wishlist_requires_authentication() {
    let app = TestApp::spawn().await;
    let response = app.request("GET", "/api/v1/wishlist", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn add_list_and_remove_items() {
    let app = TestApp::spawn().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Camera", dec!(450.00), 3).await;

    let response = app.request_authenticated("GET", "/api/v1/wishlist", &token, None).await;
    let body = assert_json(response, StatusCode::OK).await;
    assert!(body["entries"].as_array().unwrap().is_empty());

    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/wishlist/items",
            &token,
            Some(json!({"product_id": product.id})),
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["product"]["name"], "Camera");

    // The same product cannot be wished for twice.
    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/wishlist/items",
            &token,
            Some(json!({"product_id": product.id})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .request_authenticated(
            "DELETE",
            &format!("/api/v1/wishlist/items/{}", product.id),
            &token,
            None,
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert!(body["entries"].as_array().unwrap().is_empty());

    let response = app
        .request_authenticated(
            "DELETE",
            &format!("/api/v1/wishlist/items/{}", product.id),
            &token,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_product_cannot_be_added() {
    let app = TestApp::spawn().await;
    let (_, token) = app.customer().await;

    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/wishlist/items",
            &token,
            Some(json!({"product_id": uuid::Uuid::new_v4()})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn move_to_cart_transfers_the_item() {
    let app = TestApp::spawn().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Tent", dec!(199.00), 2).await;

    app.request_authenticated(
        "POST",
        "/api/v1/wishlist/items",
        &token,
        Some(json!({"product_id": product.id})),
    )
    .await;

    let response = app
        .request_authenticated(
            "POST",
            &format!("/api/v1/wishlist/items/{}/move-to-cart", product.id),
            &token,
            None,
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_id"], product.id.to_string());
    assert_eq!(items[0]["quantity"], 1);

    let response = app.request_authenticated("GET", "/api/v1/wishlist", &token, None).await;
    let body = assert_json(response, StatusCode::OK).await;
    assert!(body["entries"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn wishlists_are_per_user() {
    let app = TestApp::spawn().await;
    let (_, token_a) = app.customer().await;
    let (_, token_b) = app.customer().await;
    let product = app.seed_product("Hammock", dec!(59.00), 5).await;

    app.request_authenticated(
        "POST",
        "/api/v1/wishlist/items",
        &token_a,
        Some(json!({"product_id": product.id})),
    )
    .await;

    let response = app.request_authenticated("GET", "/api/v1/wishlist", &token_b, None).await;
    let body = assert_json(response, StatusCode::OK).await;
    assert!(body["entries"].as_array().unwrap().is_empty());
}
