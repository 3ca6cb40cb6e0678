//! Catalog endpoints: public reads, staff-only writes.

mod common;

use axum::http::StatusCode;
use common::{assert_json, decimal_field, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn public_listing_and_lookup() {
    let app = TestApp::spawn().await;
    let keyboard = app.seed_product("Wireless Keyboard", dec!(49.99), 10).await;
    app.seed_product("USB Hub", dec!(19.99), 5).await;

    let response = app.request("GET", "/api/v1/products", None).await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let response = app
        .request("GET", &format!("/api/v1/products/{}", keyboard.id), None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["name"], "Wireless Keyboard");
    assert_eq!(body["rating"], 0.0);
    assert_eq!(body["review_count"], 0);

    let response = app
        .request(
            "GET",
            &format!("/api/v1/products/slug/{}", keyboard.slug),
            None,
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["id"], keyboard.id.to_string());
}

#[tokio::test]
async fn unknown_product_is_404() {
    let app = TestApp::spawn().await;
    let response = app
        .request(
            "GET",
            &format!("/api/v1/products/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn creation_requires_manage_permission() {
    let app = TestApp::spawn().await;
    let payload = json!({
        "name": "Mechanical Keyboard",
        "sku": "kbd-mech-01",
        "category": "electronics",
        "price": "89.99",
        "stock_quantity": 3,
    });

    let response = app
        .request("POST", "/api/v1/products", Some(payload.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (_, customer_token) = app.customer().await;
    let response = app
        .request_authenticated("POST", "/api/v1/products", &customer_token, Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_creates_product_with_derived_slug_and_normalized_sku() {
    let app = TestApp::spawn().await;
    let (_, admin_token) = app.admin().await;

    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/products",
            &admin_token,
            Some(json!({
                "name": "Mechanical Keyboard",
                "sku": "kbd-mech-01",
                "category": "electronics",
                "price": "89.99",
                "stock_quantity": 3,
            })),
        )
        .await;
    let body = assert_json(response, StatusCode::CREATED).await;
    assert_eq!(body["slug"], "mechanical-keyboard");
    assert_eq!(body["sku"], "KBD-MECH-01");
    assert_eq!(body["is_active"], true);

    // Same SKU is rejected regardless of case.
    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/products",
            &admin_token,
            Some(json!({
                "name": "Another Keyboard",
                "sku": "KBD-MECH-01",
                "category": "electronics",
                "price": "79.99",
                "stock_quantity": 1,
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn update_is_partial() {
    let app = TestApp::spawn().await;
    let (_, admin_token) = app.admin().await;
    let product = app.seed_product("Desk Lamp", dec!(24.50), 8).await;

    let response = app
        .request_authenticated(
            "PUT",
            &format!("/api/v1/products/{}", product.id),
            &admin_token,
            Some(json!({"price": "22.00"})),
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["name"], "Desk Lamp");
    assert_eq!(decimal_field(&body, "price"), 22.0);
    assert_eq!(body["stock_quantity"], 8);
}

#[tokio::test]
async fn archive_hides_product_from_public_surfaces() {
    let app = TestApp::spawn().await;
    let (_, admin_token) = app.admin().await;
    let product = app.seed_product("Discontinued Gadget", dec!(12.00), 2).await;

    let response = app
        .request_authenticated(
            "DELETE",
            &format!("/api/v1/products/{}", product.id),
            &admin_token,
            None,
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["is_active"], false);

    // Gone from the default listing and the slug lookup.
    let response = app.request("GET", "/api/v1/products", None).await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["pagination"]["total"], 0);

    let response = app
        .request(
            "GET",
            &format!("/api/v1/products/slug/{}", product.slug),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Still visible when explicitly asked for.
    let response = app
        .request("GET", "/api/v1/products?include_inactive=true", None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["pagination"]["total"], 1);
}

#[tokio::test]
async fn listing_filters_by_category_and_search() {
    let app = TestApp::spawn().await;
    let (_, admin_token) = app.admin().await;
    app.seed_product("Graphing Calculator", dec!(99.00), 4).await;

    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/products",
            &admin_token,
            Some(json!({
                "name": "Rust in Action",
                "sku": "BOOK-RUST-1",
                "category": "books",
                "price": "39.99",
                "stock_quantity": 12,
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request("GET", "/api/v1/products?category=books", None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["name"], "Rust in Action");

    let response = app
        .request("GET", "/api/v1/products?search=calculator", None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["name"], "Graphing Calculator");
}

#[tokio::test]
async fn listing_paginates() {
    let app = TestApp::spawn().await;
    for i in 0..3 {
        app.seed_product(&format!("Widget {i}"), dec!(5.00), 1).await;
    }

    let response = app
        .request("GET", "/api/v1/products?page=2&per_page=2", None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["total_pages"], 2);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}
