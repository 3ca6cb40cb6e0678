//! Cart manipulation and the full checkout path: totals, shipping
//! thresholds, coupon redemption, stock movement and cancellation.

mod common;

use axum::http::StatusCode;
use common::{assert_json, decimal_field, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::entities::coupon::DiscountType;

#[tokio::test]
async fn cart_totals_follow_item_changes() {
    let app = TestApp::spawn().await;
    let (_, token) = app.customer().await;
    let lamp = app.seed_product("Desk Lamp", dec!(19.99), 10).await;
    let chair = app.seed_product("Office Chair", dec!(120.00), 4).await;

    // First GET lazily creates an empty active cart.
    let response = app.request_authenticated("GET", "/api/v1/cart", &token, None).await;
    let body = assert_json(response, StatusCode::OK).await;
    assert!(body["items"].as_array().unwrap().is_empty());
    assert_eq!(decimal_field(&body["cart"], "total"), 0.0);

    // Two lamps: 39.98 subtotal sits under the free-shipping threshold.
    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/cart/items",
            &token,
            Some(json!({"product_id": lamp.id, "quantity": 2})),
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(decimal_field(&body["cart"], "subtotal"), 39.98);
    assert_eq!(decimal_field(&body["cart"], "shipping_fee"), 10.0);
    assert_eq!(decimal_field(&body["cart"], "total"), 49.98);

    // Adding the same product merges the line instead of duplicating it.
    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/cart/items",
            &token,
            Some(json!({"product_id": lamp.id, "quantity": 1})),
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 3);

    // Crossing the threshold zeroes the shipping fee.
    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/cart/items",
            &token,
            Some(json!({"product_id": chair.id, "quantity": 1})),
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(decimal_field(&body["cart"], "subtotal"), 179.97);
    assert_eq!(decimal_field(&body["cart"], "shipping_fee"), 0.0);

    // Removing the chair leaves 59.97, still over the threshold.
    let response = app
        .request_authenticated(
            "DELETE",
            &format!("/api/v1/cart/items/{}", chair.id),
            &token,
            None,
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(decimal_field(&body["cart"], "subtotal"), 59.97);
    assert_eq!(decimal_field(&body["cart"], "shipping_fee"), 0.0);

    // Dropping back below the threshold restores the fee.
    let response = app
        .request_authenticated(
            "PUT",
            &format!("/api/v1/cart/items/{}", lamp.id),
            &token,
            Some(json!({"quantity": 1})),
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(decimal_field(&body["cart"], "subtotal"), 19.99);
    assert_eq!(decimal_field(&body["cart"], "shipping_fee"), 10.0);

    // Clearing empties the cart and the empty cart ships for free.
    let response = app.request_authenticated("DELETE", "/api/v1/cart", &token, None).await;
    let body = assert_json(response, StatusCode::OK).await;
    assert!(body["items"].as_array().unwrap().is_empty());
    assert_eq!(decimal_field(&body["cart"], "shipping_fee"), 0.0);
    assert_eq!(decimal_field(&body["cart"], "total"), 0.0);
}

#[tokio::test]
async fn add_item_checks_stock_against_whole_line() {
    let app = TestApp::spawn().await;
    let (_, token) = app.customer().await;
    let rare = app.seed_product("Rare Print", dec!(45.00), 2).await;

    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/cart/items",
            &token,
            Some(json!({"product_id": rare.id, "quantity": 3})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/cart/items",
            &token,
            Some(json!({"product_id": rare.id, "quantity": 2})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The merged line would need 3 units; only 2 exist.
    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/cart/items",
            &token,
            Some(json!({"product_id": rare.id, "quantity": 1})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn zero_quantity_update_removes_the_line() {
    let app = TestApp::spawn().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Notebook", dec!(4.99), 30).await;

    app.request_authenticated(
        "POST",
        "/api/v1/cart/items",
        &token,
        Some(json!({"product_id": product.id, "quantity": 2})),
    )
    .await;

    let response = app
        .request_authenticated(
            "PUT",
            &format!("/api/v1/cart/items/{}", product.id),
            &token,
            Some(json!({"quantity": 0})),
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert!(body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn coupon_applies_to_cart_totals() {
    let app = TestApp::spawn().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Monitor", dec!(100.00), 5).await;
    app.seed_coupon("SAVE10", DiscountType::Percentage, dec!(10), dec!(0)).await;

    app.request_authenticated(
        "POST",
        "/api/v1/cart/items",
        &token,
        Some(json!({"product_id": product.id, "quantity": 1})),
    )
    .await;

    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/cart/coupon",
            &token,
            Some(json!({"code": "save10"})),
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["coupon"]["code"], "SAVE10");
    assert_eq!(decimal_field(&body["cart"], "discount_amount"), 10.0);
    // 100 subtotal clears the free-shipping threshold.
    assert_eq!(decimal_field(&body["cart"], "total"), 90.0);

    let response = app
        .request_authenticated("DELETE", "/api/v1/cart/coupon", &token, None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert!(body["coupon"].is_null());
    assert_eq!(decimal_field(&body["cart"], "total"), 100.0);
}

#[tokio::test]
async fn removing_absent_coupon_is_404() {
    let app = TestApp::spawn().await;
    let (_, token) = app.customer().await;
    app.request_authenticated("GET", "/api/v1/cart", &token, None).await;

    let response = app
        .request_authenticated("DELETE", "/api/v1/cart/coupon", &token, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn checkout_creates_order_and_consumes_cart() {
    let app = TestApp::spawn().await;
    let (_, admin_token) = app.admin().await;
    let (_, token) = app.customer().await;
    let monitor = app.seed_product("Monitor", dec!(100.00), 5).await;
    let coupon = app
        .seed_coupon("SAVE10", DiscountType::Percentage, dec!(10), dec!(0))
        .await;

    app.request_authenticated(
        "POST",
        "/api/v1/cart/items",
        &token,
        Some(json!({"product_id": monitor.id, "quantity": 2})),
    )
    .await;
    app.request_authenticated(
        "POST",
        "/api/v1/cart/coupon",
        &token,
        Some(json!({"code": "SAVE10"})),
    )
    .await;

    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/orders/checkout",
            &token,
            Some(json!({"shipping_address": "1 Main St"})),
        )
        .await;
    let body = assert_json(response, StatusCode::CREATED).await;
    let order = &body["order"];
    assert!(order["order_number"].as_str().unwrap().starts_with("ORD-"));
    assert_eq!(order["status"], "pending");
    assert_eq!(decimal_field(order, "subtotal"), 200.0);
    assert_eq!(decimal_field(order, "discount_amount"), 20.0);
    assert_eq!(decimal_field(order, "total"), 180.0);
    assert_eq!(order["coupon_code"], "SAVE10");
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_name"], "Monitor");
    assert_eq!(items[0]["quantity"], 2);

    // The cart handed to the next GET is a fresh empty one.
    let response = app.request_authenticated("GET", "/api/v1/cart", &token, None).await;
    let body = assert_json(response, StatusCode::OK).await;
    assert!(body["items"].as_array().unwrap().is_empty());

    // Stock moved and the redemption was recorded.
    let response = app
        .request("GET", &format!("/api/v1/products/{}", monitor.id), None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["stock_quantity"], 3);

    let response = app
        .request_authenticated(
            "GET",
            &format!("/api/v1/coupons/{}", coupon.id),
            &admin_token,
            None,
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["usage_count"], 1);
}

#[tokio::test]
async fn checkout_with_empty_cart_fails() {
    let app = TestApp::spawn().await;
    let (_, token) = app.customer().await;
    app.request_authenticated("GET", "/api/v1/cart", &token, None).await;

    let response = app
        .request_authenticated("POST", "/api/v1/orders/checkout", &token, Some(json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn checkout_fails_when_stock_ran_out_under_the_cart() {
    let app = TestApp::spawn().await;
    let (_, token_a) = app.customer().await;
    let (_, token_b) = app.customer().await;
    let last_one = app.seed_product("Last One", dec!(60.00), 1).await;

    for token in [&token_a, &token_b] {
        let response = app
            .request_authenticated(
                "POST",
                "/api/v1/cart/items",
                token,
                Some(json!({"product_id": last_one.id, "quantity": 1})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let first = app
        .request_authenticated("POST", "/api/v1/orders/checkout", &token_a, Some(json!({})))
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    // The second cart still references the product but the unit is gone.
    let second = app
        .request_authenticated("POST", "/api/v1/orders/checkout", &token_b, Some(json!({})))
        .await;
    assert_eq!(second.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn checkout_time_coupon_validation_fails_loudly() {
    let app = TestApp::spawn().await;
    let (_, admin_token) = app.admin().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Speaker", dec!(80.00), 3).await;
    let coupon = app
        .seed_coupon("FLASH", DiscountType::Fixed, dec!(15), dec!(0))
        .await;

    app.request_authenticated(
        "POST",
        "/api/v1/cart/items",
        &token,
        Some(json!({"product_id": product.id, "quantity": 1})),
    )
    .await;
    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/cart/coupon",
            &token,
            Some(json!({"code": "FLASH"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The campaign ends between apply and checkout.
    app.request_authenticated(
        "POST",
        &format!("/api/v1/coupons/{}/deactivate", coupon.id),
        &admin_token,
        None,
    )
    .await;

    let response = app
        .request_authenticated("POST", "/api/v1/orders/checkout", &token, Some(json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Nothing was consumed by the failed attempt.
    let response = app
        .request("GET", &format!("/api/v1/products/{}", product.id), None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["stock_quantity"], 3);
}

#[tokio::test]
async fn per_user_limit_blocks_reapplying_a_used_coupon() {
    let app = TestApp::spawn().await;
    let (_, admin_token) = app.admin().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Cable", dec!(30.00), 10).await;

    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/coupons",
            &admin_token,
            Some(json!({
                "code": "ONETIME",
                "discount_type": "fixed",
                "value": "5",
                "min_purchase_amount": "0",
                "per_user_limit": 1,
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    app.request_authenticated(
        "POST",
        "/api/v1/cart/items",
        &token,
        Some(json!({"product_id": product.id, "quantity": 1})),
    )
    .await;
    app.request_authenticated(
        "POST",
        "/api/v1/cart/coupon",
        &token,
        Some(json!({"code": "ONETIME"})),
    )
    .await;
    let response = app
        .request_authenticated("POST", "/api/v1/orders/checkout", &token, Some(json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // A second cart cannot apply the same coupon again.
    app.request_authenticated(
        "POST",
        "/api/v1/cart/items",
        &token,
        Some(json!({"product_id": product.id, "quantity": 1})),
    )
    .await;
    let response = app
        .request_authenticated(
            "POST",
            "/api/v1/cart/coupon",
            &token,
            Some(json!({"code": "ONETIME"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn order_access_and_status_transitions() {
    let app = TestApp::spawn().await;
    let (_, agent_token) = app.agent().await;
    let (_, owner_token) = app.customer().await;
    let (_, other_token) = app.customer().await;
    let product = app.seed_product("Headphones", dec!(70.00), 5).await;

    app.request_authenticated(
        "POST",
        "/api/v1/cart/items",
        &owner_token,
        Some(json!({"product_id": product.id, "quantity": 1})),
    )
    .await;
    let response = app
        .request_authenticated("POST", "/api/v1/orders/checkout", &owner_token, Some(json!({})))
        .await;
    let body = assert_json(response, StatusCode::CREATED).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    // Owner and staff can read it; another customer cannot.
    let response = app
        .request_authenticated("GET", &format!("/api/v1/orders/{order_id}"), &owner_token, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .request_authenticated("GET", &format!("/api/v1/orders/{order_id}"), &agent_token, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .request_authenticated("GET", &format!("/api/v1/orders/{order_id}"), &other_token, None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Customers cannot reach the staff surface at all.
    let response = app
        .request_authenticated("GET", "/api/v1/orders/all", &owner_token, None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app
        .request_authenticated("GET", "/api/v1/orders/all", &agent_token, None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["pagination"]["total"], 1);

    // pending -> paid -> shipped is legal; shipped -> paid is not.
    for status in ["paid", "shipped"] {
        let response = app
            .request_authenticated(
                "POST",
                &format!("/api/v1/orders/{order_id}/status"),
                &agent_token,
                Some(json!({"status": status})),
            )
            .await;
        let body = assert_json(response, StatusCode::OK).await;
        assert_eq!(body["status"], status);
    }
    let response = app
        .request_authenticated(
            "POST",
            &format!("/api/v1/orders/{order_id}/status"),
            &agent_token,
            Some(json!({"status": "paid"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancelling_a_pending_order_restocks_items() {
    let app = TestApp::spawn().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Webcam", dec!(55.00), 4).await;

    app.request_authenticated(
        "POST",
        "/api/v1/cart/items",
        &token,
        Some(json!({"product_id": product.id, "quantity": 3})),
    )
    .await;
    let response = app
        .request_authenticated("POST", "/api/v1/orders/checkout", &token, Some(json!({})))
        .await;
    let body = assert_json(response, StatusCode::CREATED).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    let response = app
        .request("GET", &format!("/api/v1/products/{}", product.id), None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["stock_quantity"], 1);

    let response = app
        .request_authenticated(
            "POST",
            &format!("/api/v1/orders/{order_id}/cancel"),
            &token,
            None,
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["status"], "cancelled");

    let response = app
        .request("GET", &format!("/api/v1/products/{}", product.id), None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["stock_quantity"], 4);

    // A cancelled order cannot be cancelled again.
    let response = app
        .request_authenticated(
            "POST",
            &format!("/api/v1/orders/{order_id}/cancel"),
            &token,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn my_orders_lists_only_mine() {
    let app = TestApp::spawn().await;
    let (_, token_a) = app.customer().await;
    let (_, token_b) = app.customer().await;
    let product = app.seed_product("Mug", dec!(60.00), 10).await;

    for token in [&token_a, &token_b] {
        app.request_authenticated(
            "POST",
            "/api/v1/cart/items",
            token,
            Some(json!({"product_id": product.id, "quantity": 1})),
        )
        .await;
        let response = app
            .request_authenticated("POST", "/api/v1/orders/checkout", token, Some(json!({})))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .request_authenticated("GET", "/api/v1/orders", &token_a, None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["pagination"]["total"], 1);
}
