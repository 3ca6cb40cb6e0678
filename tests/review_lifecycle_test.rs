//! Review submission, moderation, voting, reporting and the denormalized
//! product rating that follows every mutation.

mod common;

use axum::http::StatusCode;
use common::{assert_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

async fn submit_review(
    app: &TestApp,
    token: &str,
    product_id: uuid::Uuid,
    rating: i16,
    body: &str,
) -> serde_json::Value {
    let response = app
        .request_authenticated(
            "POST",
            &format!("/api/v1/products/{product_id}/reviews"),
            token,
            Some(json!({"rating": rating, "body": body})),
        )
        .await;
    assert_json(response, StatusCode::CREATED).await
}

async fn moderate(
    app: &TestApp,
    token: &str,
    review_id: &str,
    status: &str,
) -> axum::response::Response {
    app.request_authenticated(
        "POST",
        &format!("/api/v1/reviews/{review_id}/moderate"),
        token,
        Some(json!({"status": status})),
    )
    .await
}

#[tokio::test]
async fn new_reviews_are_pending_and_invisible() {
    let app = TestApp::spawn().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Toaster", dec!(35.00), 5).await;

    let body = submit_review(&app, &token, product.id, 5, "Crisp results").await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["verified_purchase"], false);
    assert_eq!(body["upvotes"], 0);

    // Not listed publicly and not counted in the product aggregate.
    let response = app
        .request("GET", &format!("/api/v1/products/{}/reviews", product.id), None)
        .await;
    let listing = assert_json(response, StatusCode::OK).await;
    assert_eq!(listing["pagination"]["total"], 0);

    let response = app
        .request("GET", &format!("/api/v1/products/{}", product.id), None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["rating"], 0.0);
    assert_eq!(body["review_count"], 0);
}

#[tokio::test]
async fn approval_publishes_review_and_updates_product_aggregate() {
    let app = TestApp::spawn().await;
    let (_, agent_token) = app.agent().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Kettle", dec!(29.00), 5).await;

    let review = submit_review(&app, &token, product.id, 4, "Boils fast").await;
    let review_id = review["id"].as_str().unwrap();

    let response = moderate(&app, &agent_token, review_id, "approved").await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["status"], "approved");

    let response = app
        .request("GET", &format!("/api/v1/products/{}/reviews", product.id), None)
        .await;
    let listing = assert_json(response, StatusCode::OK).await;
    assert_eq!(listing["pagination"]["total"], 1);
    assert_eq!(listing["data"][0]["id"], review_id);

    let response = app
        .request("GET", &format!("/api/v1/products/{}", product.id), None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["rating"], 4.0);
    assert_eq!(body["review_count"], 1);
}

#[tokio::test]
async fn rejection_keeps_review_out_of_the_aggregate() {
    let app = TestApp::spawn().await;
    let (_, agent_token) = app.agent().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Blender", dec!(49.00), 5).await;

    let review = submit_review(&app, &token, product.id, 1, "Broke on day two").await;
    let review_id = review["id"].as_str().unwrap();

    let response = moderate(&app, &agent_token, review_id, "rejected").await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request("GET", &format!("/api/v1/products/{}", product.id), None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["rating"], 0.0);
    assert_eq!(body["review_count"], 0);
}

#[tokio::test]
async fn one_review_per_customer_per_product() {
    let app = TestApp::spawn().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Fan", dec!(25.00), 5).await;

    submit_review(&app, &token, product.id, 5, "Quiet").await;
    let response = app
        .request_authenticated(
            "POST",
            &format!("/api/v1/products/{}/reviews", product.id),
            &token,
            Some(json!({"rating": 3, "body": "Changed my mind"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn out_of_range_rating_is_rejected() {
    let app = TestApp::spawn().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Scale", dec!(18.00), 5).await;

    let response = app
        .request_authenticated(
            "POST",
            &format!("/api/v1/products/{}/reviews", product.id),
            &token,
            Some(json!({"rating": 6, "body": "Off the charts"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn purchase_marks_review_as_verified() {
    let app = TestApp::spawn().await;
    let (_, agent_token) = app.agent().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Keyboard", dec!(75.00), 5).await;

    app.request_authenticated(
        "POST",
        "/api/v1/cart/items",
        &token,
        Some(json!({"product_id": product.id, "quantity": 1})),
    )
    .await;
    let response = app
        .request_authenticated("POST", "/api/v1/orders/checkout", &token, Some(json!({})))
        .await;
    let body = assert_json(response, StatusCode::CREATED).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    // A pending order does not count as a purchase yet.
    let other_product = app.seed_product("Mousepad", dec!(9.00), 5).await;
    app.request_authenticated(
        "POST",
        "/api/v1/cart/items",
        &token,
        Some(json!({"product_id": other_product.id, "quantity": 1})),
    )
    .await;
    let review = submit_review(&app, &token, product.id, 5, "Great keys").await;
    assert_eq!(review["verified_purchase"], false);

    app.request_authenticated(
        "POST",
        &format!("/api/v1/orders/{order_id}/status"),
        &agent_token,
        Some(json!({"status": "paid"})),
    )
    .await;

    // Once paid, a later review by the same buyer is flagged verified.
    let (_, second_buyer) = app.customer().await;
    let unverified = submit_review(&app, &second_buyer, product.id, 4, "No purchase").await;
    assert_eq!(unverified["verified_purchase"], false);

    let response = app
        .request_authenticated(
            "DELETE",
            &format!("/api/v1/reviews/{}", review["id"].as_str().unwrap()),
            &token,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let verified = submit_review(&app, &token, product.id, 5, "Great keys, verified").await;
    assert_eq!(verified["verified_purchase"], true);
}

#[tokio::test]
async fn votes_are_idempotent_and_switchable() {
    let app = TestApp::spawn().await;
    let (_, agent_token) = app.agent().await;
    let (_, author_token) = app.customer().await;
    let (_, voter_token) = app.customer().await;
    let product = app.seed_product("Router", dec!(89.00), 5).await;

    let review = submit_review(&app, &author_token, product.id, 4, "Solid signal").await;
    let review_id = review["id"].as_str().unwrap().to_string();
    moderate(&app, &agent_token, &review_id, "approved").await;

    let vote_url = format!("/api/v1/reviews/{review_id}/vote");
    let response = app
        .request_authenticated("POST", &vote_url, &voter_token, Some(json!({"vote": "up"})))
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["upvotes"], 1);
    assert_eq!(body["downvotes"], 0);

    // Repeating the same vote changes nothing.
    let response = app
        .request_authenticated("POST", &vote_url, &voter_token, Some(json!({"vote": "up"})))
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["upvotes"], 1);
    assert_eq!(body["downvotes"], 0);

    // Switching direction moves the tally instead of double counting.
    let response = app
        .request_authenticated("POST", &vote_url, &voter_token, Some(json!({"vote": "down"})))
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["upvotes"], 0);
    assert_eq!(body["downvotes"], 1);
}

#[tokio::test]
async fn third_report_flags_an_approved_review() {
    let app = TestApp::spawn().await;
    let (_, agent_token) = app.agent().await;
    let (_, author_token) = app.customer().await;
    let product = app.seed_product("Drone", dec!(250.00), 5).await;

    let review = submit_review(&app, &author_token, product.id, 5, "Flies great").await;
    let review_id = review["id"].as_str().unwrap().to_string();
    moderate(&app, &agent_token, &review_id, "approved").await;

    let report_url = format!("/api/v1/reviews/{review_id}/report");
    for expected_status in ["approved", "approved"] {
        let (_, reporter) = app.customer().await;
        let response = app
            .request_authenticated("POST", &report_url, &reporter, None)
            .await;
        let body = assert_json(response, StatusCode::OK).await;
        assert_eq!(body["status"], expected_status);
    }

    let (_, third_reporter) = app.customer().await;
    let response = app
        .request_authenticated("POST", &report_url, &third_reporter, None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["status"], "flagged");
    assert_eq!(body["report_count"], 3);

    // Flagged reviews leave the public listing and the aggregate.
    let response = app
        .request("GET", &format!("/api/v1/products/{}/reviews", product.id), None)
        .await;
    let listing = assert_json(response, StatusCode::OK).await;
    assert_eq!(listing["pagination"]["total"], 0);

    let response = app
        .request("GET", &format!("/api/v1/products/{}", product.id), None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["review_count"], 0);

    // A moderator can re-approve the flagged review.
    let response = moderate(&app, &agent_token, &review_id, "approved").await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["status"], "approved");
}

#[tokio::test]
async fn moderation_requires_permission_and_legal_transitions() {
    let app = TestApp::spawn().await;
    let (_, agent_token) = app.agent().await;
    let (_, author_token) = app.customer().await;
    let product = app.seed_product("Tripod", dec!(40.00), 5).await;

    let review = submit_review(&app, &author_token, product.id, 3, "Does the job").await;
    let review_id = review["id"].as_str().unwrap().to_string();

    // Customers cannot moderate.
    let response = moderate(&app, &author_token, &review_id, "approved").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Pending reviews cannot jump straight to flagged.
    let response = moderate(&app, &agent_token, &review_id, "flagged").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Rejected is terminal.
    let response = moderate(&app, &agent_token, &review_id, "rejected").await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = moderate(&app, &agent_token, &review_id, "approved").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn moderation_queue_lists_pending_and_flagged_only() {
    let app = TestApp::spawn().await;
    let (_, agent_token) = app.agent().await;
    let (_, customer_token) = app.customer().await;
    let product = app.seed_product("Lens", dec!(300.00), 5).await;

    let pending = submit_review(&app, &customer_token, product.id, 4, "Sharp glass").await;

    let (_, other_author) = app.customer().await;
    let approved = submit_review(&app, &other_author, product.id, 5, "Lovely bokeh").await;
    let approved_id = approved["id"].as_str().unwrap().to_string();
    moderate(&app, &agent_token, &approved_id, "approved").await;

    let response = app
        .request_authenticated("GET", "/api/v1/reviews/moderation-queue", &agent_token, None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["id"], pending["id"]);

    let response = app
        .request_authenticated(
            "GET",
            "/api/v1/reviews/moderation-queue",
            &customer_token,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn only_author_or_staff_can_delete() {
    let app = TestApp::spawn().await;
    let (_, agent_token) = app.agent().await;
    let (_, author_token) = app.customer().await;
    let (_, stranger_token) = app.customer().await;
    let product = app.seed_product("Mic", dec!(120.00), 5).await;

    let review = submit_review(&app, &author_token, product.id, 4, "Clear audio").await;
    let review_id = review["id"].as_str().unwrap().to_string();
    moderate(&app, &agent_token, &review_id, "approved").await;

    let response = app
        .request_authenticated(
            "DELETE",
            &format!("/api/v1/reviews/{review_id}"),
            &stranger_token,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request_authenticated(
            "DELETE",
            &format!("/api/v1/reviews/{review_id}"),
            &author_token,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The aggregate loses the deleted review in the same operation.
    let response = app
        .request("GET", &format!("/api/v1/products/{}", product.id), None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["review_count"], 0);
    assert_eq!(body["rating"], 0.0);
}

#[tokio::test]
async fn helpful_sort_orders_by_net_votes() {
    let app = TestApp::spawn().await;
    let (_, agent_token) = app.agent().await;
    let product = app.seed_product("Chair", dec!(150.00), 5).await;

    let mut review_ids = Vec::new();
    for body in ["First take", "Second take", "Third take"] {
        let (_, author) = app.customer().await;
        let review = submit_review(&app, &author, product.id, 4, body).await;
        let id = review["id"].as_str().unwrap().to_string();
        moderate(&app, &agent_token, &id, "approved").await;
        review_ids.push(id);
    }

    // Second review gets two upvotes, third gets one, first gets a downvote.
    for _ in 0..2 {
        let (_, voter) = app.customer().await;
        app.request_authenticated(
            "POST",
            &format!("/api/v1/reviews/{}/vote", review_ids[1]),
            &voter,
            Some(json!({"vote": "up"})),
        )
        .await;
    }
    let (_, voter) = app.customer().await;
    app.request_authenticated(
        "POST",
        &format!("/api/v1/reviews/{}/vote", review_ids[2]),
        &voter,
        Some(json!({"vote": "up"})),
    )
    .await;
    let (_, voter) = app.customer().await;
    app.request_authenticated(
        "POST",
        &format!("/api/v1/reviews/{}/vote", review_ids[0]),
        &voter,
        Some(json!({"vote": "down"})),
    )
    .await;

    let response = app
        .request(
            "GET",
            &format!("/api/v1/products/{}/reviews?sort=helpful", product.id),
            None,
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    let listed: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(listed, vec![
        review_ids[1].as_str(),
        review_ids[2].as_str(),
        review_ids[0].as_str(),
    ]);
}
