//! Profile self-service plus the staff and admin user surfaces.

mod common;

use axum::http::StatusCode;
use common::{assert_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn profile_read_and_update() {
    let app = TestApp::spawn().await;
    let (user, token) = app.customer().await;

    let response = app.request_authenticated("GET", "/api/v1/users/me", &token, None).await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["id"], user.id.to_string());
    assert_eq!(body["email"], user.email);
    assert!(body.get("password_hash").is_none());

    let response = app
        .request_authenticated(
            "PUT",
            "/api/v1/users/me",
            &token,
            Some(json!({"name": "Renamed Customer"})),
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["name"], "Renamed Customer");
}

#[tokio::test]
async fn listing_users_is_staff_only() {
    let app = TestApp::spawn().await;
    let (_, customer_token) = app.customer().await;
    let (_, agent_token) = app.agent().await;

    let response = app
        .request_authenticated("GET", "/api/v1/users", &customer_token, None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request_authenticated("GET", "/api/v1/users", &agent_token, None)
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["pagination"]["total"], 2);
}

#[tokio::test]
async fn user_search_filters_by_email_and_name() {
    let app = TestApp::spawn().await;
    let (_, agent_token) = app.agent().await;
    let (needle, _) = app.customer().await;
    app.customer().await;

    let response = app
        .request_authenticated(
            "GET",
            &format!("/api/v1/users?search={}", needle.email),
            &agent_token,
            None,
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["id"], needle.id.to_string());
}

#[tokio::test]
async fn role_changes_are_admin_only() {
    let app = TestApp::spawn().await;
    let (_, admin_token) = app.admin().await;
    let (_, agent_token) = app.agent().await;
    let (target, _) = app.customer().await;

    // Agents can read users but not change roles.
    let response = app
        .request_authenticated(
            "POST",
            &format!("/api/v1/users/{}/role", target.id),
            &agent_token,
            Some(json!({"role": "agent"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request_authenticated(
            "POST",
            &format!("/api/v1/users/{}/role", target.id),
            &admin_token,
            Some(json!({"role": "agent"})),
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["role"], "agent");

    // The promoted account now passes staff gates.
    let promoted = app.state.services.users.get_user(target.id).await.unwrap();
    let promoted_token = app
        .auth_service
        .generate_token(&promoted)
        .unwrap()
        .access_token;
    let response = app
        .request_authenticated("GET", "/api/v1/users", &promoted_token, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn deactivate_and_reactivate_control_login() {
    let app = TestApp::spawn().await;
    let (_, admin_token) = app.admin().await;
    let email = format!("gina-{}@example.com", uuid::Uuid::new_v4().simple());

    let response = app
        .request(
            "POST",
            "/auth/register",
            Some(json!({"name": "Gina", "email": email, "password": "a fine password"})),
        )
        .await;
    let body = assert_json(response, StatusCode::CREATED).await;
    let user_id = body["id"].as_str().unwrap().to_string();

    let response = app
        .request_authenticated(
            "POST",
            &format!("/api/v1/users/{user_id}/deactivate"),
            &admin_token,
            None,
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["is_active"], false);

    let login = json!({"email": email, "password": "a fine password"});
    let response = app.request("POST", "/auth/login", Some(login.clone())).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request_authenticated(
            "POST",
            &format!("/api/v1/users/{user_id}/activate"),
            &admin_token,
            None,
        )
        .await;
    let body = assert_json(response, StatusCode::OK).await;
    assert_eq!(body["is_active"], true);

    let response = app.request("POST", "/auth/login", Some(login)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_user_is_404_for_staff_lookup() {
    let app = TestApp::spawn().await;
    let (_, agent_token) = app.agent().await;

    let response = app
        .request_authenticated(
            "GET",
            &format!("/api/v1/users/{}", uuid::Uuid::new_v4()),
            &agent_token,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
