//! Storefront API Library
//!
//! Backend for a small storefront: catalog, reviews with moderated
//! ratings, carts with coupon discounts, checkout, wishlists and
//! customer support tickets.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{extract::State, response::Json, routing::get, Router};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub services: handlers::AppServices,
    pub redis: Arc<redis::Client>,
}

/// Versioned API surface. Auth routes are mounted separately because they
/// run against the auth service state.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .nest(
            "/products",
            handlers::products::routes().merge(handlers::reviews::product_review_routes()),
        )
        .nest("/reviews", handlers::reviews::routes())
        .nest("/cart", handlers::carts::routes())
        .nest("/coupons", handlers::coupons::routes())
        .nest("/orders", handlers::orders::routes())
        .nest("/wishlist", handlers::wishlists::routes())
        .nest("/tickets", handlers::support::routes())
        .nest("/notifications", handlers::notifications::routes())
        .nest("/users", handlers::users::routes())
}

async fn api_status() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");
    Json(json!({
        "status": "ok",
        "service": "storefront-api",
        "version": version,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let redis_status = match state.redis.get_async_connection().await {
        Ok(mut conn) => match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(_) => "healthy",
            Err(_) => "unhealthy",
        },
        Err(_) => "unhealthy",
    };

    Json(json!({
        "status": if db_status == "healthy" && redis_status == "healthy" { "healthy" } else { "unhealthy" },
        "checks": {
            "database": db_status,
            "cache": redis_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
