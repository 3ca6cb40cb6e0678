use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AuthRouterExt, AuthUser};
use crate::errors::ServiceError;
use crate::handlers::common::validate_input;
use crate::handlers::AppState;
use crate::services::CartDetail;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
}

/// Get the caller's active cart
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    tag = "cart",
    responses(
        (status = 200, description = "Cart retrieved, created empty on first access"),
    ),
    security(("Bearer" = []))
)]
pub async fn get_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<CartDetail>, ServiceError> {
    let cart = state.services.carts.get_cart(auth_user.user_id).await?;
    Ok(Json(cart))
}

/// Add a product to the cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    tag = "cart",
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "Item added, totals recalculated"),
        (status = 404, description = "Product not found or inactive", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn add_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartDetail>, ServiceError> {
    validate_input(&request)?;
    let cart = state
        .services
        .carts
        .add_item(auth_user.user_id, request.product_id, request.quantity)
        .await?;
    Ok(Json(cart))
}

/// Set the quantity of a cart line
#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{product_id}",
    tag = "cart",
    params(("product_id" = Uuid, Path, description = "Product id")),
    request_body = UpdateQuantityRequest,
    responses(
        (status = 200, description = "Quantity updated, zero or less removes the line"),
        (status = 404, description = "Line not in cart", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_item_quantity(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<UpdateQuantityRequest>,
) -> Result<Json<CartDetail>, ServiceError> {
    let cart = state
        .services
        .carts
        .update_item_quantity(auth_user.user_id, product_id, request.quantity)
        .await?;
    Ok(Json(cart))
}

/// Remove a product from the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{product_id}",
    tag = "cart",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Item removed"),
        (status = 404, description = "Line not in cart", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn remove_item(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<CartDetail>, ServiceError> {
    let cart = state
        .services
        .carts
        .remove_item(auth_user.user_id, product_id)
        .await?;
    Ok(Json(cart))
}

/// Empty the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    tag = "cart",
    responses(
        (status = 200, description = "Cart emptied"),
    ),
    security(("Bearer" = []))
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<CartDetail>, ServiceError> {
    let cart = state.services.carts.clear_cart(auth_user.user_id).await?;
    Ok(Json(cart))
}

/// Apply a coupon to the cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/coupon",
    tag = "cart",
    request_body = ApplyCouponRequest,
    responses(
        (status = 200, description = "Coupon applied, discount reflected in totals"),
        (status = 422, description = "Coupon invalid or below minimum purchase", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn apply_coupon(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<ApplyCouponRequest>,
) -> Result<Json<CartDetail>, ServiceError> {
    validate_input(&request)?;
    let cart = state
        .services
        .carts
        .apply_coupon(auth_user.user_id, &request.code)
        .await?;
    Ok(Json(cart))
}

/// Remove the applied coupon
#[utoipa::path(
    delete,
    path = "/api/v1/cart/coupon",
    tag = "cart",
    responses(
        (status = 200, description = "Coupon removed"),
        (status = 404, description = "No coupon applied", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn remove_coupon(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<CartDetail>, ServiceError> {
    let cart = state.services.carts.remove_coupon(auth_user.user_id).await?;
    Ok(Json(cart))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_item))
        .route(
            "/items/:product_id",
            put(update_item_quantity).delete(remove_item),
        )
        .route("/coupon", post(apply_coupon).delete(remove_coupon))
        .with_auth()
}
