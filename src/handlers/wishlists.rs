use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{AuthRouterExt, AuthUser};
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::{CartDetail, WishlistDetail};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddWishlistItemRequest {
    pub product_id: Uuid,
}

/// Get the caller's wishlist
#[utoipa::path(
    get,
    path = "/api/v1/wishlist",
    tag = "wishlist",
    responses(
        (status = 200, description = "Wishlist retrieved, created on first access"),
    ),
    security(("Bearer" = []))
)]
pub async fn get_wishlist(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<WishlistDetail>, ServiceError> {
    let wishlist = state.services.wishlists.get_wishlist(auth_user.user_id).await?;
    Ok(Json(wishlist))
}

/// Add a product to the wishlist
#[utoipa::path(
    post,
    path = "/api/v1/wishlist/items",
    tag = "wishlist",
    request_body = AddWishlistItemRequest,
    responses(
        (status = 200, description = "Product added"),
        (status = 404, description = "Product not found or inactive", body = crate::errors::ErrorResponse),
        (status = 409, description = "Product already on the wishlist", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn add_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<AddWishlistItemRequest>,
) -> Result<Json<WishlistDetail>, ServiceError> {
    let wishlist = state
        .services
        .wishlists
        .add_item(auth_user.user_id, request.product_id)
        .await?;
    Ok(Json(wishlist))
}

/// Remove a product from the wishlist
#[utoipa::path(
    delete,
    path = "/api/v1/wishlist/items/{product_id}",
    tag = "wishlist",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product removed"),
        (status = 404, description = "Product not on the wishlist", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn remove_item(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<WishlistDetail>, ServiceError> {
    let wishlist = state
        .services
        .wishlists
        .remove_item(auth_user.user_id, product_id)
        .await?;
    Ok(Json(wishlist))
}

/// Move a wishlist item into the cart
#[utoipa::path(
    post,
    path = "/api/v1/wishlist/items/{product_id}/move-to-cart",
    tag = "wishlist",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Item moved, cart returned"),
        (status = 404, description = "Product not on the wishlist", body = crate::errors::ErrorResponse),
        (status = 422, description = "Product out of stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn move_to_cart(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<CartDetail>, ServiceError> {
    let cart = state
        .services
        .wishlists
        .move_to_cart(auth_user.user_id, product_id)
        .await?;
    Ok(Json(cart))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_wishlist))
        .route("/items", post(add_item))
        .route("/items/:product_id", axum::routing::delete(remove_item))
        .route("/items/:product_id/move-to-cart", post(move_to_cart))
        .with_auth()
}
