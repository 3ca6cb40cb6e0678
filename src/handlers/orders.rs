use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{AuthRouterExt, AuthUser};
use crate::entities::{OrderModel, OrderStatus};
use crate::errors::ServiceError;
use crate::handlers::common::{PaginatedResponse, PaginationParams};
use crate::handlers::AppState;
use crate::services::{CheckoutInput, OrderDetail};

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    #[schema(value_type = String, example = "paid")]
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrderListQuery {
    #[param(value_type = Option<String>, example = "pending")]
    pub status: Option<OrderStatus>,
}

/// Check out the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/orders/checkout",
    tag = "orders",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed from the active cart"),
        (status = 422, description = "Empty cart, dead coupon or insufficient stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn checkout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderDetail>), ServiceError> {
    let order = state
        .services
        .orders
        .checkout(
            auth_user.user_id,
            CheckoutInput {
                shipping_address: request.shipping_address,
                notes: request.notes,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// List the caller's orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    tag = "orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Orders retrieved, newest first"),
    ),
    security(("Bearer" = []))
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<OrderModel>>, ServiceError> {
    let (page, per_page) = pagination.clamped(state.config.api_max_page_size.into());
    let (orders, total) = state
        .services
        .orders
        .list_user_orders(auth_user.user_id, page, per_page)
        .await?;
    Ok(Json(PaginatedResponse::new(orders, page, per_page, total)))
}

/// List all orders
#[utoipa::path(
    get,
    path = "/api/v1/orders/all",
    tag = "orders",
    params(OrderListQuery, PaginationParams),
    responses(
        (status = 200, description = "Orders retrieved, newest first"),
    ),
    security(("Bearer" = []))
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<OrderModel>>, ServiceError> {
    let (page, per_page) = pagination.clamped(state.config.api_max_page_size.into());
    let (orders, total) = state
        .services
        .orders
        .list_orders(query.status, page, per_page)
        .await?;
    Ok(Json(PaginatedResponse::new(orders, page, per_page, total)))
}

/// Get an order with its lines
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order retrieved"),
        (status = 403, description = "Order belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<OrderDetail>, ServiceError> {
    let order = state
        .services
        .orders
        .get_order(id, auth_user.user_id, auth_user.is_staff())
        .await?;
    Ok(Json(order))
}

/// Advance an order through fulfillment
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/status",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Transition not allowed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<OrderModel>, ServiceError> {
    let order = state.services.orders.update_status(id, request.status).await?;
    Ok(Json(order))
}

/// Cancel an order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order cancelled and stock restored"),
        (status = 403, description = "Order belongs to another user", body = crate::errors::ErrorResponse),
        (status = 422, description = "Order already shipped", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<OrderModel>, ServiceError> {
    let order = state
        .services
        .orders
        .cancel_order(id, auth_user.user_id, auth_user.is_staff())
        .await?;
    Ok(Json(order))
}

pub fn routes() -> Router<AppState> {
    let member = Router::new()
        .route("/checkout", post(checkout))
        .route("/", get(list_my_orders))
        .route("/:id", get(get_order))
        .route("/:id/cancel", post(cancel_order))
        .with_auth();

    let staff = Router::new()
        .route("/all", get(list_all_orders))
        .route("/:id/status", post(update_order_status))
        .with_role("agent");

    member.merge(staff)
}
