use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{perms, AuthRouterExt, AuthUser};
use crate::entities::{CouponModel, DiscountType};
use crate::errors::ServiceError;
use crate::handlers::common::{validate_input, PaginatedResponse, PaginationParams};
use crate::handlers::AppState;
use crate::services::{CreateCouponInput, UpdateCouponInput};

fn some_if_present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub description: Option<String>,
    #[schema(value_type = String, example = "percentage")]
    pub discount_type: DiscountType,
    pub value: Decimal,
    #[serde(default)]
    pub min_purchase_amount: Decimal,
    pub max_discount_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub per_user_limit: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateCouponRequest {
    #[serde(default, deserialize_with = "some_if_present")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub value: Option<Decimal>,
    pub min_purchase_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "some_if_present")]
    #[schema(value_type = Option<Decimal>)]
    pub max_discount_amount: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "some_if_present")]
    #[schema(value_type = Option<i32>)]
    pub usage_limit: Option<Option<i32>>,
    #[serde(default, deserialize_with = "some_if_present")]
    #[schema(value_type = Option<i32>)]
    pub per_user_limit: Option<Option<i32>>,
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "some_if_present")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub valid_until: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ValidateCouponQuery {
    pub code: String,
    pub subtotal: Decimal,
    #[serde(default)]
    pub shipping_fee: Decimal,
}

/// Outcome of a coupon dry run against a hypothetical order.
#[derive(Debug, Serialize, ToSchema)]
pub struct DiscountPreview {
    pub code: String,
    pub discount_amount: Decimal,
}

/// Create a coupon
#[utoipa::path(
    post,
    path = "/api/v1/coupons",
    tag = "coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created"),
        (status = 409, description = "Code already in use", body = crate::errors::ErrorResponse),
        (status = 422, description = "Validation error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    Json(request): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<CouponModel>), ServiceError> {
    validate_input(&request)?;
    let coupon = state
        .services
        .coupons
        .create_coupon(CreateCouponInput {
            code: request.code,
            description: request.description,
            discount_type: request.discount_type,
            value: request.value,
            min_purchase_amount: request.min_purchase_amount,
            max_discount_amount: request.max_discount_amount,
            usage_limit: request.usage_limit,
            per_user_limit: request.per_user_limit,
            valid_from: request.valid_from.unwrap_or_else(Utc::now),
            valid_until: request.valid_until,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// List coupons
#[utoipa::path(
    get,
    path = "/api/v1/coupons",
    tag = "coupons",
    params(PaginationParams),
    responses(
        (status = 200, description = "Coupons retrieved"),
    ),
    security(("Bearer" = []))
)]
pub async fn list_coupons(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<CouponModel>>, ServiceError> {
    let (page, per_page) = pagination.clamped(state.config.api_max_page_size.into());
    let (coupons, total) = state.services.coupons.list_coupons(page, per_page).await?;
    Ok(Json(PaginatedResponse::new(coupons, page, per_page, total)))
}

/// Get a coupon by id
#[utoipa::path(
    get,
    path = "/api/v1/coupons/{id}",
    tag = "coupons",
    params(("id" = Uuid, Path, description = "Coupon id")),
    responses(
        (status = 200, description = "Coupon retrieved"),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CouponModel>, ServiceError> {
    let coupon = state.services.coupons.get_coupon(id).await?;
    Ok(Json(coupon))
}

/// Update a coupon
#[utoipa::path(
    put,
    path = "/api/v1/coupons/{id}",
    tag = "coupons",
    params(("id" = Uuid, Path, description = "Coupon id")),
    request_body = UpdateCouponRequest,
    responses(
        (status = 200, description = "Coupon updated"),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCouponRequest>,
) -> Result<Json<CouponModel>, ServiceError> {
    let coupon = state
        .services
        .coupons
        .update_coupon(
            id,
            UpdateCouponInput {
                description: request.description,
                value: request.value,
                min_purchase_amount: request.min_purchase_amount,
                max_discount_amount: request.max_discount_amount,
                usage_limit: request.usage_limit,
                per_user_limit: request.per_user_limit,
                valid_from: request.valid_from,
                valid_until: request.valid_until,
                is_active: request.is_active,
            },
        )
        .await?;
    Ok(Json(coupon))
}

/// Deactivate a coupon
#[utoipa::path(
    post,
    path = "/api/v1/coupons/{id}/deactivate",
    tag = "coupons",
    params(("id" = Uuid, Path, description = "Coupon id")),
    responses(
        (status = 200, description = "Coupon deactivated"),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn deactivate_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CouponModel>, ServiceError> {
    let coupon = state.services.coupons.deactivate_coupon(id).await?;
    Ok(Json(coupon))
}

/// Dry-run a coupon against an order amount
#[utoipa::path(
    get,
    path = "/api/v1/coupons/validate",
    tag = "coupons",
    params(ValidateCouponQuery),
    responses(
        (status = 200, description = "Coupon is applicable, discount returned", body = DiscountPreview),
        (status = 422, description = "Coupon invalid or below minimum purchase", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    Query(query): Query<ValidateCouponQuery>,
    auth_user: AuthUser,
) -> Result<Json<DiscountPreview>, ServiceError> {
    let (coupon, discount_amount) = state
        .services
        .coupons
        .validate_for_user(
            &query.code,
            auth_user.user_id,
            query.subtotal,
            query.shipping_fee,
        )
        .await?;
    Ok(Json(DiscountPreview {
        code: coupon.code,
        discount_amount,
    }))
}

pub fn routes() -> Router<AppState> {
    let member = Router::new()
        .route("/validate", get(validate_coupon))
        .with_auth();

    let manage = Router::new()
        .route("/", post(create_coupon).get(list_coupons))
        .route("/:id", get(get_coupon).put(update_coupon))
        .route("/:id/deactivate", post(deactivate_coupon))
        .with_permission(perms::COUPONS_MANAGE);

    member.merge(manage)
}
