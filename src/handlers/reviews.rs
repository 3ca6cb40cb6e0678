use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{perms, AuthRouterExt, AuthUser};
use crate::entities::{ModerationStatus, ReviewModel, VoteKind};
use crate::errors::ServiceError;
use crate::handlers::common::{validate_input, PaginatedResponse, PaginationParams};
use crate::handlers::AppState;
use crate::services::{ReviewSort, SubmitReviewInput};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitReviewRequest {
    pub rating: i16,
    #[validate(length(max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 1))]
    pub body: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VoteRequest {
    #[schema(value_type = String, example = "up")]
    pub vote: VoteKind,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ModerateRequest {
    #[schema(value_type = String, example = "approved")]
    pub status: ModerationStatus,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ReviewListQuery {
    #[serde(default)]
    #[param(value_type = String, example = "helpful")]
    pub sort: ReviewSort,
}

/// List approved reviews for a product
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}/reviews",
    tag = "reviews",
    params(
        ("id" = Uuid, Path, description = "Product id"),
        ReviewListQuery,
        PaginationParams,
    ),
    responses(
        (status = 200, description = "Reviews retrieved successfully"),
    )
)]
pub async fn list_product_reviews(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<ReviewListQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<ReviewModel>>, ServiceError> {
    let (page, per_page) = pagination.clamped(state.config.api_max_page_size.into());
    let (reviews, total) = state
        .services
        .reviews
        .list_product_reviews(product_id, query.sort, page, per_page)
        .await?;
    Ok(Json(PaginatedResponse::new(reviews, page, per_page, total)))
}

/// Submit a review for a product
#[utoipa::path(
    post,
    path = "/api/v1/products/{id}/reviews",
    tag = "reviews",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = SubmitReviewRequest,
    responses(
        (status = 201, description = "Review submitted and queued for moderation"),
        (status = 400, description = "Rating out of range", body = crate::errors::ErrorResponse),
        (status = 409, description = "Product already reviewed by this user", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn submit_review(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<SubmitReviewRequest>,
) -> Result<(StatusCode, Json<ReviewModel>), ServiceError> {
    validate_input(&request)?;
    let review = state
        .services
        .reviews
        .submit_review(SubmitReviewInput {
            product_id,
            user_id: auth_user.user_id,
            rating: request.rating,
            title: request.title,
            body: request.body,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// Get a single review
#[utoipa::path(
    get,
    path = "/api/v1/reviews/{id}",
    tag = "reviews",
    params(("id" = Uuid, Path, description = "Review id")),
    responses(
        (status = 200, description = "Review retrieved successfully"),
        (status = 404, description = "Review not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReviewModel>, ServiceError> {
    let review = state.services.reviews.get_review(id).await?;
    Ok(Json(review))
}

/// Vote a review helpful or unhelpful
#[utoipa::path(
    post,
    path = "/api/v1/reviews/{id}/vote",
    tag = "reviews",
    params(("id" = Uuid, Path, description = "Review id")),
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Vote recorded"),
        (status = 404, description = "Review not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn vote_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<VoteRequest>,
) -> Result<Json<ReviewModel>, ServiceError> {
    let review = state
        .services
        .reviews
        .vote_review(id, auth_user.user_id, request.vote)
        .await?;
    Ok(Json(review))
}

/// Report a review for abuse
#[utoipa::path(
    post,
    path = "/api/v1/reviews/{id}/report",
    tag = "reviews",
    params(("id" = Uuid, Path, description = "Review id")),
    responses(
        (status = 200, description = "Report recorded"),
        (status = 404, description = "Review not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn report_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ReviewModel>, ServiceError> {
    let review = state
        .services
        .reviews
        .report_review(id, auth_user.user_id)
        .await?;
    Ok(Json(review))
}

/// Delete a review
#[utoipa::path(
    delete,
    path = "/api/v1/reviews/{id}",
    tag = "reviews",
    params(("id" = Uuid, Path, description = "Review id")),
    responses(
        (status = 204, description = "Review deleted"),
        (status = 403, description = "Not the review author", body = crate::errors::ErrorResponse),
        (status = 404, description = "Review not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn delete_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .reviews
        .delete_review(id, auth_user.user_id, auth_user.is_staff())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List reviews awaiting moderation
#[utoipa::path(
    get,
    path = "/api/v1/reviews/moderation-queue",
    tag = "reviews",
    params(PaginationParams),
    responses(
        (status = 200, description = "Pending and flagged reviews, oldest first"),
    ),
    security(("Bearer" = []))
)]
pub async fn moderation_queue(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<ReviewModel>>, ServiceError> {
    let (page, per_page) = pagination.clamped(state.config.api_max_page_size.into());
    let (reviews, total) = state.services.reviews.moderation_queue(page, per_page).await?;
    Ok(Json(PaginatedResponse::new(reviews, page, per_page, total)))
}

/// Moderate a review
#[utoipa::path(
    post,
    path = "/api/v1/reviews/{id}/moderate",
    tag = "reviews",
    params(("id" = Uuid, Path, description = "Review id")),
    request_body = ModerateRequest,
    responses(
        (status = 200, description = "Review moderated"),
        (status = 404, description = "Review not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Transition not allowed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn moderate_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ModerateRequest>,
) -> Result<Json<ReviewModel>, ServiceError> {
    let review = state
        .services
        .reviews
        .moderate_review(id, request.status)
        .await?;
    Ok(Json(review))
}

/// Routes mounted under `/products/:id/reviews`.
pub fn product_review_routes() -> Router<AppState> {
    Router::new()
        .route("/:id/reviews", get(list_product_reviews))
        .merge(
            Router::new()
                .route("/:id/reviews", post(submit_review))
                .with_auth(),
        )
}

/// Routes mounted under `/reviews`.
pub fn routes() -> Router<AppState> {
    let public = Router::new().route("/:id", get(get_review));

    let member = Router::new()
        .route("/:id/vote", post(vote_review))
        .route("/:id/report", post(report_review))
        .route("/:id", delete(delete_review))
        .with_auth();

    let moderation = Router::new()
        .route("/moderation-queue", get(moderation_queue))
        .route("/:id/moderate", post(moderate_review))
        .with_permission(perms::REVIEWS_MODERATE);

    public.merge(member).merge(moderation)
}
