use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{perms, AuthRouterExt, AuthUser};
use crate::entities::{UserModel, UserRole};
use crate::errors::ServiceError;
use crate::handlers::common::{validate_input, PaginatedResponse, PaginationParams};
use crate::handlers::AppState;
use crate::services::UpdateProfileInput;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetRoleRequest {
    #[schema(value_type = String, example = "agent")]
    pub role: UserRole,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UserSearchQuery {
    pub search: Option<String>,
}

/// Get the caller's profile
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Profile retrieved"),
    ),
    security(("Bearer" = []))
)]
pub async fn get_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<UserModel>, ServiceError> {
    let user = state.services.users.get_user(auth_user.user_id).await?;
    Ok(Json(user))
}

/// Update the caller's profile
#[utoipa::path(
    put,
    path = "/api/v1/users/me",
    tag = "users",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated"),
        (status = 422, description = "Validation error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserModel>, ServiceError> {
    validate_input(&request)?;
    let user = state
        .services
        .users
        .update_profile(auth_user.user_id, UpdateProfileInput { name: request.name })
        .await?;
    Ok(Json(user))
}

/// List users
#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    params(UserSearchQuery, PaginationParams),
    responses(
        (status = 200, description = "Users retrieved, newest first"),
    ),
    security(("Bearer" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserSearchQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<UserModel>>, ServiceError> {
    let (page, per_page) = pagination.clamped(state.config.api_max_page_size.into());
    let (users, total) = state
        .services
        .users
        .list_users(query.search.as_deref(), page, per_page)
        .await?;
    Ok(Json(PaginatedResponse::new(users, page, per_page, total)))
}

/// Get a user by id
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User retrieved"),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserModel>, ServiceError> {
    let user = state.services.users.get_user(id).await?;
    Ok(Json(user))
}

/// Change a user's role
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/role",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = SetRoleRequest,
    responses(
        (status = 200, description = "Role changed"),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn set_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetRoleRequest>,
) -> Result<Json<UserModel>, ServiceError> {
    let user = state.services.users.set_role(id, request.role).await?;
    Ok(Json(user))
}

/// Deactivate a user
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/deactivate",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User deactivated"),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn deactivate_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserModel>, ServiceError> {
    let user = state.services.users.set_active(id, false).await?;
    Ok(Json(user))
}

/// Reactivate a user
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/activate",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User reactivated"),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn activate_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserModel>, ServiceError> {
    let user = state.services.users.set_active(id, true).await?;
    Ok(Json(user))
}

pub fn routes() -> Router<AppState> {
    let member = Router::new()
        .route("/me", get(get_profile).put(update_profile))
        .with_auth();

    let staff = Router::new()
        .route("/", get(list_users))
        .route("/:id", get(get_user))
        .with_permission(perms::USERS_READ);

    let admin = Router::new()
        .route("/:id/role", post(set_role))
        .route("/:id/deactivate", post(deactivate_user))
        .route("/:id/activate", post(activate_user))
        .with_role("admin");

    member.merge(staff).merge(admin)
}
