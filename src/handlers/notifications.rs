use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{AuthRouterExt, AuthUser};
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::notifications::{Notification, NotificationFeed};

fn default_limit() -> usize {
    20
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct FeedQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCount {
    pub unread: u64,
}

/// List the caller's newest notifications
#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    tag = "notifications",
    params(FeedQuery),
    responses(
        (status = 200, description = "Notifications retrieved, newest first"),
    ),
    security(("Bearer" = []))
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<Notification>>, ServiceError> {
    let limit = query.limit.clamp(1, 100);
    let notifications = state
        .services
        .notifications
        .list(auth_user.user_id, limit)
        .await?;
    Ok(Json(notifications))
}

/// Count unread notifications
#[utoipa::path(
    get,
    path = "/api/v1/notifications/unread-count",
    tag = "notifications",
    responses(
        (status = 200, description = "Unread count returned", body = UnreadCount),
    ),
    security(("Bearer" = []))
)]
pub async fn unread_count(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<UnreadCount>, ServiceError> {
    let unread = state
        .services
        .notifications
        .unread_count(auth_user.user_id)
        .await?;
    Ok(Json(UnreadCount { unread }))
}

/// Mark a notification as read
#[utoipa::path(
    post,
    path = "/api/v1/notifications/{id}/read",
    tag = "notifications",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Notification marked read"),
        (status = 404, description = "Notification not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn mark_as_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .notifications
        .mark_as_read(auth_user.user_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Clear the caller's feed
#[utoipa::path(
    delete,
    path = "/api/v1/notifications",
    tag = "notifications",
    responses(
        (status = 204, description = "All notifications removed"),
    ),
    security(("Bearer" = []))
)]
pub async fn clear_notifications(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<StatusCode, ServiceError> {
    state.services.notifications.clear(auth_user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications).delete(clear_notifications))
        .route("/unread-count", get(unread_count))
        .route("/:id/read", post(mark_as_read))
        .with_auth()
}
