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
use validator::Validate;

use crate::auth::{perms, AuthRouterExt, AuthUser};
use crate::entities::{SupportTicketModel, TicketCategory, TicketPriority, TicketStatus};
use crate::errors::ServiceError;
use crate::handlers::common::{validate_input, PaginatedResponse, PaginationParams};
use crate::handlers::AppState;
use crate::services::{OpenTicketInput, TicketDetail};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct OpenTicketRequest {
    #[validate(length(min = 1, max = 255))]
    pub subject: String,
    #[schema(value_type = String, example = "order")]
    pub category: TicketCategory,
    #[schema(value_type = Option<String>, example = "high")]
    pub priority: Option<TicketPriority>,
    pub order_id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub body: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PostMessageRequest {
    #[validate(length(min = 1))]
    pub body: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignTicketRequest {
    pub agent_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangeTicketStatusRequest {
    #[schema(value_type = String, example = "resolved")]
    pub status: TicketStatus,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TicketListQuery {
    #[param(value_type = Option<String>, example = "open")]
    pub status: Option<TicketStatus>,
}

/// Open a support ticket
#[utoipa::path(
    post,
    path = "/api/v1/tickets",
    tag = "support",
    request_body = OpenTicketRequest,
    responses(
        (status = 201, description = "Ticket opened with its first message"),
        (status = 404, description = "Referenced order not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Validation error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn open_ticket(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<OpenTicketRequest>,
) -> Result<(StatusCode, Json<TicketDetail>), ServiceError> {
    validate_input(&request)?;
    let ticket = state
        .services
        .support
        .open_ticket(OpenTicketInput {
            user_id: auth_user.user_id,
            subject: request.subject,
            category: request.category,
            priority: request.priority,
            order_id: request.order_id,
            body: request.body,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// List the caller's tickets
#[utoipa::path(
    get,
    path = "/api/v1/tickets",
    tag = "support",
    params(PaginationParams),
    responses(
        (status = 200, description = "Tickets retrieved, newest first"),
    ),
    security(("Bearer" = []))
)]
pub async fn list_my_tickets(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<SupportTicketModel>>, ServiceError> {
    let (page, per_page) = pagination.clamped(state.config.api_max_page_size.into());
    let (tickets, total) = state
        .services
        .support
        .list_user_tickets(auth_user.user_id, page, per_page)
        .await?;
    Ok(Json(PaginatedResponse::new(tickets, page, per_page, total)))
}

/// List all tickets
#[utoipa::path(
    get,
    path = "/api/v1/tickets/all",
    tag = "support",
    params(TicketListQuery, PaginationParams),
    responses(
        (status = 200, description = "Tickets retrieved, newest first"),
    ),
    security(("Bearer" = []))
)]
pub async fn list_all_tickets(
    State(state): State<AppState>,
    Query(query): Query<TicketListQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<SupportTicketModel>>, ServiceError> {
    let (page, per_page) = pagination.clamped(state.config.api_max_page_size.into());
    let (tickets, total) = state
        .services
        .support
        .list_tickets(query.status, page, per_page)
        .await?;
    Ok(Json(PaginatedResponse::new(tickets, page, per_page, total)))
}

/// Get a ticket with its conversation
#[utoipa::path(
    get,
    path = "/api/v1/tickets/{id}",
    tag = "support",
    params(("id" = Uuid, Path, description = "Ticket id")),
    responses(
        (status = 200, description = "Ticket retrieved"),
        (status = 403, description = "Ticket belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Ticket not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<TicketDetail>, ServiceError> {
    let ticket = state
        .services
        .support
        .get_ticket(id, auth_user.user_id, auth_user.is_staff())
        .await?;
    Ok(Json(ticket))
}

/// Post a message to a ticket
#[utoipa::path(
    post,
    path = "/api/v1/tickets/{id}/messages",
    tag = "support",
    params(("id" = Uuid, Path, description = "Ticket id")),
    request_body = PostMessageRequest,
    responses(
        (status = 200, description = "Message posted, a customer reply reopens waiting tickets"),
        (status = 403, description = "Ticket belongs to another user", body = crate::errors::ErrorResponse),
        (status = 422, description = "Ticket is closed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<PostMessageRequest>,
) -> Result<Json<TicketDetail>, ServiceError> {
    validate_input(&request)?;
    let ticket = state
        .services
        .support
        .post_message(id, auth_user.user_id, auth_user.is_staff(), &request.body)
        .await?;
    Ok(Json(ticket))
}

/// Assign a ticket to an agent
#[utoipa::path(
    post,
    path = "/api/v1/tickets/{id}/assign",
    tag = "support",
    params(("id" = Uuid, Path, description = "Ticket id")),
    request_body = AssignTicketRequest,
    responses(
        (status = 200, description = "Ticket assigned, open tickets move to in_progress"),
        (status = 404, description = "Ticket or agent not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Assignee is not staff or ticket is closed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn assign_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AssignTicketRequest>,
) -> Result<Json<SupportTicketModel>, ServiceError> {
    let ticket = state
        .services
        .support
        .assign_ticket(id, request.agent_id)
        .await?;
    Ok(Json(ticket))
}

/// Change a ticket's status
#[utoipa::path(
    post,
    path = "/api/v1/tickets/{id}/status",
    tag = "support",
    params(("id" = Uuid, Path, description = "Ticket id")),
    request_body = ChangeTicketStatusRequest,
    responses(
        (status = 200, description = "Status changed"),
        (status = 404, description = "Ticket not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Transition not allowed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn change_ticket_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangeTicketStatusRequest>,
) -> Result<Json<SupportTicketModel>, ServiceError> {
    let ticket = state
        .services
        .support
        .change_status(id, request.status)
        .await?;
    Ok(Json(ticket))
}

/// Escalate a ticket
#[utoipa::path(
    post,
    path = "/api/v1/tickets/{id}/escalate",
    tag = "support",
    params(("id" = Uuid, Path, description = "Ticket id")),
    responses(
        (status = 200, description = "Ticket escalated to urgent priority"),
        (status = 404, description = "Ticket not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Ticket already escalated or closed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn escalate_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SupportTicketModel>, ServiceError> {
    let ticket = state.services.support.escalate_ticket(id).await?;
    Ok(Json(ticket))
}

pub fn routes() -> Router<AppState> {
    let member = Router::new()
        .route("/", post(open_ticket).get(list_my_tickets))
        .route("/:id", get(get_ticket))
        .route("/:id/messages", post(post_message))
        .with_auth();

    let staff = Router::new()
        .route("/all", get(list_all_tickets))
        .route("/:id/assign", post(assign_ticket))
        .route("/:id/status", post(change_ticket_status))
        .route("/:id/escalate", post(escalate_ticket))
        .with_permission(perms::TICKETS_WORK);

    member.merge(staff)
}
