//! Support tickets and their message threads.
//!
//! Customers see and write to their own tickets; agents and admins work
//! the whole queue. Status moves forward along the lifecycle except for
//! the customer-reply reopens encoded in `TicketStatus::can_transition_to`.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{
    self, order, support_ticket, ticket_message, SenderRole, SupportTicketModel, TicketCategory,
    TicketMessageModel, TicketPriority, TicketStatus,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

const MAX_SUBJECT_LENGTH: usize = 255;

#[derive(Debug, Clone, Serialize)]
pub struct TicketDetail {
    pub ticket: SupportTicketModel,
    pub messages: Vec<TicketMessageModel>,
}

#[derive(Debug, Clone)]
pub struct OpenTicketInput {
    pub user_id: Uuid,
    pub subject: String,
    pub category: TicketCategory,
    pub priority: Option<TicketPriority>,
    pub order_id: Option<Uuid>,
    pub body: String,
}

#[derive(Clone)]
pub struct SupportService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl SupportService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Opens a ticket with its first customer message.
    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn open_ticket(&self, input: OpenTicketInput) -> Result<TicketDetail, ServiceError> {
        let subject = input.subject.trim().to_string();
        if subject.is_empty() {
            return Err(ServiceError::ValidationError(
                "Ticket subject cannot be empty".into(),
            ));
        }
        if subject.len() > MAX_SUBJECT_LENGTH {
            return Err(ServiceError::ValidationError(format!(
                "Ticket subject cannot exceed {} characters",
                MAX_SUBJECT_LENGTH
            )));
        }
        let body = input.body.trim().to_string();
        if body.is_empty() {
            return Err(ServiceError::ValidationError(
                "Ticket message cannot be empty".into(),
            ));
        }

        let txn = self.db.begin().await?;

        if let Some(order_id) = input.order_id {
            let owns_order = entities::Order::find_by_id(order_id)
                .filter(order::Column::UserId.eq(input.user_id))
                .count(&txn)
                .await?
                > 0;
            if !owns_order {
                return Err(ServiceError::NotFound(format!(
                    "Order {} not found",
                    order_id
                )));
            }
        }

        let now = Utc::now();
        let ticket = support_ticket::ActiveModel {
            id: Set(Uuid::new_v4()),
            ticket_number: Set(generate_ticket_number()),
            user_id: Set(input.user_id),
            subject: Set(subject),
            category: Set(input.category),
            priority: Set(input.priority.unwrap_or(TicketPriority::Medium)),
            status: Set(TicketStatus::Open),
            assigned_agent_id: Set(None),
            order_id: Set(input.order_id),
            escalated: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let message = ticket_message::ActiveModel {
            id: Set(Uuid::new_v4()),
            ticket_id: Set(ticket.id),
            sender_id: Set(input.user_id),
            sender_role: Set(SenderRole::Customer),
            body: Set(body),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        info!(ticket_id = %ticket.id, number = %ticket.ticket_number, "Ticket opened");
        self.event_sender
            .send_or_log(Event::TicketOpened {
                ticket_id: ticket.id,
                user_id: ticket.user_id,
                ticket_number: ticket.ticket_number.clone(),
                subject: ticket.subject.clone(),
            })
            .await;

        Ok(TicketDetail {
            ticket,
            messages: vec![message],
        })
    }

    /// Fetches a ticket with its thread. Customers only see their own.
    #[instrument(skip(self))]
    pub async fn get_ticket(
        &self,
        ticket_id: Uuid,
        actor_id: Uuid,
        actor_is_staff: bool,
    ) -> Result<TicketDetail, ServiceError> {
        let ticket = self.load_ticket(self.db.as_ref(), ticket_id).await?;
        if ticket.user_id != actor_id && !actor_is_staff {
            return Err(ServiceError::Forbidden(
                "You do not have access to this ticket".into(),
            ));
        }

        let messages = entities::TicketMessage::find()
            .filter(ticket_message::Column::TicketId.eq(ticket.id))
            .order_by_asc(ticket_message::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(TicketDetail { ticket, messages })
    }

    #[instrument(skip(self))]
    pub async fn list_user_tickets(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<SupportTicketModel>, u64), ServiceError> {
        let paginator = entities::SupportTicket::find()
            .filter(support_ticket::Column::UserId.eq(user_id))
            .order_by_desc(support_ticket::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let tickets = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((tickets, total))
    }

    /// Staff queue across all customers, optionally filtered by status.
    #[instrument(skip(self))]
    pub async fn list_tickets(
        &self,
        status: Option<TicketStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<SupportTicketModel>, u64), ServiceError> {
        let mut query = entities::SupportTicket::find();
        if let Some(status) = status {
            query = query.filter(support_ticket::Column::Status.eq(status));
        }
        let paginator = query
            .order_by_desc(support_ticket::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let tickets = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((tickets, total))
    }

    /// Appends a message to the thread. A customer reply pulls a
    /// `WaitingOnCustomer` or `Resolved` ticket back to `InProgress`.
    #[instrument(skip(self, body))]
    pub async fn post_message(
        &self,
        ticket_id: Uuid,
        actor_id: Uuid,
        actor_is_staff: bool,
        body: &str,
    ) -> Result<TicketDetail, ServiceError> {
        let body = body.trim().to_string();
        if body.is_empty() {
            return Err(ServiceError::ValidationError(
                "Message body cannot be empty".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let ticket = self.load_ticket(&txn, ticket_id).await?;
        if !actor_is_staff && ticket.user_id != actor_id {
            return Err(ServiceError::Forbidden(
                "You do not have access to this ticket".into(),
            ));
        }
        if ticket.status == TicketStatus::Closed {
            return Err(ServiceError::InvalidOperation(
                "Cannot post to a closed ticket".into(),
            ));
        }

        let sender_role = if actor_is_staff {
            SenderRole::Agent
        } else {
            SenderRole::Customer
        };

        let now = Utc::now();
        ticket_message::ActiveModel {
            id: Set(Uuid::new_v4()),
            ticket_id: Set(ticket.id),
            sender_id: Set(actor_id),
            sender_role: Set(sender_role),
            body: Set(body),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        // Customer replies reopen waiting or resolved tickets.
        let reopen_to = match (sender_role, ticket.status) {
            (SenderRole::Customer, TicketStatus::WaitingOnCustomer)
            | (SenderRole::Customer, TicketStatus::Resolved) => Some(TicketStatus::InProgress),
            _ => None,
        };

        let owner_id = ticket.user_id;
        let old_status = ticket.status;
        let ticket = {
            let mut active: support_ticket::ActiveModel = ticket.into();
            if let Some(next) = reopen_to {
                active.status = Set(next);
            }
            active.updated_at = Set(now);
            active.update(&txn).await?
        };
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::TicketMessagePosted {
                ticket_id,
                user_id: owner_id,
                sender_role: sender_role.as_str().to_string(),
            })
            .await;
        if let Some(next) = reopen_to {
            info!(%ticket_id, from = old_status.as_str(), to = next.as_str(), "Ticket reopened by customer reply");
            self.event_sender
                .send_or_log(Event::TicketStatusChanged {
                    ticket_id,
                    user_id: owner_id,
                    old_status: old_status.as_str().to_string(),
                    new_status: next.as_str().to_string(),
                })
                .await;
        }

        self.get_ticket(ticket.id, actor_id, true).await
    }

    /// Assigns a ticket to an agent. An `Open` ticket moves to
    /// `InProgress`; later statuses keep their place in the lifecycle.
    #[instrument(skip(self))]
    pub async fn assign_ticket(
        &self,
        ticket_id: Uuid,
        agent_id: Uuid,
    ) -> Result<SupportTicketModel, ServiceError> {
        let agent = entities::User::find_by_id(agent_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", agent_id)))?;
        if !agent.role.is_staff() {
            return Err(ServiceError::ValidationError(
                "Tickets can only be assigned to agents or admins".into(),
            ));
        }

        let ticket = self.load_ticket(self.db.as_ref(), ticket_id).await?;
        if ticket.status == TicketStatus::Closed {
            return Err(ServiceError::InvalidOperation(
                "Cannot assign a closed ticket".into(),
            ));
        }

        let owner_id = ticket.user_id;
        let old_status = ticket.status;
        let starts_work = ticket.status == TicketStatus::Open;
        let mut active: support_ticket::ActiveModel = ticket.into();
        active.assigned_agent_id = Set(Some(agent_id));
        if starts_work {
            active.status = Set(TicketStatus::InProgress);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;

        info!(%ticket_id, %agent_id, "Ticket assigned");
        self.event_sender
            .send_or_log(Event::TicketAssigned {
                ticket_id,
                user_id: owner_id,
                agent_id,
            })
            .await;
        if starts_work {
            self.event_sender
                .send_or_log(Event::TicketStatusChanged {
                    ticket_id,
                    user_id: owner_id,
                    old_status: old_status.as_str().to_string(),
                    new_status: TicketStatus::InProgress.as_str().to_string(),
                })
                .await;
        }
        Ok(updated)
    }

    /// Moves a ticket along the lifecycle. Closing appends a system
    /// message to the thread in the same transaction.
    #[instrument(skip(self))]
    pub async fn change_status(
        &self,
        ticket_id: Uuid,
        next: TicketStatus,
    ) -> Result<SupportTicketModel, ServiceError> {
        let txn = self.db.begin().await?;
        let ticket = self.load_ticket(&txn, ticket_id).await?;

        if !ticket.status.can_transition_to(next) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot transition ticket from {} to {}",
                ticket.status.as_str(),
                next.as_str()
            )));
        }

        let now = Utc::now();
        if next == TicketStatus::Closed {
            ticket_message::ActiveModel {
                id: Set(Uuid::new_v4()),
                ticket_id: Set(ticket.id),
                sender_id: Set(ticket.user_id),
                sender_role: Set(SenderRole::System),
                body: Set("Ticket closed.".to_string()),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        let owner_id = ticket.user_id;
        let old_status = ticket.status;
        let mut active: support_ticket::ActiveModel = ticket.into();
        active.status = Set(next);
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(%ticket_id, from = old_status.as_str(), to = next.as_str(), "Ticket status changed");
        self.event_sender
            .send_or_log(Event::TicketStatusChanged {
                ticket_id,
                user_id: owner_id,
                old_status: old_status.as_str().to_string(),
                new_status: next.as_str().to_string(),
            })
            .await;
        Ok(updated)
    }

    /// Escalates a ticket: marks it, bumps priority to `Urgent`.
    #[instrument(skip(self))]
    pub async fn escalate_ticket(
        &self,
        ticket_id: Uuid,
    ) -> Result<SupportTicketModel, ServiceError> {
        let ticket = self.load_ticket(self.db.as_ref(), ticket_id).await?;
        if ticket.escalated {
            return Err(ServiceError::InvalidOperation(
                "Ticket is already escalated".into(),
            ));
        }
        if ticket.status == TicketStatus::Closed {
            return Err(ServiceError::InvalidOperation(
                "Cannot escalate a closed ticket".into(),
            ));
        }

        let owner_id = ticket.user_id;
        let mut active: support_ticket::ActiveModel = ticket.into();
        active.escalated = Set(true);
        active.priority = Set(TicketPriority::Urgent);
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;

        info!(%ticket_id, "Ticket escalated");
        self.event_sender
            .send_or_log(Event::TicketEscalated {
                ticket_id,
                user_id: owner_id,
            })
            .await;
        Ok(updated)
    }

    async fn load_ticket<C: ConnectionTrait>(
        &self,
        conn: &C,
        ticket_id: Uuid,
    ) -> Result<SupportTicketModel, ServiceError> {
        entities::SupportTicket::find_by_id(ticket_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Ticket {} not found", ticket_id)))
    }
}

fn generate_ticket_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_uppercase();
    format!("TKT-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_numbers_carry_the_date_prefix() {
        let number = generate_ticket_number();
        let expected_prefix = format!("TKT-{}-", Utc::now().format("%Y%m%d"));
        assert!(number.starts_with(&expected_prefix), "got {}", number);
    }

    #[test]
    fn lifecycle_only_moves_forward() {
        use TicketStatus::*;
        assert!(Open.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(WaitingOnCustomer));
        assert!(Resolved.can_transition_to(Closed));
        assert!(!InProgress.can_transition_to(Open));
        assert!(!Closed.can_transition_to(InProgress));
        // Customer-reply reopens.
        assert!(WaitingOnCustomer.can_transition_to(InProgress));
        assert!(Resolved.can_transition_to(InProgress));
    }
}
