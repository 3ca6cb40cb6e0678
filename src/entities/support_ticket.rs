use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    #[sea_orm(string_value = "order")]
    Order,
    #[sea_orm(string_value = "payment")]
    Payment,
    #[sea_orm(string_value = "shipping")]
    Shipping,
    #[sea_orm(string_value = "product")]
    Product,
    #[sea_orm(string_value = "account")]
    Account,
    #[sea_orm(string_value = "other")]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    #[sea_orm(string_value = "low")]
    Low,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "urgent")]
    Urgent,
}

/// Ticket lifecycle. Statuses advance in one direction; the only
/// backward moves are a customer reply pulling a `WaitingOnCustomer` or
/// `Resolved` ticket back to `InProgress`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "waiting_on_customer")]
    WaitingOnCustomer,
    #[sea_orm(string_value = "resolved")]
    Resolved,
    #[sea_orm(string_value = "closed")]
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::WaitingOnCustomer => "waiting_on_customer",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            TicketStatus::Open => 0,
            TicketStatus::InProgress => 1,
            TicketStatus::WaitingOnCustomer => 2,
            TicketStatus::Resolved => 3,
            TicketStatus::Closed => 4,
        }
    }

    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        if *self == Closed {
            return false;
        }
        // Customer replies reopen a waiting or resolved ticket.
        if matches!((self, next), (WaitingOnCustomer, InProgress) | (Resolved, InProgress)) {
            return true;
        }
        next.rank() > self.rank()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "support_tickets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub ticket_number: String,
    pub user_id: Uuid,
    pub subject: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub assigned_agent_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub escalated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::ticket_message::Entity")]
    TicketMessages,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::ticket_message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TicketMessages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::TicketStatus::{self, *};
    use test_case::test_case;

    #[test_case(Open, InProgress => true)]
    #[test_case(Open, Closed => true; "a ticket can be closed from any live status")]
    #[test_case(InProgress, WaitingOnCustomer => true)]
    #[test_case(InProgress, Resolved => true)]
    #[test_case(WaitingOnCustomer, InProgress => true; "customer reply reopens waiting")]
    #[test_case(Resolved, InProgress => true; "customer reply reopens resolved")]
    #[test_case(Resolved, Closed => true)]
    #[test_case(InProgress, Open => false; "no manual moves backwards")]
    #[test_case(WaitingOnCustomer, Open => false)]
    #[test_case(Closed, InProgress => false; "closed is terminal")]
    #[test_case(Closed, Resolved => false)]
    fn status_transitions(from: TicketStatus, to: TicketStatus) -> bool {
        from.can_transition_to(to)
    }
}
