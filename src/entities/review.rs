use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Moderation lifecycle of a review.
///
/// New reviews start `Pending`. Moderators approve or reject them.
/// Approved reviews can be flagged (by a moderator, or automatically when
/// reports accumulate) and a flagged review is re-moderated back to
/// approved or rejected. Rejection is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "flagged")]
    Flagged,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
            ModerationStatus::Flagged => "flagged",
        }
    }

    pub fn can_transition_to(&self, next: ModerationStatus) -> bool {
        use ModerationStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Approved, Flagged) | (Flagged, Approved) | (Flagged, Rejected)
        )
    }
}

/// Product review.
///
/// Vote tallies and `report_count` are denormalized from `review_votes`
/// and report submissions; the review service keeps them in sync.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reviews")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    /// Star rating, 0 through 5 inclusive.
    pub rating: i16,
    pub title: Option<String>,
    pub body: String,
    pub status: ModerationStatus,
    pub upvotes: i32,
    pub downvotes: i32,
    pub report_count: i32,
    pub verified_purchase: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Net helpfulness score used to order reviews.
    pub fn helpfulness(&self) -> i32 {
        self.upvotes - self.downvotes
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::review_vote::Entity")]
    ReviewVotes,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::review_vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReviewVotes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
