use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a coupon's `value` is interpreted when computing the discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `value` is a percentage of the subtotal, optionally capped by
    /// `max_discount_amount`.
    #[sea_orm(string_value = "percentage")]
    Percentage,
    /// `value` is a flat currency amount.
    #[sea_orm(string_value = "fixed")]
    Fixed,
    /// The discount equals the shipping fee of the order; `value` is unused.
    #[sea_orm(string_value = "free_shipping")]
    FreeShipping,
}

/// Discount coupon.
///
/// `code` is stored uppercase and matched case-insensitively by
/// uppercasing lookups. `usage_count` is only ever advanced by the
/// conditional redemption update in the coupon service, so it can never
/// exceed `usage_limit`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub min_purchase_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub max_discount_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub per_user_limit: Option<i32>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Whether the coupon can be redeemed at `now`, ignoring purchase
    /// minimums and per-user limits.
    pub fn is_redeemable_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if now < self.valid_from {
            return false;
        }
        if let Some(until) = self.valid_until {
            if now > until {
                return false;
            }
        }
        match self.usage_limit {
            Some(limit) => self.usage_count < limit,
            None => true,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon_usage::Entity")]
    CouponUsages,
    #[sea_orm(has_many = "super::cart_coupon::Entity")]
    CartCoupons,
}

impl Related<super::coupon_usage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CouponUsages.def()
    }
}

impl Related<super::cart_coupon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartCoupons.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
