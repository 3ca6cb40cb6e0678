use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog category a product is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    #[sea_orm(string_value = "electronics")]
    Electronics,
    #[sea_orm(string_value = "clothing")]
    Clothing,
    #[sea_orm(string_value = "home")]
    Home,
    #[sea_orm(string_value = "beauty")]
    Beauty,
    #[sea_orm(string_value = "sports")]
    Sports,
    #[sea_orm(string_value = "books")]
    Books,
    #[sea_orm(string_value = "toys")]
    Toys,
    #[sea_orm(string_value = "grocery")]
    Grocery,
    #[sea_orm(string_value = "other")]
    Other,
}

/// Product catalog entry.
///
/// `rating` and `review_count` are denormalized aggregates owned by the
/// review service. They are recomputed inside the same transaction as any
/// review mutation and must never be written from anywhere else.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub slug: String,
    pub description: Option<String>,
    #[sea_orm(unique)]
    pub sku: String,
    pub category: ProductCategory,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    pub currency: String,
    pub stock_quantity: i32,
    pub is_active: bool,
    /// Time-decay weighted average of approved review ratings, one decimal.
    pub rating: f64,
    /// Count of approved reviews backing `rating`.
    pub review_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::review::Entity")]
    Reviews,
    #[sea_orm(has_many = "super::wishlist_item::Entity")]
    WishlistItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reviews.def()
    }
}

impl Related<super::wishlist_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WishlistItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
