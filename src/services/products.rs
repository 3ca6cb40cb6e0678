//! Product catalog management.
//!
//! `rating` and `review_count` on the product row are owned by the review
//! service and are intentionally absent from every update path here.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{self, product, ProductCategory, ProductModel};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

const MAX_NAME_LENGTH: usize = 255;

#[derive(Debug, Clone)]
pub struct CreateProductInput {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub sku: String,
    pub category: ProductCategory,
    pub price: Decimal,
    pub currency: Option<String>,
    pub stock_quantity: i32,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<ProductCategory>,
    pub price: Option<Decimal>,
    pub stock_quantity: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ProductListFilter {
    pub category: Option<ProductCategory>,
    pub search: Option<String>,
    pub include_inactive: bool,
}

#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    default_currency: String,
}

impl ProductService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        default_currency: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            default_currency,
        }
    }

    #[instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "Product name cannot be empty".into(),
            ));
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(ServiceError::ValidationError(format!(
                "Product name cannot exceed {} characters",
                MAX_NAME_LENGTH
            )));
        }
        let sku = input.sku.trim().to_uppercase();
        if sku.is_empty() {
            return Err(ServiceError::ValidationError("SKU cannot be empty".into()));
        }
        if input.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Price cannot be negative".into(),
            ));
        }
        if input.stock_quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Stock quantity cannot be negative".into(),
            ));
        }

        let sku_taken = entities::Product::find()
            .filter(product::Column::Sku.eq(sku.clone()))
            .count(self.db.as_ref())
            .await?
            > 0;
        if sku_taken {
            return Err(ServiceError::Conflict(format!("SKU {} already exists", sku)));
        }

        let slug = match input.slug {
            Some(explicit) => {
                let slug = slugify(&explicit);
                if slug.is_empty() {
                    return Err(ServiceError::ValidationError("Slug cannot be empty".into()));
                }
                if self.slug_taken(&slug).await? {
                    return Err(ServiceError::Conflict(format!(
                        "Slug {} already exists",
                        slug
                    )));
                }
                slug
            }
            None => self.unique_slug_for(&name).await?,
        };

        let now = Utc::now();
        let created = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            slug: Set(slug),
            description: Set(input.description),
            sku: Set(sku),
            category: Set(input.category),
            price: Set(input.price),
            currency: Set(input
                .currency
                .unwrap_or_else(|| self.default_currency.clone())),
            stock_quantity: Set(input.stock_quantity),
            is_active: Set(true),
            rating: Set(0.0),
            review_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;

        info!(product_id = %created.id, slug = %created.slug, "Product created");
        self.event_sender
            .send_or_log(Event::ProductCreated(created.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let existing = self.get_product(product_id).await?;

        if let Some(price) = input.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Price cannot be negative".into(),
                ));
            }
        }
        if let Some(stock) = input.stock_quantity {
            if stock < 0 {
                return Err(ServiceError::ValidationError(
                    "Stock quantity cannot be negative".into(),
                ));
            }
        }

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ServiceError::ValidationError(
                    "Product name cannot be empty".into(),
                ));
            }
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(category) = input.category {
            active.category = Set(category);
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(stock) = input.stock_quantity {
            active.stock_quantity = Set(stock);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(self.db.as_ref()).await?;
        info!(product_id = %updated.id, "Product updated");
        self.event_sender
            .send_or_log(Event::ProductUpdated(updated.id))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        entities::Product::find_by_id(product_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Public lookup by slug; archived products are hidden.
    #[instrument(skip(self))]
    pub async fn get_product_by_slug(&self, slug: &str) -> Result<ProductModel, ServiceError> {
        entities::Product::find()
            .filter(product::Column::Slug.eq(slug))
            .filter(product::Column::IsActive.eq(true))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", slug)))
    }

    #[instrument(skip(self, filter))]
    pub async fn list_products(
        &self,
        filter: ProductListFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        let mut query = entities::Product::find();
        if !filter.include_inactive {
            query = query.filter(product::Column::IsActive.eq(true));
        }
        if let Some(category) = filter.category {
            query = query.filter(product::Column::Category.eq(category));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(product::Column::Name.contains(search))
                    .add(product::Column::Description.contains(search)),
            );
        }

        let paginator = query
            .order_by_desc(product::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((products, total))
    }

    /// Soft-deletes a product. Existing carts and orders keep their rows;
    /// the product just stops being sellable or listable.
    #[instrument(skip(self))]
    pub async fn archive_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        let existing = self.get_product(product_id).await?;
        let mut active: product::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;

        info!(product_id = %updated.id, "Product archived");
        self.event_sender
            .send_or_log(Event::ProductArchived(updated.id))
            .await;
        Ok(updated)
    }

    /// Decrements stock by `quantity` only while enough remains. Runs as a
    /// single conditional update so two checkouts cannot both take the last
    /// unit; the caller supplies its transaction.
    #[instrument(skip(self, conn))]
    pub async fn decrement_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".into(),
            ));
        }

        let result = entities::Product::update_many()
            .col_expr(
                product::Column::StockQuantity,
                Expr::col(product::Column::StockQuantity).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::IsActive.eq(true))
            .filter(product::Column::StockQuantity.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected != 1 {
            return Err(ServiceError::InsufficientStock(format!(
                "Product {} does not have {} units in stock",
                product_id, quantity
            )));
        }
        Ok(())
    }

    async fn slug_taken(&self, slug: &str) -> Result<bool, ServiceError> {
        Ok(entities::Product::find()
            .filter(product::Column::Slug.eq(slug))
            .count(self.db.as_ref())
            .await?
            > 0)
    }

    async fn unique_slug_for(&self, name: &str) -> Result<String, ServiceError> {
        let base = slugify(name);
        if base.is_empty() {
            return Err(ServiceError::ValidationError(
                "Cannot derive a slug from the product name".into(),
            ));
        }
        if !self.slug_taken(&base).await? {
            return Ok(base);
        }
        let suffix = Uuid::new_v4().simple().to_string();
        Ok(format!("{}-{}", base, &suffix[..8]))
    }
}

/// Lowercases and collapses everything that is not ASCII alphanumeric
/// into single dashes.
fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
