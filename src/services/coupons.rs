//! Coupon management and discount calculation.
//!
//! The discount math lives in [`calculate_discount`], a pure function over
//! a coupon snapshot and the order amounts, so it can be exercised without
//! a database. The service wraps it with the stateful pieces: per-user
//! redemption counting, admin CRUD, and the conditional usage-count
//! increment performed at checkout.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{self, coupon, coupon_usage, CouponModel, DiscountType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;

const MAX_CODE_LENGTH: usize = 64;
const PERCENT_DIVISOR: Decimal = Decimal::ONE_HUNDRED;

/// Computes the discount a coupon grants against an order.
///
/// Fails with [`ServiceError::InvalidCoupon`] when the coupon is inactive,
/// outside its validity window, or globally exhausted, and with
/// [`ServiceError::BelowMinimumPurchase`] when the subtotal does not meet
/// the coupon's minimum. The result never exceeds `subtotal + shipping_fee`
/// and is never negative.
///
/// Per-user limits are not checked here; they require a usage count and are
/// enforced by [`CouponService::validate_for_user`] and at redemption.
pub fn calculate_discount(
    coupon: &CouponModel,
    subtotal: Decimal,
    shipping_fee: Decimal,
    now: DateTime<Utc>,
) -> Result<Decimal, ServiceError> {
    if !coupon.is_active {
        return Err(ServiceError::InvalidCoupon(format!(
            "coupon {} is not active",
            coupon.code
        )));
    }
    if now < coupon.valid_from {
        return Err(ServiceError::InvalidCoupon(format!(
            "coupon {} is not valid yet",
            coupon.code
        )));
    }
    if let Some(valid_until) = coupon.valid_until {
        if now > valid_until {
            return Err(ServiceError::InvalidCoupon(format!(
                "coupon {} has expired",
                coupon.code
            )));
        }
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.usage_count >= limit {
            return Err(ServiceError::InvalidCoupon(format!(
                "coupon {} has reached its usage limit",
                coupon.code
            )));
        }
    }
    if subtotal < coupon.min_purchase_amount {
        return Err(ServiceError::BelowMinimumPurchase {
            subtotal,
            minimum: coupon.min_purchase_amount,
        });
    }

    let discount = match coupon.discount_type {
        DiscountType::Percentage => {
            let raw = subtotal * coupon.value / PERCENT_DIVISOR;
            match coupon.max_discount_amount {
                Some(cap) => raw.min(cap),
                None => raw,
            }
        }
        DiscountType::Fixed => coupon.value,
        DiscountType::FreeShipping => shipping_fee,
    };

    // A discount can never exceed what the order would otherwise cost.
    Ok(discount.min(subtotal + shipping_fee).max(Decimal::ZERO))
}

#[derive(Debug, Clone)]
pub struct CreateCouponInput {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub min_purchase_amount: Decimal,
    pub max_discount_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub per_user_limit: Option<i32>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCouponInput {
    pub description: Option<Option<String>>,
    pub value: Option<Decimal>,
    pub min_purchase_amount: Option<Decimal>,
    pub max_discount_amount: Option<Option<Decimal>>,
    pub usage_limit: Option<Option<i32>>,
    pub per_user_limit: Option<Option<i32>>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a coupon. The code is trimmed and stored uppercase.
    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_coupon(&self, input: CreateCouponInput) -> Result<CouponModel, ServiceError> {
        let code = normalize_code(&input.code)?;
        validate_coupon_fields(
            input.discount_type,
            input.value,
            input.min_purchase_amount,
            input.max_discount_amount,
            input.usage_limit,
            input.per_user_limit,
            input.valid_from,
            input.valid_until,
        )?;

        let existing = entities::Coupon::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Coupon code {} already exists",
                code
            )));
        }

        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            description: Set(input.description),
            discount_type: Set(input.discount_type),
            value: Set(input.value),
            min_purchase_amount: Set(input.min_purchase_amount),
            max_discount_amount: Set(input.max_discount_amount),
            usage_limit: Set(input.usage_limit),
            usage_count: Set(0),
            per_user_limit: Set(input.per_user_limit),
            valid_from: Set(input.valid_from),
            valid_until: Set(input.valid_until),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = model.insert(self.db.as_ref()).await?;

        info!(coupon_id = %created.id, code = %created.code, "Coupon created");
        self.event_sender
            .send_or_log(Event::CouponCreated(created.id))
            .await;
        Ok(created)
    }

    /// Updates coupon fields. `usage_count` is deliberately not updatable;
    /// it only moves through [`CouponService::redeem`].
    #[instrument(skip(self, input))]
    pub async fn update_coupon(
        &self,
        coupon_id: Uuid,
        input: UpdateCouponInput,
    ) -> Result<CouponModel, ServiceError> {
        let existing = self.get_coupon(coupon_id).await?;

        let value = input.value.unwrap_or(existing.value);
        let min_purchase = input
            .min_purchase_amount
            .unwrap_or(existing.min_purchase_amount);
        let max_discount = input
            .max_discount_amount
            .unwrap_or(existing.max_discount_amount);
        let usage_limit = input.usage_limit.unwrap_or(existing.usage_limit);
        let per_user_limit = input.per_user_limit.unwrap_or(existing.per_user_limit);
        let valid_from = input.valid_from.unwrap_or(existing.valid_from);
        let valid_until = input.valid_until.unwrap_or(existing.valid_until);

        validate_coupon_fields(
            existing.discount_type,
            value,
            min_purchase,
            max_discount,
            usage_limit,
            per_user_limit,
            valid_from,
            valid_until,
        )?;

        let mut active: coupon::ActiveModel = existing.into();
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        active.value = Set(value);
        active.min_purchase_amount = Set(min_purchase);
        active.max_discount_amount = Set(max_discount);
        active.usage_limit = Set(usage_limit);
        active.per_user_limit = Set(per_user_limit);
        active.valid_from = Set(valid_from);
        active.valid_until = Set(valid_until);
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(self.db.as_ref()).await?;
        info!(coupon_id = %updated.id, "Coupon updated");
        Ok(updated)
    }

    /// Deactivates a coupon so it can no longer be applied or redeemed.
    #[instrument(skip(self))]
    pub async fn deactivate_coupon(&self, coupon_id: Uuid) -> Result<CouponModel, ServiceError> {
        let existing = self.get_coupon(coupon_id).await?;
        let mut active: coupon::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;

        info!(coupon_id = %updated.id, code = %updated.code, "Coupon deactivated");
        self.event_sender
            .send_or_log(Event::CouponDeactivated(updated.id))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn get_coupon(&self, coupon_id: Uuid) -> Result<CouponModel, ServiceError> {
        entities::Coupon::find_by_id(coupon_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))
    }

    /// Looks a coupon up by code. Unknown codes surface as
    /// [`ServiceError::InvalidCoupon`] so callers cannot probe which codes
    /// exist.
    #[instrument(skip(self))]
    pub async fn get_coupon_by_code(&self, code: &str) -> Result<CouponModel, ServiceError> {
        let code = normalize_code(code)?;
        entities::Coupon::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::InvalidCoupon(format!("unknown coupon code {}", code)))
    }

    #[instrument(skip(self))]
    pub async fn list_coupons(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<CouponModel>, u64), ServiceError> {
        let paginator = entities::Coupon::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let coupons = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((coupons, total))
    }

    /// Full apply-time validation for one user: window, activity and
    /// global-limit checks, the per-user redemption count, and the
    /// discount computation itself.
    #[instrument(skip(self))]
    pub async fn validate_for_user(
        &self,
        code: &str,
        user_id: Uuid,
        subtotal: Decimal,
        shipping_fee: Decimal,
    ) -> Result<(CouponModel, Decimal), ServiceError> {
        let coupon = self.get_coupon_by_code(code).await?;
        self.check_per_user_limit(self.db.as_ref(), &coupon, user_id)
            .await?;
        let discount = calculate_discount(&coupon, subtotal, shipping_fee, Utc::now())?;
        Ok((coupon, discount))
    }

    /// Redeems a coupon for an order. Must run inside the checkout
    /// transaction so the usage row and order commit or roll back together.
    ///
    /// The usage counter is advanced with a conditional update that only
    /// matches while the counter is below the limit; two concurrent
    /// checkouts racing for the last redemption cannot both succeed.
    #[instrument(skip(self, conn))]
    pub async fn redeem<C: ConnectionTrait>(
        &self,
        conn: &C,
        coupon: &CouponModel,
        user_id: Uuid,
        order_id: Uuid,
        discount_amount: Decimal,
    ) -> Result<(), ServiceError> {
        if let Err(e) = self.check_per_user_limit(conn, coupon, user_id).await {
            metrics::COUPON_REDEMPTION_FAILURES_TOTAL.inc();
            return Err(e);
        }

        let result = entities::Coupon::update_many()
            .col_expr(
                coupon::Column::UsageCount,
                Expr::col(coupon::Column::UsageCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Id.eq(coupon.id))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(coupon::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(coupon::Column::UsageCount)
                            .lt(Expr::col(coupon::Column::UsageLimit)),
                    ),
            )
            .exec(conn)
            .await?;

        if result.rows_affected != 1 {
            metrics::COUPON_REDEMPTION_FAILURES_TOTAL.inc();
            return Err(ServiceError::InvalidCoupon(format!(
                "coupon {} is no longer redeemable",
                coupon.code
            )));
        }

        coupon_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(coupon.id),
            user_id: Set(user_id),
            order_id: Set(order_id),
            discount_amount: Set(discount_amount),
            used_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;

        metrics::COUPON_REDEMPTIONS_TOTAL.inc();
        info!(coupon_id = %coupon.id, %order_id, "Coupon redeemed");
        Ok(())
    }

    async fn check_per_user_limit<C: ConnectionTrait>(
        &self,
        conn: &C,
        coupon: &CouponModel,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        let Some(limit) = coupon.per_user_limit else {
            return Ok(());
        };
        let used = entities::CouponUsage::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon.id))
            .filter(coupon_usage::Column::UserId.eq(user_id))
            .count(conn)
            .await?;
        if used >= limit.max(0) as u64 {
            return Err(ServiceError::InvalidCoupon(format!(
                "coupon {} has already been used the maximum number of times for this account",
                coupon.code
            )));
        }
        Ok(())
    }
}

fn normalize_code(code: &str) -> Result<String, ServiceError> {
    let code = code.trim().to_uppercase();
    if code.is_empty() {
        return Err(ServiceError::ValidationError(
            "Coupon code cannot be empty".into(),
        ));
    }
    if code.len() > MAX_CODE_LENGTH {
        return Err(ServiceError::ValidationError(format!(
            "Coupon code cannot exceed {} characters",
            MAX_CODE_LENGTH
        )));
    }
    Ok(code)
}

#[allow(clippy::too_many_arguments)]
fn validate_coupon_fields(
    discount_type: DiscountType,
    value: Decimal,
    min_purchase_amount: Decimal,
    max_discount_amount: Option<Decimal>,
    usage_limit: Option<i32>,
    per_user_limit: Option<i32>,
    valid_from: DateTime<Utc>,
    valid_until: Option<DateTime<Utc>>,
) -> Result<(), ServiceError> {
    match discount_type {
        DiscountType::Percentage => {
            if value <= Decimal::ZERO || value > PERCENT_DIVISOR {
                return Err(ServiceError::ValidationError(
                    "Percentage value must be between 0 and 100".into(),
                ));
            }
        }
        DiscountType::Fixed => {
            if value <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Fixed discount value must be positive".into(),
                ));
            }
        }
        DiscountType::FreeShipping => {}
    }
    if min_purchase_amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Minimum purchase amount cannot be negative".into(),
        ));
    }
    if let Some(cap) = max_discount_amount {
        if cap <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Maximum discount amount must be positive".into(),
            ));
        }
    }
    if let Some(limit) = usage_limit {
        if limit <= 0 {
            return Err(ServiceError::ValidationError(
                "Usage limit must be positive".into(),
            ));
        }
    }
    if let Some(limit) = per_user_limit {
        if limit <= 0 {
            return Err(ServiceError::ValidationError(
                "Per-user limit must be positive".into(),
            ));
        }
    }
    if let Some(until) = valid_until {
        if until <= valid_from {
            return Err(ServiceError::ValidationError(
                "valid_until must be after valid_from".into(),
            ));
        }
    }
    Ok(())
}
