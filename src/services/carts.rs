//! Shopping carts.
//!
//! Cart money columns (`subtotal`, `shipping_fee`, `discount_amount`,
//! `total`) are a persisted snapshot, recomputed by
//! `recalculate_totals` inside the same transaction as every cart
//! mutation. An applied coupon is re-derived on each recalculation and
//! silently dropped from the cart when it no longer computes, e.g. when
//! removing an item pushes the subtotal under the coupon minimum.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, ModelTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::{
    self, cart, cart_coupon, cart_item, CartCouponModel, CartItemModel, CartModel, CartStatus,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::coupons::{calculate_discount, CouponService};

/// A cart with its lines and any applied coupon.
#[derive(Debug, Clone, Serialize)]
pub struct CartDetail {
    pub cart: CartModel,
    pub items: Vec<CartItemModel>,
    pub coupon: Option<CartCouponModel>,
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    coupons: CouponService,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        coupons: CouponService,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            coupons,
        }
    }

    /// Returns the user's active cart, creating an empty one on first use.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartDetail, ServiceError> {
        let (cart, created) = self.get_or_create_in(self.db.as_ref(), user_id).await?;
        if created {
            self.event_sender
                .send_or_log(Event::CartCreated(cart.id))
                .await;
        }
        self.detail(cart).await
    }

    /// Adds `quantity` of a product to the user's active cart, merging
    /// with an existing line for the same product.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartDetail, ServiceError> {
        let txn = self.db.begin().await?;
        let (cart, created) = self.add_item_in(&txn, user_id, product_id, quantity).await?;
        txn.commit().await?;

        if created {
            self.event_sender
                .send_or_log(Event::CartCreated(cart.id))
                .await;
        }
        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id,
            })
            .await;
        info!(cart_id = %cart.id, %product_id, quantity, "Cart item added");
        self.detail(cart).await
    }

    /// Transactional add-item used both by [`CartService::add_item`] and by
    /// the wishlist's move-to-cart, which supplies its own transaction.
    pub(crate) async fn add_item_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(CartModel, bool), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".into(),
            ));
        }

        let (cart, created) = self.get_or_create_in(conn, user_id).await?;

        let product = entities::Product::find_by_id(product_id)
            .one(conn)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let existing = entities::CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(conn)
            .await?;

        let new_quantity = existing.as_ref().map(|line| line.quantity).unwrap_or(0) + quantity;
        if product.stock_quantity < new_quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Only {} units of {} available",
                product.stock_quantity, product.name
            )));
        }

        let now = Utc::now();
        let line_total = product.price * Decimal::from(new_quantity);
        match existing {
            Some(line) => {
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(new_quantity);
                active.unit_price = Set(product.price);
                active.line_total = Set(line_total);
                active.updated_at = Set(now);
                active.update(conn).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    quantity: Set(new_quantity),
                    unit_price: Set(product.price),
                    line_total: Set(line_total),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(conn)
                .await?;
            }
        }

        let cart = self.recalculate_totals(conn, cart).await?;
        Ok((cart, created))
    }

    /// Sets a line's quantity. A quantity of zero or less removes the line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartDetail, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.active_cart_in(&txn, user_id).await?;

        let line = entities::CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
            })?;

        let removed = quantity <= 0;
        if removed {
            line.delete(&txn).await?;
        } else {
            let product = entities::Product::find_by_id(product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", product_id))
                })?;
            if product.stock_quantity < quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Only {} units of {} available",
                    product.stock_quantity, product.name
                )));
            }
            let unit_price = line.unit_price;
            let mut active: cart_item::ActiveModel = line.into();
            active.quantity = Set(quantity);
            active.line_total = Set(unit_price * Decimal::from(quantity));
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?;
        }

        let cart = self.recalculate_totals(&txn, cart).await?;
        txn.commit().await?;

        if removed {
            self.event_sender
                .send_or_log(Event::CartItemRemoved {
                    cart_id: cart.id,
                    product_id,
                })
                .await;
        }
        self.detail(cart).await
    }

    /// Removes a product line from the cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartDetail, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.active_cart_in(&txn, user_id).await?;

        let line = entities::CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
            })?;
        line.delete(&txn).await?;

        let cart = self.recalculate_totals(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.id,
                product_id,
            })
            .await;
        self.detail(cart).await
    }

    /// Empties the cart. The applied coupon, if any, is re-evaluated by the
    /// recalculation and dropped when it no longer computes.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<CartDetail, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.active_cart_in(&txn, user_id).await?;

        entities::CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        let cart = self.recalculate_totals(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart.id))
            .await;
        self.detail(cart).await
    }

    /// Applies a coupon to the cart, replacing any previously applied one.
    /// This is the first of the two coupon validations; the second runs at
    /// checkout when usage is actually consumed.
    #[instrument(skip(self))]
    pub async fn apply_coupon(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<CartDetail, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.active_cart_in(&txn, user_id).await?;

        let items = entities::CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&txn)
            .await?;
        let subtotal: Decimal = items.iter().map(|line| line.line_total).sum();
        let shipping_fee = self.shipping_fee_for(subtotal, !items.is_empty())?;

        let (coupon, discount) = self
            .coupons
            .validate_for_user(code, user_id, subtotal, shipping_fee)
            .await?;

        entities::CartCoupon::delete_many()
            .filter(cart_coupon::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        cart_coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            cart_id: Set(cart.id),
            coupon_id: Set(coupon.id),
            code: Set(coupon.code.clone()),
            discount_amount: Set(discount),
            applied_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        let cart = self.recalculate_totals(&txn, cart).await?;
        txn.commit().await?;

        info!(cart_id = %cart.id, coupon_id = %coupon.id, %discount, "Coupon applied to cart");
        self.event_sender
            .send_or_log(Event::CouponApplied {
                cart_id: cart.id,
                coupon_id: coupon.id,
                discount_amount: discount,
            })
            .await;
        self.detail(cart).await
    }

    /// Removes the applied coupon from the cart.
    #[instrument(skip(self))]
    pub async fn remove_coupon(&self, user_id: Uuid) -> Result<CartDetail, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = self.active_cart_in(&txn, user_id).await?;

        let applied = entities::CartCoupon::find()
            .filter(cart_coupon::Column::CartId.eq(cart.id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("No coupon applied to the cart".into()))?;
        let coupon_id = applied.coupon_id;
        applied.delete(&txn).await?;

        let cart = self.recalculate_totals(&txn, cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CouponRemoved {
                cart_id: cart.id,
                coupon_id,
            })
            .await;
        self.detail(cart).await
    }

    /// Marks a cart as checked out. Called from the checkout transaction.
    pub(crate) async fn mark_checked_out<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart: CartModel,
    ) -> Result<CartModel, ServiceError> {
        let mut active: cart::ActiveModel = cart.into();
        active.status = Set(CartStatus::CheckedOut);
        active.updated_at = Set(Utc::now());
        Ok(active.update(conn).await?)
    }

    /// Loads the user's active cart inside `conn`, failing when none exists.
    pub(crate) async fn active_cart_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        entities::Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("No active cart".into()))
    }

    async fn get_or_create_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
    ) -> Result<(CartModel, bool), ServiceError> {
        if let Some(cart) = entities::Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .one(conn)
            .await?
        {
            return Ok((cart, false));
        }

        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            status: Set(CartStatus::Active),
            subtotal: Set(Decimal::ZERO),
            discount_amount: Set(Decimal::ZERO),
            shipping_fee: Set(Decimal::ZERO),
            total: Set(Decimal::ZERO),
            currency: Set(self.config.default_currency.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;
        info!(cart_id = %cart.id, %user_id, "Cart created");
        Ok((cart, true))
    }

    /// Recomputes the persisted money snapshot from the cart lines and the
    /// applied coupon. Must run inside the mutating transaction.
    pub(crate) async fn recalculate_totals<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart: CartModel,
    ) -> Result<CartModel, ServiceError> {
        let items = entities::CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(conn)
            .await?;
        let subtotal: Decimal = items.iter().map(|line| line.line_total).sum();
        let shipping_fee = self.shipping_fee_for(subtotal, !items.is_empty())?;

        let applied = entities::CartCoupon::find()
            .filter(cart_coupon::Column::CartId.eq(cart.id))
            .one(conn)
            .await?;
        let discount_amount = match applied {
            Some(applied) => {
                let coupon = entities::Coupon::find_by_id(applied.coupon_id)
                    .one(conn)
                    .await?;
                let computed = coupon.as_ref().and_then(|coupon| {
                    calculate_discount(coupon, subtotal, shipping_fee, Utc::now()).ok()
                });
                match computed {
                    Some(discount) => {
                        if discount != applied.discount_amount {
                            let mut active: cart_coupon::ActiveModel = applied.into();
                            active.discount_amount = Set(discount);
                            active.update(conn).await?;
                        }
                        discount
                    }
                    None => {
                        info!(cart_id = %cart.id, "Applied coupon no longer computes, dropping");
                        applied.delete(conn).await?;
                        Decimal::ZERO
                    }
                }
            }
            None => Decimal::ZERO,
        };

        let total = (subtotal + shipping_fee - discount_amount).max(Decimal::ZERO);

        let mut active: cart::ActiveModel = cart.into();
        active.subtotal = Set(subtotal);
        active.shipping_fee = Set(shipping_fee);
        active.discount_amount = Set(discount_amount);
        active.total = Set(total);
        active.updated_at = Set(Utc::now());
        Ok(active.update(conn).await?)
    }

    /// Shipping is free for empty carts and at or above the configured
    /// threshold; otherwise the configured flat fee applies.
    pub(crate) fn shipping_fee_for(
        &self,
        subtotal: Decimal,
        has_items: bool,
    ) -> Result<Decimal, ServiceError> {
        if !has_items {
            return Ok(Decimal::ZERO);
        }
        let threshold = Decimal::try_from(self.config.free_shipping_threshold).map_err(|e| {
            ServiceError::InternalError(format!("invalid free_shipping_threshold: {}", e))
        })?;
        if subtotal >= threshold {
            return Ok(Decimal::ZERO);
        }
        Decimal::try_from(self.config.standard_shipping_fee).map_err(|e| {
            ServiceError::InternalError(format!("invalid standard_shipping_fee: {}", e))
        })
    }

    async fn detail(&self, cart: CartModel) -> Result<CartDetail, ServiceError> {
        let items = entities::CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        let coupon = entities::CartCoupon::find()
            .filter(cart_coupon::Column::CartId.eq(cart.id))
            .one(self.db.as_ref())
            .await?;
        Ok(CartDetail {
            cart,
            items,
            coupon,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    // Default config: free shipping from 50.00, flat fee 10.00.
    fn service() -> CartService {
        let cfg = Arc::new(AppConfig::new(
            "sqlite::memory:".to_string(),
            "redis://127.0.0.1:6379".to_string(),
            "kV2xGqPz9wNfRtYcLmHbJdAeUoQi5nS3WvXkZrTy7CgEp1MhDuBsOjIl4aF6e0K8".to_string(),
            3600,
            "127.0.0.1".to_string(),
            8080,
            "test".to_string(),
        ));
        let (tx, _rx) = mpsc::channel(1);
        let db = Arc::new(DatabaseConnection::Disconnected);
        let sender = Arc::new(EventSender::new(tx));
        let coupons = CouponService::new(db.clone(), sender.clone());
        CartService::new(db, sender, cfg, coupons)
    }

    #[rstest]
    #[case::empty_cart(dec!(0), false, dec!(0))]
    #[case::just_under_threshold(dec!(49.99), true, dec!(10))]
    #[case::exactly_at_threshold(dec!(50), true, dec!(0))]
    #[case::above_threshold(dec!(120), true, dec!(0))]
    #[case::tiny_order(dec!(0.01), true, dec!(10))]
    fn shipping_fee_follows_the_threshold(
        #[case] subtotal: Decimal,
        #[case] has_items: bool,
        #[case] expected: Decimal,
    ) {
        let fee = service().shipping_fee_for(subtotal, has_items).unwrap();
        assert_eq!(fee, expected);
    }
}
