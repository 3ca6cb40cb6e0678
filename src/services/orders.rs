//! Checkout and order lifecycle.
//!
//! Checkout is one transaction: stock decrements, coupon redemption, the
//! order snapshot and the cart status flip all commit or roll back
//! together. The applied coupon is validated a second time here (the first
//! was at apply) and its usage consumed through the conditional update in
//! the coupon service, so a coupon can never be redeemed past its limits
//! even under concurrent checkouts.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{
    self, cart_coupon, cart_item, order, order_item, product, OrderModel, OrderStatus,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;
use crate::services::carts::CartService;
use crate::services::coupons::{calculate_discount, CouponService};
use crate::services::products::ProductService;

/// An order with its line items.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: OrderModel,
    pub items: Vec<entities::OrderItemModel>,
}

#[derive(Debug, Clone, Default)]
pub struct CheckoutInput {
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    coupons: CouponService,
    products: ProductService,
    carts: CartService,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        coupons: CouponService,
        products: ProductService,
        carts: CartService,
    ) -> Self {
        Self {
            db,
            event_sender,
            coupons,
            products,
            carts,
        }
    }

    /// Converts the user's active cart into an order.
    #[instrument(skip(self, input))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        input: CheckoutInput,
    ) -> Result<OrderDetail, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = self.carts.active_cart_in(&txn, user_id).await?;
        let lines = entities::CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&txn)
            .await?;
        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "Cannot check out an empty cart".into(),
            ));
        }

        let subtotal: Decimal = lines.iter().map(|line| line.line_total).sum();
        let shipping_fee = self.carts.shipping_fee_for(subtotal, true)?;

        // Checkout-time coupon validation. Unlike cart recalculation this
        // fails loudly instead of silently dropping the coupon, so the
        // buyer never pays a different total than the cart promised.
        let applied = entities::CartCoupon::find()
            .filter(cart_coupon::Column::CartId.eq(cart.id))
            .one(&txn)
            .await?;
        let (coupon, discount_amount) = match &applied {
            Some(applied) => {
                let coupon = entities::Coupon::find_by_id(applied.coupon_id)
                    .one(&txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InvalidCoupon(format!(
                            "coupon {} no longer exists",
                            applied.code
                        ))
                    })?;
                let discount = calculate_discount(&coupon, subtotal, shipping_fee, Utc::now())?;
                (Some(coupon), discount)
            }
            None => (None, Decimal::ZERO),
        };
        let total = (subtotal + shipping_fee - discount_amount).max(Decimal::ZERO);

        // Product names for the order snapshot, fetched before the stock
        // decrements touch the rows.
        let product_ids: Vec<Uuid> = lines.iter().map(|line| line.product_id).collect();
        let names: HashMap<Uuid, String> = entities::Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        for line in &lines {
            self.products
                .decrement_stock(&txn, line.product_id, line.quantity)
                .await?;
        }

        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            order_number: Set(generate_order_number()),
            status: Set(OrderStatus::Pending),
            subtotal: Set(subtotal),
            discount_amount: Set(discount_amount),
            shipping_fee: Set(shipping_fee),
            total: Set(total),
            currency: Set(cart.currency.clone()),
            coupon_code: Set(coupon.as_ref().map(|c| c.code.clone())),
            shipping_address: Set(input.shipping_address),
            notes: Set(input.notes),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(line.product_id),
                product_name: Set(names
                    .get(&line.product_id)
                    .cloned()
                    .unwrap_or_else(|| line.product_id.to_string())),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                line_total: Set(line.line_total),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        if let Some(coupon) = &coupon {
            self.coupons
                .redeem(&txn, coupon, user_id, order.id, discount_amount)
                .await?;
        }

        self.carts.mark_checked_out(&txn, cart).await?;
        txn.commit().await?;

        metrics::ORDERS_CREATED_TOTAL.inc();
        info!(order_id = %order.id, order_number = %order.order_number, %total, "Order placed");
        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: order.id,
                user_id,
                order_number: order.order_number.clone(),
                total,
            })
            .await;
        if let Some(coupon) = &coupon {
            self.event_sender
                .send_or_log(Event::CouponRedeemed {
                    coupon_id: coupon.id,
                    order_id: order.id,
                    user_id,
                    discount_amount,
                })
                .await;
        }

        Ok(OrderDetail { order, items })
    }

    /// Fetches an order with its items. Customers may only see their own
    /// orders; staff see all.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
        actor_is_staff: bool,
    ) -> Result<OrderDetail, ServiceError> {
        let order = entities::Order::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        if order.user_id != actor_id && !actor_is_staff {
            return Err(ServiceError::Forbidden(
                "You do not have access to this order".into(),
            ));
        }

        let items = entities::OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(self.db.as_ref())
            .await?;
        Ok(OrderDetail { order, items })
    }

    #[instrument(skip(self))]
    pub async fn list_user_orders(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = entities::Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Staff listing across all users, optionally filtered by status.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let mut query = entities::Order::find();
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }
        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Advances an order along the fulfillment sequence. Staff only; the
    /// handler layer enforces the role.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let order = entities::Order::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !order.status.can_transition_to(next) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot transition order from {} to {}",
                order.status.as_str(),
                next.as_str()
            )));
        }

        let old_status = order.status;
        let user_id = order.user_id;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(next);
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;

        info!(%order_id, from = old_status.as_str(), to = next.as_str(), "Order status changed");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                user_id,
                old_status: old_status.as_str().to_string(),
                new_status: next.as_str().to_string(),
            })
            .await;
        Ok(updated)
    }

    /// Cancels an order that has not shipped, restocking its items. The
    /// owner or staff may cancel.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
        actor_is_staff: bool,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = entities::Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        if order.user_id != actor_id && !actor_is_staff {
            return Err(ServiceError::Forbidden(
                "You do not have access to this order".into(),
            ));
        }
        if !order.status.can_transition_to(OrderStatus::Cancelled) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot cancel an order in status {}",
                order.status.as_str()
            )));
        }

        let items = entities::OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&txn)
            .await?;
        for item in &items {
            entities::Product::update_many()
                .col_expr(
                    product::Column::StockQuantity,
                    Expr::col(product::Column::StockQuantity).add(item.quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(product::Column::Id.eq(item.product_id))
                .exec(&txn)
                .await?;
        }

        let user_id = order.user_id;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(%order_id, "Order cancelled");
        self.event_sender
            .send_or_log(Event::OrderCancelled { order_id, user_id })
            .await;
        Ok(updated)
    }
}

fn generate_order_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_uppercase();
    format!("ORD-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_carry_the_date_prefix() {
        let number = generate_order_number();
        let expected_prefix = format!("ORD-{}-", Utc::now().format("%Y%m%d"));
        assert!(number.starts_with(&expected_prefix), "got {}", number);
        assert_eq!(number.len(), expected_prefix.len() + 6);
    }

    #[test]
    fn order_numbers_are_unique_enough() {
        let a = generate_order_number();
        let b = generate_order_number();
        // Same date prefix, random suffixes.
        assert_ne!(a, b);
    }
}
