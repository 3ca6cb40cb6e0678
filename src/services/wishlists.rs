//! Wishlists. Each user has a single wishlist, created on first use.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{
    self, wishlist, wishlist_item, ProductModel, WishlistItemModel, WishlistModel,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::carts::{CartDetail, CartService};

/// A wishlist line together with the product it points at. The product is
/// absent when it has been archived since the item was added.
#[derive(Debug, Clone, Serialize)]
pub struct WishlistEntry {
    pub item: WishlistItemModel,
    pub product: Option<ProductModel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WishlistDetail {
    pub wishlist: WishlistModel,
    pub entries: Vec<WishlistEntry>,
}

#[derive(Clone)]
pub struct WishlistService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    carts: CartService,
}

impl WishlistService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        carts: CartService,
    ) -> Self {
        Self {
            db,
            event_sender,
            carts,
        }
    }

    /// Returns the user's wishlist with product summaries, creating it on
    /// first access.
    #[instrument(skip(self))]
    pub async fn get_wishlist(&self, user_id: Uuid) -> Result<WishlistDetail, ServiceError> {
        let wishlist = self.get_or_create_in(self.db.as_ref(), user_id).await?;
        self.detail(wishlist).await
    }

    /// Adds a product to the wishlist. Each product may appear once; a
    /// duplicate add fails with `Conflict`.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<WishlistDetail, ServiceError> {
        let wishlist = self.get_or_create_in(self.db.as_ref(), user_id).await?;

        let product = entities::Product::find_by_id(product_id)
            .one(self.db.as_ref())
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let duplicate = entities::WishlistItem::find()
            .filter(wishlist_item::Column::WishlistId.eq(wishlist.id))
            .filter(wishlist_item::Column::ProductId.eq(product.id))
            .count(self.db.as_ref())
            .await?
            > 0;
        if duplicate {
            return Err(ServiceError::Conflict(
                "Product is already on the wishlist".into(),
            ));
        }

        wishlist_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            wishlist_id: Set(wishlist.id),
            product_id: Set(product.id),
            added_at: Set(Utc::now()),
        }
        .insert(self.db.as_ref())
        .await?;

        info!(wishlist_id = %wishlist.id, %product_id, "Wishlist item added");
        self.event_sender
            .send_or_log(Event::WishlistItemAdded {
                wishlist_id: wishlist.id,
                product_id: product.id,
            })
            .await;
        self.detail(wishlist).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<WishlistDetail, ServiceError> {
        let wishlist = self.get_or_create_in(self.db.as_ref(), user_id).await?;

        let item = entities::WishlistItem::find()
            .filter(wishlist_item::Column::WishlistId.eq(wishlist.id))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not on the wishlist", product_id))
            })?;
        item.delete(self.db.as_ref()).await?;

        self.event_sender
            .send_or_log(Event::WishlistItemRemoved {
                wishlist_id: wishlist.id,
                product_id,
            })
            .await;
        self.detail(wishlist).await
    }

    /// Moves a wishlist item into the user's active cart. The wishlist
    /// removal and the cart insert share one transaction.
    #[instrument(skip(self))]
    pub async fn move_to_cart(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartDetail, ServiceError> {
        let txn = self.db.begin().await?;

        let wishlist = self.get_or_create_in(&txn, user_id).await?;
        let item = entities::WishlistItem::find()
            .filter(wishlist_item::Column::WishlistId.eq(wishlist.id))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not on the wishlist", product_id))
            })?;
        item.delete(&txn).await?;

        let (cart, cart_created) = self.carts.add_item_in(&txn, user_id, product_id, 1).await?;
        txn.commit().await?;

        if cart_created {
            self.event_sender
                .send_or_log(Event::CartCreated(cart.id))
                .await;
        }
        self.event_sender
            .send_or_log(Event::WishlistItemRemoved {
                wishlist_id: wishlist.id,
                product_id,
            })
            .await;
        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id,
            })
            .await;
        info!(wishlist_id = %wishlist.id, cart_id = %cart.id, %product_id, "Wishlist item moved to cart");

        self.carts.get_cart(user_id).await
    }

    async fn get_or_create_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
    ) -> Result<WishlistModel, ServiceError> {
        if let Some(wishlist) = entities::Wishlist::find()
            .filter(wishlist::Column::UserId.eq(user_id))
            .one(conn)
            .await?
        {
            return Ok(wishlist);
        }

        let now = Utc::now();
        let wishlist = wishlist::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            name: Set("Wishlist".to_string()),
            is_public: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;
        info!(wishlist_id = %wishlist.id, %user_id, "Wishlist created");
        Ok(wishlist)
    }

    async fn detail(&self, wishlist: WishlistModel) -> Result<WishlistDetail, ServiceError> {
        let entries = entities::WishlistItem::find()
            .filter(wishlist_item::Column::WishlistId.eq(wishlist.id))
            .order_by_asc(wishlist_item::Column::AddedAt)
            .find_also_related(entities::Product)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|(item, product)| WishlistEntry { item, product })
            .collect();
        Ok(WishlistDetail { wishlist, entries })
    }
}
