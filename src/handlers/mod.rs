pub mod carts;
pub mod common;
pub mod coupons;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod support;
pub mod users;
pub mod wishlists;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::notifications::RedisNotificationService;
use crate::services;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub products: services::ProductService,
    pub reviews: services::ReviewService,
    pub coupons: services::CouponService,
    pub carts: services::CartService,
    pub orders: services::OrderService,
    pub wishlists: services::WishlistService,
    pub support: services::SupportService,
    pub users: services::UserService,
    pub notifications: RedisNotificationService,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        notifications: RedisNotificationService,
    ) -> Self {
        let coupons = services::CouponService::new(db.clone(), event_sender.clone());
        let products = services::ProductService::new(
            db.clone(),
            event_sender.clone(),
            config.default_currency.clone(),
        );
        let carts = services::CartService::new(
            db.clone(),
            event_sender.clone(),
            config.clone(),
            coupons.clone(),
        );
        let orders = services::OrderService::new(
            db.clone(),
            event_sender.clone(),
            coupons.clone(),
            products.clone(),
            carts.clone(),
        );
        let wishlists =
            services::WishlistService::new(db.clone(), event_sender.clone(), carts.clone());
        let reviews = services::ReviewService::new(db.clone(), event_sender.clone());
        let support = services::SupportService::new(db.clone(), event_sender.clone());
        let users = services::UserService::new(db, event_sender);

        Self {
            products,
            reviews,
            coupons,
            carts,
            orders,
            wishlists,
            support,
            users,
            notifications,
        }
    }
}
