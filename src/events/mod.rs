use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed
    /// or full. Event delivery must never fail the originating request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            error!("Event delivery failed: {}", e);
        }
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // User events
    UserRegistered {
        user_id: Uuid,
        email: String,
        name: String,
    },

    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductArchived(Uuid),

    // Cart events
    CartCreated(Uuid),
    CartItemAdded {
        cart_id: Uuid,
        product_id: Uuid,
    },
    CartItemRemoved {
        cart_id: Uuid,
        product_id: Uuid,
    },
    CartCleared(Uuid),

    // Coupon events
    CouponCreated(Uuid),
    CouponDeactivated(Uuid),
    CouponApplied {
        cart_id: Uuid,
        coupon_id: Uuid,
        discount_amount: Decimal,
    },
    CouponRemoved {
        cart_id: Uuid,
        coupon_id: Uuid,
    },
    CouponRedeemed {
        coupon_id: Uuid,
        order_id: Uuid,
        user_id: Uuid,
        discount_amount: Decimal,
    },

    // Order events
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        order_number: String,
        total: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        user_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled {
        order_id: Uuid,
        user_id: Uuid,
    },

    // Review events
    ReviewSubmitted {
        review_id: Uuid,
        product_id: Uuid,
        user_id: Uuid,
    },
    ReviewModerated {
        review_id: Uuid,
        product_id: Uuid,
        user_id: Uuid,
        new_status: String,
    },
    ReviewVoted {
        review_id: Uuid,
        product_id: Uuid,
    },
    ReviewFlagged {
        review_id: Uuid,
        product_id: Uuid,
        report_count: i32,
    },
    ReviewDeleted {
        review_id: Uuid,
        product_id: Uuid,
    },
    ProductRatingRecalculated {
        product_id: Uuid,
        rating: f64,
        review_count: i32,
    },

    // Wishlist events
    WishlistItemAdded {
        wishlist_id: Uuid,
        product_id: Uuid,
    },
    WishlistItemRemoved {
        wishlist_id: Uuid,
        product_id: Uuid,
    },

    // Support ticket events
    TicketOpened {
        ticket_id: Uuid,
        user_id: Uuid,
        ticket_number: String,
        subject: String,
    },
    TicketAssigned {
        ticket_id: Uuid,
        user_id: Uuid,
        agent_id: Uuid,
    },
    TicketStatusChanged {
        ticket_id: Uuid,
        user_id: Uuid,
        old_status: String,
        new_status: String,
    },
    TicketMessagePosted {
        ticket_id: Uuid,
        user_id: Uuid,
        sender_role: String,
    },
    TicketEscalated {
        ticket_id: Uuid,
        user_id: Uuid,
    },

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// Create a generic event with string data
    pub fn with_data(data: String) -> Self {
        Event::Generic {
            message: data,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

// Define a trait for handling events. Handlers implementing this trait will
// process events asynchronously (email delivery, the notification feed).
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Consumes the event stream and fans each event out to the registered
/// handlers. Handler failures are logged, never retried; delivery is
/// at-most-once and strictly in-process.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!("Received event: {:?}", event);

        let dispatches = handlers
            .iter()
            .map(|handler| {
                let handler = Arc::clone(handler);
                let event = event.clone();
                async move { handler.handle_event(event).await }
            })
            .collect::<Vec<_>>();

        for result in join_all(dispatches).await {
            if let Err(e) = result {
                error!("Event handler failed: {}", e);
            }
        }
    }

    warn!("Event processing loop has ended");
}
