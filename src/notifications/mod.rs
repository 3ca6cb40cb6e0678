use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use slog::{info, warn, Logger};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::entities;
use crate::events::{Event, EventHandler};

pub mod email;

pub use email::{EmailError, Mailer};

/// Maximum feed entries retained per user.
const FEED_CAP: isize = 100;

/// Represents an in-app notification
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub subject: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        notification_type: NotificationType,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            notification_type,
            subject: subject.into(),
            body: body.into(),
            read: false,
            created_at: Utc::now(),
        }
    }
}

/// Types of notifications
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    OrderStatus,
    TicketUpdate,
    ReviewModeration,
    SystemMessage,
}

/// Notification service errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Notification not found: {0}")]
    NotFound(Uuid),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<NotificationError> for crate::errors::ServiceError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::NotFound(id) => {
                crate::errors::ServiceError::NotFound(format!("Notification {} not found", id))
            }
            other => crate::errors::ServiceError::InternalError(other.to_string()),
        }
    }
}

/// Trait for notification feed operations
#[async_trait]
pub trait NotificationFeed: Send + Sync {
    async fn push(&self, notification: Notification) -> Result<(), NotificationError>;
    async fn list(&self, user_id: Uuid, limit: usize) -> Result<Vec<Notification>, NotificationError>;
    async fn unread_count(&self, user_id: Uuid) -> Result<u64, NotificationError>;
    async fn mark_as_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<(), NotificationError>;
    async fn clear(&self, user_id: Uuid) -> Result<(), NotificationError>;
}

/// Redis-backed notification feed.
///
/// Each user's feed is a sorted set scored by creation timestamp and
/// trimmed to the newest [`FEED_CAP`] entries; each notification is also
/// stored under its own key so it can be addressed for mark-as-read.
#[derive(Clone)]
pub struct RedisNotificationService {
    redis: Arc<Client>,
    logger: Logger,
}

impl RedisNotificationService {
    pub fn new(redis_url: &str, logger: Logger) -> Result<Self, NotificationError> {
        let redis = Client::open(redis_url).map_err(NotificationError::Redis)?;
        Ok(Self::with_client(Arc::new(redis), logger))
    }

    pub fn with_client(redis: Arc<Client>, logger: Logger) -> Self {
        Self { redis, logger }
    }

    fn user_key(user_id: Uuid) -> String {
        format!("notifications:user:{}", user_id)
    }

    fn notification_key(id: Uuid) -> String {
        format!("notification:{}", id)
    }
}

#[async_trait]
impl NotificationFeed for RedisNotificationService {
    #[instrument(skip(self, notification), fields(id = %notification.id, user_id = %notification.user_id))]
    async fn push(&self, notification: Notification) -> Result<(), NotificationError> {
        let mut conn = self.redis.get_async_connection().await?;
        let json = serde_json::to_string(&notification)?;
        let user_key = Self::user_key(notification.user_id);

        redis::pipe()
            .atomic()
            .set(Self::notification_key(notification.id), &json)
            .zadd(&user_key, &json, notification.created_at.timestamp())
            .zremrangebyrank(&user_key, 0, -(FEED_CAP + 1))
            .query_async::<_, ()>(&mut conn)
            .await?;

        info!(self.logger, "Notification pushed";
            "type" => format!("{:?}", notification.notification_type)
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, user_id: Uuid, limit: usize) -> Result<Vec<Notification>, NotificationError> {
        let mut conn = self.redis.get_async_connection().await?;
        let user_key = Self::user_key(user_id);

        let notifications_json: Vec<String> =
            conn.zrevrange(user_key, 0, limit as isize - 1).await?;

        let notifications: Vec<Notification> = notifications_json
            .iter()
            .map(|json| serde_json::from_str(json))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(notifications)
    }

    #[instrument(skip(self))]
    async fn unread_count(&self, user_id: Uuid) -> Result<u64, NotificationError> {
        let mut conn = self.redis.get_async_connection().await?;
        let user_key = Self::user_key(user_id);

        let notifications_json: Vec<String> = conn.zrange(&user_key, 0, -1).await?;
        let unread = notifications_json
            .iter()
            .filter_map(|json| serde_json::from_str::<Notification>(json).ok())
            .filter(|n| !n.read)
            .count() as u64;
        Ok(unread)
    }

    #[instrument(skip(self))]
    async fn mark_as_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<(), NotificationError> {
        let mut conn = self.redis.get_async_connection().await?;
        let notification_key = Self::notification_key(notification_id);

        let json: Option<String> = conn.get(&notification_key).await?;
        let stored = json.ok_or(NotificationError::NotFound(notification_id))?;
        let mut notification: Notification = serde_json::from_str(&stored)?;

        if notification.user_id != user_id {
            return Err(NotificationError::NotFound(notification_id));
        }

        if !notification.read {
            notification.read = true;
            let updated_json = serde_json::to_string(&notification)?;
            let user_key = Self::user_key(user_id);

            // The zset member is the serialized payload, so the stale
            // entry must be removed before the updated one is added.
            redis::pipe()
                .atomic()
                .set(&notification_key, &updated_json)
                .zrem(&user_key, &stored)
                .zadd(&user_key, &updated_json, notification.created_at.timestamp())
                .query_async::<_, ()>(&mut conn)
                .await?;

            info!(self.logger, "Notification marked as read");
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear(&self, user_id: Uuid) -> Result<(), NotificationError> {
        let mut conn = self.redis.get_async_connection().await?;
        let user_key = Self::user_key(user_id);

        let notifications_json: Vec<String> = conn.zrange(&user_key, 0, -1).await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for json in &notifications_json {
            if let Ok(n) = serde_json::from_str::<Notification>(json) {
                pipe.del(Self::notification_key(n.id)).ignore();
            }
        }
        pipe.del(&user_key).ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;

        info!(self.logger, "Notification feed cleared"; "count" => notifications_json.len());
        Ok(())
    }
}

/// Event-loop subscriber that fans domain events out to email and the
/// in-app feed. Delivery is at-most-once; failures are logged and
/// swallowed so a dead SMTP relay or Redis node never fails the request
/// that produced the event.
pub struct NotificationEventHandler {
    db: Arc<DatabaseConnection>,
    mailer: Option<Mailer>,
    feed: Option<RedisNotificationService>,
    logger: Logger,
}

impl NotificationEventHandler {
    pub fn new(
        db: Arc<DatabaseConnection>,
        mailer: Option<Mailer>,
        feed: Option<RedisNotificationService>,
        logger: Logger,
    ) -> Self {
        Self {
            db,
            mailer,
            feed,
            logger,
        }
    }

    async fn user_email(&self, user_id: Uuid) -> Option<String> {
        match entities::User::find_by_id(user_id).one(self.db.as_ref()).await {
            Ok(Some(user)) => Some(user.email),
            Ok(None) => {
                warn!(self.logger, "User not found for notification"; "user_id" => %user_id);
                None
            }
            Err(e) => {
                warn!(self.logger, "User lookup failed for notification"; "error" => %e);
                None
            }
        }
    }

    async fn email(&self, user_id: Uuid, subject: &str, body: &str) {
        let Some(mailer) = &self.mailer else {
            return;
        };
        let Some(address) = self.user_email(user_id).await else {
            return;
        };
        if let Err(e) = mailer.send(&address, subject, body).await {
            warn!(self.logger, "Email delivery failed"; "error" => %e);
        }
    }

    async fn feed(&self, notification: Notification) {
        let Some(feed) = &self.feed else {
            return;
        };
        if let Err(e) = feed.push(notification).await {
            warn!(self.logger, "Feed push failed"; "error" => %e);
        }
    }
}

#[async_trait]
impl EventHandler for NotificationEventHandler {
    async fn handle_event(&self, event: Event) -> Result<(), String> {
        match event {
            Event::UserRegistered { user_id, name, .. } => {
                self.email(
                    user_id,
                    "Welcome to the store",
                    &format!("Hi {},\n\nYour account has been created.", name),
                )
                .await;
            }
            Event::OrderCreated {
                order_id,
                user_id,
                order_number,
                total,
            } => {
                let body = format!(
                    "Your order {} has been placed. Total: {}.",
                    order_number, total
                );
                self.email(user_id, "Order confirmation", &body).await;
                self.feed(Notification::new(
                    user_id,
                    NotificationType::OrderStatus,
                    "Order placed",
                    format!("Order {} ({}) was placed.", order_number, order_id),
                ))
                .await;
            }
            Event::OrderStatusChanged {
                order_id,
                user_id,
                new_status,
                ..
            } => {
                self.feed(Notification::new(
                    user_id,
                    NotificationType::OrderStatus,
                    "Order update",
                    format!("Order {} is now {}.", order_id, new_status),
                ))
                .await;
            }
            Event::OrderCancelled { order_id, user_id } => {
                self.feed(Notification::new(
                    user_id,
                    NotificationType::OrderStatus,
                    "Order cancelled",
                    format!("Order {} was cancelled.", order_id),
                ))
                .await;
            }
            Event::TicketStatusChanged {
                ticket_id,
                user_id,
                new_status,
                ..
            } => {
                let body = format!("Ticket {} is now {}.", ticket_id, new_status);
                self.email(user_id, "Support ticket update", &body).await;
                self.feed(Notification::new(
                    user_id,
                    NotificationType::TicketUpdate,
                    "Ticket update",
                    body,
                ))
                .await;
            }
            Event::TicketMessagePosted {
                ticket_id,
                user_id,
                sender_role,
            } => {
                // Customers get notified about staff replies, not their own.
                if sender_role != "customer" {
                    let body = format!("New reply on ticket {}.", ticket_id);
                    self.email(user_id, "New reply on your support ticket", &body)
                        .await;
                    self.feed(Notification::new(
                        user_id,
                        NotificationType::TicketUpdate,
                        "New reply",
                        body,
                    ))
                    .await;
                }
            }
            Event::ReviewModerated {
                review_id,
                user_id,
                new_status,
                ..
            } => {
                self.feed(Notification::new(
                    user_id,
                    NotificationType::ReviewModeration,
                    "Review update",
                    format!("Your review {} is now {}.", review_id, new_status),
                ))
                .await;
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_serializes_type_tag() {
        let n = Notification::new(
            Uuid::new_v4(),
            NotificationType::OrderStatus,
            "Order placed",
            "Order ORD-1 was placed.",
        );
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("\"type\":\"order_status\""));
        assert!(!n.read);

        let back: Notification = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, n.id);
        assert_eq!(back.notification_type, NotificationType::OrderStatus);
    }

    #[test]
    fn feed_keys_are_namespaced_per_user() {
        let user = Uuid::new_v4();
        let key = RedisNotificationService::user_key(user);
        assert_eq!(key, format!("notifications:user:{}", user));
    }
}
