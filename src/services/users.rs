//! User profiles and account administration.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{self, user, UserModel, UserRole};
use crate::errors::ServiceError;
use crate::events::EventSender;

#[derive(Debug, Clone, Default)]
pub struct UpdateProfileInput {
    pub name: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    #[allow(dead_code)]
    event_sender: Arc<EventSender>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, user_id: Uuid) -> Result<UserModel, ServiceError> {
        entities::User::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }

    #[instrument(skip(self, input))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        input: UpdateProfileInput,
    ) -> Result<UserModel, ServiceError> {
        let existing = self.get_user(user_id).await?;

        let mut active: user::ActiveModel = existing.into();
        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ServiceError::ValidationError("Name cannot be empty".into()));
            }
            active.name = Set(name);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Staff listing with optional name/email search.
    #[instrument(skip(self))]
    pub async fn list_users(
        &self,
        search: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<UserModel>, u64), ServiceError> {
        let mut query = entities::User::find();
        if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(user::Column::Email.contains(search))
                    .add(user::Column::Name.contains(search)),
            );
        }
        let paginator = query
            .order_by_desc(user::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let users = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((users, total))
    }

    /// Admin-only role change.
    #[instrument(skip(self))]
    pub async fn set_role(&self, user_id: Uuid, role: UserRole) -> Result<UserModel, ServiceError> {
        let existing = self.get_user(user_id).await?;
        let mut active: user::ActiveModel = existing.into();
        active.role = Set(role);
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;
        info!(%user_id, role = role.as_str(), "User role changed");
        Ok(updated)
    }

    /// Disables an account. Inactive users cannot log in again; tokens
    /// already issued remain valid until they expire.
    #[instrument(skip(self))]
    pub async fn set_active(
        &self,
        user_id: Uuid,
        is_active: bool,
    ) -> Result<UserModel, ServiceError> {
        let existing = self.get_user(user_id).await?;
        let mut active: user::ActiveModel = existing.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;
        info!(%user_id, is_active, "User active flag changed");
        Ok(updated)
    }
}
