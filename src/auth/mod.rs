/*!
 * # Authentication and Authorization Module
 *
 * JWT bearer authentication backed by the `users` table, plus the
 * role/permission middleware used to gate staff-only routes.
 *
 * Tokens are HS256-signed access tokens carrying the user's single role.
 * Permissions are not embedded in the token; they are resolved from the
 * role table in [`rbac`] when the request is authenticated, so a role
 * definition change takes effect without reissuing tokens.
 */

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{self, user, UserModel, UserRole};
use crate::events::{Event, EventSender};

mod rbac;

pub use rbac::{perms, RbacService, Role, ROLES};

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub iss: String,
    pub aud: String,
}

/// Authenticated user data extracted from a validated token
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub permissions: Vec<String>,
    pub token_id: String,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_str() == role
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| rbac::permission_matches(p, permission))
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Agents and admins; the moderation and ticket surfaces.
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingAuth,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Email is already registered")]
    EmailTaken,

    #[error("Password rejected: {0}")]
    WeakPassword(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        AuthError::DatabaseError(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Self::MissingAuth => (StatusCode::UNAUTHORIZED, "AUTH_MISSING"),
            Self::InvalidCredentials => (StatusCode::UNAUTHORIZED, "AUTH_INVALID_CREDENTIALS"),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "AUTH_INVALID_TOKEN"),
            Self::TokenExpired => (StatusCode::UNAUTHORIZED, "AUTH_TOKEN_EXPIRED"),
            Self::TokenCreation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "AUTH_TOKEN_CREATION"),
            Self::UserNotFound => (StatusCode::UNAUTHORIZED, "AUTH_USER_NOT_FOUND"),
            Self::AccountDisabled => (StatusCode::FORBIDDEN, "AUTH_ACCOUNT_DISABLED"),
            Self::EmailTaken => (StatusCode::CONFLICT, "AUTH_EMAIL_TAKEN"),
            Self::WeakPassword(_) => (StatusCode::UNPROCESSABLE_ENTITY, "AUTH_WEAK_PASSWORD"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "AUTH_VALIDATION"),
            Self::InsufficientPermissions => (StatusCode::FORBIDDEN, "AUTH_FORBIDDEN"),
            Self::DatabaseError(_) | Self::InternalError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "AUTH_INTERNAL")
            }
        };

        let message = match &self {
            // Never leak database details to the client.
            Self::DatabaseError(_) | Self::InternalError(_) => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub token_expiration: Duration,
    pub min_password_length: usize,
}

impl AuthConfig {
    pub fn from_app_config(config: &crate::config::AppConfig) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            jwt_issuer: config.auth_issuer.clone(),
            jwt_audience: config.auth_audience.clone(),
            token_expiration: Duration::from_secs(config.jwt_expiration as u64),
            min_password_length: 8,
        }
    }
}

/// Hash a plaintext password using Argon2id with a random salt. The
/// PHC-formatted output embeds algorithm parameters and salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::InternalError(format!("Password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored PHC-formatted hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AuthError::InternalError(format!("Stored hash is malformed: {}", e)))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::InternalError(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}

/// Authentication service that handles registration, login and token
/// validation
#[derive(Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl AuthService {
    pub fn new(
        config: AuthConfig,
        db: Arc<DatabaseConnection>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            config,
            db,
            event_sender,
        }
    }

    /// Register a new customer account.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserModel, AuthError> {
        if password.len() < self.config.min_password_length {
            return Err(AuthError::WeakPassword(format!(
                "Password must be at least {} characters long",
                self.config.min_password_length
            )));
        }

        let email = email.trim().to_lowercase();
        let existing = entities::User::find()
            .filter(user::Column::Email.eq(email.clone()))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let now = Utc::now();
        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.clone()),
            password_hash: Set(hash_password(password)?),
            name: Set(name.trim().to_string()),
            role: Set(UserRole::Customer),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = model.insert(self.db.as_ref()).await?;

        info!(user_id = %created.id, "registered new user");

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::UserRegistered {
                    user_id: created.id,
                    email: created.email.clone(),
                    name: created.name.clone(),
                })
                .await;
        }

        Ok(created)
    }

    /// Validate credentials and issue a token.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, AuthError> {
        let email = email.trim().to_lowercase();
        let found = entities::User::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await?;

        let Some(found) = found else {
            // Burn a verification anyway so a missing account is not
            // distinguishable from a wrong password by timing.
            let _ = verify_password(password, DUMMY_HASH);
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password, &found.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        if !found.is_active {
            return Err(AuthError::AccountDisabled);
        }

        debug!(user_id = %found.id, "login succeeded");
        self.generate_token(&found)
    }

    /// Generate a JWT access token for a user
    pub fn generate_token(&self, user: &UserModel) -> Result<TokenResponse, AuthError> {
        let now = Utc::now();
        let expires = now
            + ChronoDuration::from_std(self.config.token_expiration)
                .map_err(|_| AuthError::TokenCreation("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.token_expiration.as_secs() as i64,
        })
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.jwt_issuer]);
        validation.set_audience(&[&self.config.jwt_audience]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        Ok(claims)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<UserModel, AuthError> {
        entities::User::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Build the request-scoped identity from validated claims.
    fn auth_user_from_claims(&self, claims: Claims) -> Result<AuthUser, AuthError> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        let role = UserRole::try_from_value(&claims.role).map_err(|_| AuthError::InvalidToken)?;

        Ok(AuthUser {
            user_id,
            name: claims.name,
            email: claims.email,
            role,
            permissions: rbac::permissions_for_role(role.as_str()),
            token_id: claims.jti,
        })
    }
}

// Any well-formed argon2id hash works; login only needs something to
// verify against when the account does not exist.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$MDAwMDAwMDAwMDAwMDAwMA$Qt+Paw+1uq9TTpSNUn5T5C4P2v0dZYzWLoieolvrVlM";

/// Token issued on successful login
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Login request body
#[derive(Debug, Deserialize, Validate)]
pub struct LoginCredentials {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Registration request body
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be between 8 and 128 characters"))]
    pub password: String,
}

/// Permission middleware to check if a user holds a required permission.
/// Admins pass unconditionally.
pub async fn permission_middleware(
    State(required_permission): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = match request.extensions().get::<AuthUser>() {
        Some(user) => user.clone(),
        None => return Err(AuthError::MissingAuth),
    };

    if user.is_admin() {
        return Ok(next.run(request).await);
    }

    if !user.has_permission(&required_permission) {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Role middleware to check if a user has the required role. Admins pass
/// unconditionally.
pub async fn role_middleware(
    State(required_role): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = match request.extensions().get::<AuthUser>() {
        Some(user) => user.clone(),
        None => return Err(AuthError::MissingAuth),
    };

    if !user.is_admin() && !user.has_role(&required_role) {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Authentication middleware that extracts and validates bearer tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let headers = request.headers().clone();

    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            error!("authentication service missing from request extensions");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication service not available",
            )
                .into_response();
        }
    };

    match extract_auth_from_headers(&headers, &auth_service) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Extract authentication info from request headers
fn extract_auth_from_headers(
    headers: &HeaderMap,
    auth_service: &AuthService,
) -> Result<AuthUser, AuthError> {
    let Some(auth_header) = headers.get(header::AUTHORIZATION) else {
        return Err(AuthError::MissingAuth);
    };
    let auth_value = auth_header.to_str().map_err(|_| AuthError::InvalidToken)?;
    if !auth_value.starts_with("Bearer ") {
        return Err(AuthError::MissingAuth);
    }

    let token = auth_value.trim_start_matches("Bearer ").trim();
    let claims = auth_service.validate_token(token)?;
    auth_service.auth_user_from_claims(claims)
}

#[async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

/// Authentication routes
pub fn auth_routes() -> axum::Router<Arc<AuthService>> {
    axum::Router::new()
        .route("/register", axum::routing::post(register_handler))
        .route("/login", axum::routing::post(login_handler))
        .merge(
            axum::Router::new()
                .route("/me", axum::routing::get(me_handler))
                .with_auth(),
        )
        .layer(DefaultBodyLimit::max(1024 * 64))
}

async fn register_handler(
    State(auth_service): State<Arc<AuthService>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserModel>), AuthError> {
    request
        .validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let user = auth_service
        .register(&request.name, &request.email, &request.password)
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

async fn login_handler(
    State(auth_service): State<Arc<AuthService>>,
    Json(credentials): Json<LoginCredentials>,
) -> Result<Json<TokenResponse>, AuthError> {
    let token = auth_service
        .login(&credentials.email, &credentials.password)
        .await?;
    Ok(Json(token))
}

async fn me_handler(auth_user: AuthUser) -> Json<AuthUser> {
    Json(auth_user)
}

/// Extension methods for Router to add auth middleware
pub mod auth_router_ext {
    use super::{auth_middleware, permission_middleware, role_middleware};

    pub trait AuthRouterExt {
        fn with_auth(self) -> Self;
        fn with_permission(self, permission: &str) -> Self;
        fn with_role(self, role: &str) -> Self;
    }

    impl<S> AuthRouterExt for axum::Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        fn with_auth(self) -> Self {
            self.layer(axum::middleware::from_fn(auth_middleware))
        }

        fn with_permission(self, permission: &str) -> Self {
            self.layer(axum::middleware::from_fn_with_state(
                permission.to_string(),
                permission_middleware,
            ))
            .with_auth()
        }

        fn with_role(self, role: &str) -> Self {
            self.layer(axum::middleware::from_fn_with_state(
                role.to_string(),
                role_middleware,
            ))
            .with_auth()
        }
    }
}

pub use auth_router_ext::AuthRouterExt;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_service() -> AuthService {
        let config = AuthConfig {
            jwt_secret: "test-secret-used-only-in-unit-tests".to_string(),
            jwt_issuer: "storefront-api".to_string(),
            jwt_audience: "storefront-clients".to_string(),
            token_expiration: Duration::from_secs(3600),
            min_password_length: 8,
        };
        // Token paths never touch the database.
        let db = Arc::new(DatabaseConnection::Disconnected);
        AuthService::new(config, db, None)
    }

    fn test_user(role: UserRole) -> UserModel {
        UserModel {
            id: Uuid::new_v4(),
            email: "shopper@example.com".to_string(),
            password_hash: String::new(),
            name: "Shopper".to_string(),
            role,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("correct-horse-battery-staple").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct-horse-battery-staple", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn token_round_trip_preserves_identity() {
        let service = test_service();
        let user = test_user(UserRole::Customer);

        let token = service.generate_token(&user).unwrap();
        assert_eq!(token.token_type, "Bearer");

        let claims = service.validate_token(&token.access_token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, "customer");

        let auth_user = service.auth_user_from_claims(claims).unwrap();
        assert_eq!(auth_user.user_id, user.id);
        assert!(auth_user.has_permission("carts:write"));
        assert!(!auth_user.has_permission("reviews:moderate"));
    }

    #[test]
    fn agent_token_carries_moderation_permission() {
        let service = test_service();
        let token = service.generate_token(&test_user(UserRole::Agent)).unwrap();
        let claims = service.validate_token(&token.access_token).unwrap();
        let auth_user = service.auth_user_from_claims(claims).unwrap();

        assert!(auth_user.is_staff());
        assert!(auth_user.has_permission(perms::REVIEWS_MODERATE));
        assert!(auth_user.has_permission(perms::TICKETS_WORK));
    }

    #[test]
    fn admin_wildcards_cover_everything() {
        let service = test_service();
        let token = service.generate_token(&test_user(UserRole::Admin)).unwrap();
        let claims = service.validate_token(&token.access_token).unwrap();
        let auth_user = service.auth_user_from_claims(claims).unwrap();

        assert!(auth_user.is_admin());
        assert!(auth_user.has_permission(perms::COUPONS_MANAGE));
        assert!(auth_user.has_permission("reviews:moderate"));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let service = test_service();
        let token = service.generate_token(&test_user(UserRole::Customer)).unwrap();

        let mut tampered = token.access_token.clone();
        tampered.push('x');
        assert!(matches!(
            service.validate_token(&tampered),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn token_from_other_issuer_is_rejected() {
        let service = test_service();
        let mut other = test_service();
        other.config.jwt_issuer = "someone-else".to_string();

        let token = other.generate_token(&test_user(UserRole::Customer)).unwrap();
        assert!(service.validate_token(&token.access_token).is_err());
    }
}
