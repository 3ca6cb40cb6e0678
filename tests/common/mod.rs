//! Shared integration-test harness.
//!
//! Boots the full API router against a throwaway SQLite file, runs the
//! migrations, and hands out JWTs for each role so tests can exercise the
//! HTTP surface the same way a client would. Redis-backed notification
//! endpoints are not exercised here; the client is constructed but never
//! connected.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::auth::{AuthConfig, AuthService};
use storefront_api::config::AppConfig;
use storefront_api::db;
use storefront_api::entities::coupon::DiscountType;
use storefront_api::entities::product::ProductCategory;
use storefront_api::entities::user::{self, UserRole};
use storefront_api::events::{process_events, EventSender};
use storefront_api::handlers::AppServices;
use storefront_api::logging::{setup_logger, LoggerConfig};
use storefront_api::notifications::RedisNotificationService;
use storefront_api::services::coupons::CreateCouponInput;
use storefront_api::services::products::CreateProductInput;
use storefront_api::AppState;

/// 64-character secret satisfying the config validator. Test-only.
const TEST_JWT_SECRET: &str = "kV2xGqPz9wNfRtYcLmHbJdAeUoQi5nS3WvXkZrTy7CgEp1MhDuBsOjIl4aF6e0K8";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub auth_service: Arc<AuthService>,
    _event_task: JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    /// Builds a fresh application instance on its own database file so tests
    /// can run in parallel without sharing state.
    pub async fn spawn() -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for sqlite");
        let db_path = db_dir.path().join("storefront_test.db");
        let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

        let mut cfg = AppConfig::new(
            database_url,
            "redis://127.0.0.1:6379".to_string(),
            TEST_JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        // SQLite files do not appreciate connection pools, but coupon
        // validation reads through the pool while the cart transaction
        // holds one connection, so two are required.
        cfg.db_max_connections = 2;
        cfg.db_min_connections = 1;
        let cfg = Arc::new(cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("connect to sqlite test database");
        db::run_migrations(&pool).await.expect("run migrations");
        let db_arc = Arc::new(pool);

        // Events are drained by a handler-less loop; tests assert on state,
        // not on side effects like email.
        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(process_events(event_rx, Vec::new()));

        let base_logger = setup_logger(LoggerConfig {
            use_color: false,
            ..LoggerConfig::default()
        });
        let redis_client =
            Arc::new(redis::Client::open(cfg.redis_url.clone()).expect("parse redis url"));
        let feed = RedisNotificationService::with_client(redis_client.clone(), base_logger);

        let auth_service = Arc::new(AuthService::new(
            AuthConfig::from_app_config(&cfg),
            db_arc.clone(),
            Some(event_sender.clone()),
        ));

        let services = AppServices::new(db_arc.clone(), event_sender, cfg.clone(), feed);
        let state = AppState {
            db: db_arc,
            config: cfg,
            services,
            redis: redis_client,
        };

        let router = Router::new()
            .nest("/api/v1", storefront_api::api_v1_routes())
            .nest(
                "/auth",
                storefront_api::auth::auth_routes().with_state(auth_service.clone()),
            )
            .layer(axum::middleware::from_fn_with_state(
                auth_service.clone(),
                |axum::extract::State(auth): axum::extract::State<Arc<AuthService>>,
                 mut req: Request<Body>,
                 next: axum::middleware::Next| async move {
                    req.extensions_mut().insert(auth);
                    next.run(req).await
                },
            ))
            .with_state(state.clone());

        Self {
            router,
            state,
            auth_service,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    /// Inserts an account directly and mints a token for it. The password
    /// hash is left empty; login-path tests register over HTTP instead.
    pub async fn create_user(&self, role: UserRole) -> (user::Model, String) {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let model = user::ActiveModel {
            id: Set(id),
            email: Set(format!("user-{}@example.com", id.simple())),
            password_hash: Set(String::new()),
            name: Set(format!("Test {}", role.as_str())),
            role: Set(role),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let user = model
            .insert(self.state.db.as_ref())
            .await
            .expect("insert test user");
        let token = self
            .auth_service
            .generate_token(&user)
            .expect("mint test token")
            .access_token;
        (user, token)
    }

    pub async fn customer(&self) -> (user::Model, String) {
        self.create_user(UserRole::Customer).await
    }

    pub async fn agent(&self) -> (user::Model, String) {
        self.create_user(UserRole::Agent).await
    }

    pub async fn admin(&self) -> (user::Model, String) {
        self.create_user(UserRole::Admin).await
    }

    /// Seeds an active product through the service layer.
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> storefront_api::entities::product::Model {
        let sku = format!("SKU-{}", Uuid::new_v4().simple());
        self.state
            .services
            .products
            .create_product(CreateProductInput {
                name: name.to_string(),
                slug: None,
                description: Some(format!("{name} description")),
                sku,
                category: ProductCategory::Electronics,
                price,
                currency: None,
                stock_quantity: stock,
            })
            .await
            .expect("seed product")
    }

    /// Seeds a coupon valid from an hour ago with no expiry.
    pub async fn seed_coupon(
        &self,
        code: &str,
        discount_type: DiscountType,
        value: Decimal,
        min_purchase: Decimal,
    ) -> storefront_api::entities::coupon::Model {
        self.state
            .services
            .coupons
            .create_coupon(CreateCouponInput {
                code: code.to_string(),
                description: None,
                discount_type,
                value,
                min_purchase_amount: min_purchase,
                max_discount_amount: None,
                usage_limit: None,
                per_user_limit: None,
                valid_from: Utc::now() - chrono::Duration::hours(1),
                valid_until: None,
            })
            .await
            .expect("seed coupon")
    }

    /// Fires an unauthenticated request at the router.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                builder
                    .body(Body::from(json.to_string()))
                    .expect("build request")
            }
            None => builder.body(Body::empty()).expect("build request"),
        };
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router must answer")
    }

    /// Fires a request with a Bearer token.
    pub async fn request_authenticated(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        body: Option<serde_json::Value>,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        let request = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                builder
                    .body(Body::from(json.to_string()))
                    .expect("build request")
            }
            None => builder.body(Body::empty()).expect("build request"),
        };
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router must answer")
    }
}

/// Reads a response body as JSON, panicking with the raw payload on parse
/// failure so assertion output stays debuggable.
pub async fn read_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        panic!(
            "response was not valid JSON ({e}): {}",
            String::from_utf8_lossy(&bytes)
        )
    })
}

/// Asserts status and decodes the body in one step.
pub async fn assert_json(response: Response, expected: StatusCode) -> serde_json::Value {
    let status = response.status();
    let body = read_json(response).await;
    assert_eq!(status, expected, "unexpected status, body: {body}");
    body
}

/// Reads a monetary field as f64. Decimals serialize as strings, but SQLite
/// round-trips can change the scale, so tests compare numerically.
pub fn decimal_field(body: &serde_json::Value, field: &str) -> f64 {
    let value = &body[field];
    match value {
        serde_json::Value::String(s) => s.parse().unwrap_or_else(|_| {
            panic!("field {field} was not a numeric string: {value}")
        }),
        serde_json::Value::Number(n) => n.as_f64().unwrap(),
        other => panic!("field {field} was not a decimal: {other}"),
    }
}
