use std::{net::SocketAddr, sync::Arc};

use axum::{routing::get, Router};
use http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing::{error, info};

use storefront_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }

    // Init Redis client (construction only; connection checked in health)
    let redis_client = Arc::new(redis::Client::open(cfg.redis_url.clone())?);

    let db_arc = Arc::new(db_pool);
    let cfg = Arc::new(cfg);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = Arc::new(api::events::EventSender::new(event_tx));

    // slog logger for the notification feed
    let base_logger = api::logging::setup_logger(api::logging::LoggerConfig::default());

    // Outbound email; disabled unless SMTP is configured
    let mailer = api::notifications::Mailer::from_config(&cfg.smtp)?;
    if mailer.is_some() {
        info!("SMTP delivery enabled from {}", cfg.smtp.from_address);
    } else {
        info!("SMTP not configured; transactional email disabled");
    }

    // Redis-backed per-user notification feed
    let feed = api::notifications::RedisNotificationService::with_client(
        redis_client.clone(),
        base_logger.clone(),
    );

    // Spawn the event processor: fans domain events out to email and the feed
    let notification_handler: Arc<dyn api::events::EventHandler> =
        Arc::new(api::notifications::NotificationEventHandler::new(
            db_arc.clone(),
            mailer,
            Some(feed.clone()),
            base_logger.clone(),
        ));
    tokio::spawn(api::events::process_events(
        event_rx,
        vec![notification_handler],
    ));

    // Auth service for login/registration and the auth middleware
    let auth_service = Arc::new(api::auth::AuthService::new(
        api::auth::AuthConfig::from_app_config(&cfg),
        db_arc.clone(),
        Some(event_sender.clone()),
    ));

    // Register Prometheus collectors before the first scrape
    api::metrics::register_metrics();

    // Aggregate app services used by HTTP handlers
    let services = api::handlers::AppServices::new(
        db_arc.clone(),
        event_sender.clone(),
        cfg.clone(),
        feed,
    );

    // Compose shared app state
    let app_state = api::AppState {
        db: db_arc.clone(),
        config: cfg.clone(),
        services,
        redis: redis_client.clone(),
    };

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(cfg.cors_allow_credentials)
    } else if cfg.should_allow_permissive_cors() {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        error!("Missing CORS configuration detected; set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true");
        return Err("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true".into());
    };

    // Build router: status/health + full v1 API + Swagger UI
    let app = Router::<api::AppState>::new()
        .route("/", get(|| async { "storefront-api up" }))
        .route("/metrics", get(api::metrics::metrics_handler))
        .nest("/api/v1", api::api_v1_routes())
        .nest(
            "/auth",
            api::auth::auth_routes().with_state(auth_service.clone()),
        )
        .merge(api::openapi::swagger_ui())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(api::tracing::configure_http_tracing())
        // Per-route request counts and latency histograms
        .layer(axum::middleware::from_fn(api::metrics::track_metrics))
        // Apply compression
        .layer(CompressionLayer::new())
        // Apply CORS
        .layer(cors_layer)
        // Inject AuthService into request extensions for the auth middleware
        .layer(axum::middleware::from_fn_with_state(
            auth_service.clone(),
            |axum::extract::State(auth): axum::extract::State<Arc<api::auth::AuthService>>,
             mut req: axum::http::Request<axum::body::Body>,
             next: axum::middleware::Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            api::middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(app_state);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("storefront-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
