//! services/api/src/bin/api.rs

use api_lib::{
    adapters::DbAdapter,
    config::Config,
    error::ApiError,
    web::{
        check_in_handler, claimant_patterns_handler, evaluate_handler, require_claimant,
        rest::ApiDoc, security_event_handler, state::AppState,
    },
};
use attendance_guard_core::{
    AttendanceGate, AuditLogger, EngineSettings, GatePolicy, RiskEngine, ValidationPolicy,
};
use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");
    if config.expected_timezone.is_none() {
        warn!("EXPECTED_TIMEZONE is not set, device timezone mismatch checks are disabled");
    }

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Start the Audit Worker & Build the Engine ---
    // Requests run under `shutdown`. The audit worker has its own token so it keeps
    // draining until the server has finished every in-flight request.
    let shutdown = CancellationToken::new();
    let audit_shutdown = CancellationToken::new();
    let (audit, audit_worker) = AuditLogger::spawn(
        db_adapter.clone(),
        config.audit_queue_capacity,
        audit_shutdown.clone(),
    );

    let engine = Arc::new(RiskEngine::new(
        db_adapter.clone(),
        db_adapter.clone(),
        EngineSettings {
            lookup_timeout: config.lookup_timeout,
            expected_timezone: config.expected_timezone.clone(),
            ..EngineSettings::default()
        },
    ));

    let max_clock_skew = chrono::Duration::from_std(config.max_clock_skew)
        .map_err(|e| ApiError::Internal(format!("Invalid clock skew: {}", e)))?;
    let gate = Arc::new(AttendanceGate::new(
        engine.clone(),
        db_adapter.clone(),
        audit.clone(),
        GatePolicy {
            reject_threshold: config.reject_threshold,
            validation: ValidationPolicy {
                require_location: config.require_location,
                max_clock_skew,
            },
        },
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        sessions: db_adapter,
        engine,
        gate,
        audit,
        shutdown: shutdown.clone(),
    });

    let allowed_origin = config.allowed_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!(
            "Invalid ALLOWED_ORIGIN '{}': {}",
            config.allowed_origin, e
        ))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT, HeaderName::from_static("x-user-id")]);

    // --- 5. Create the Web Router ---
    // Claimant routes (x-user-id required)
    let claimant_routes = Router::new()
        .route("/attendance", post(check_in_handler))
        .route("/fraud/evaluate", post(evaluate_handler))
        .route("/security-events", post(security_event_handler))
        .layer(axum_middleware::from_fn(require_claimant));

    // Reviewer routes
    let review_routes =
        Router::new().route("/claimants/{claimant_id}/patterns", get(claimant_patterns_handler));

    let api_router = Router::new()
        .merge(claimant_routes)
        .merge(review_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // --- 7. Drain the Audit Queue ---
    audit_shutdown.cancel();
    audit_worker
        .await
        .map_err(|e| ApiError::Internal(format!("Audit worker panicked: {}", e)))?;
    info!("Server stopped.");

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received."),
        Err(e) => {
            // Without a signal handler the server only stops when killed.
            error!("Failed to listen for the shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
    shutdown.cancel();
}
