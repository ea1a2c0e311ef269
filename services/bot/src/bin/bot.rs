//! services/bot/src/bin/bot.rs

use axum::http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method};
use axum::Router;
use bot_lib::{
    adapters::{
        DbAdapter, DocumentExtractor, HttpObjectStorage, LocalObjectStorage, MaintenancePoller,
        OriginalityScorer, StripePayments,
    },
    config::{Config, ConfigError, StorageConfig},
    error::ApiError,
    web::{self, middleware::{USERNAME_HEADER, USER_ID_HEADER}, rest::ApiDoc, AppState},
};
use originality_core::{
    NoRefund, ObjectStorage, RefundOnFailure, RefundPolicy, ScoringService, Workflow,
    WorkflowDeps, WorkflowSettings,
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

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let storage: Arc<dyn ObjectStorage> = match &config.storage {
        StorageConfig::Http { base_url, api_key } => Arc::new(HttpObjectStorage::new(
            base_url.clone(),
            api_key.clone(),
            config.http_timeout,
        )?),
        StorageConfig::Local { root } => {
            info!(root = %root.display(), "Using local file storage");
            Arc::new(LocalObjectStorage::new(root.clone()))
        }
    };

    let scoring: Option<Arc<dyn ScoringService>> = match &config.originality_api_key {
        Some(api_key) => Some(Arc::new(OriginalityScorer::new(
            config.originality_api_url.clone(),
            api_key.clone(),
            config.originality_model_version.clone(),
            config.scoring_timeout,
        )?)),
        None => {
            warn!("ORIGINALITY_API_KEY is not set; AI analysis is disabled");
            None
        }
    };

    let payments = Arc::new(StripePayments::new(
        config.stripe_api_url.clone(),
        config.stripe_secret_key.clone(),
        config.http_timeout,
    )?);

    let refund_policy: Arc<dyn RefundPolicy> = if config.refund_on_scoring_failure {
        Arc::new(RefundOnFailure)
    } else {
        Arc::new(NoRefund)
    };

    // --- 4. Build the Workflow & Shared AppState ---
    let busy_lease = chrono::Duration::from_std(config.busy_lease)
        .map_err(|e| ApiError::Internal(format!("BUSY_LEASE_SECS out of range: {}", e)))?;
    let workflow = Arc::new(Workflow::new(
        WorkflowDeps {
            db: db_adapter.clone(),
            ledger: db_adapter.clone(),
            sessions: db_adapter.clone(),
            storage,
            extractor: Arc::new(DocumentExtractor::new()),
            scoring,
            payments,
            refund_policy,
        },
        WorkflowSettings {
            storage_bucket: config.storage_bucket.clone(),
            busy_lease,
            currency: config.payment_currency.clone(),
            bot_username: config.bot_username.clone(),
        },
    ));
    let app_state = Arc::new(AppState::new(workflow, db_adapter.clone()));

    // --- 5. Start Background Work ---
    let shutdown = CancellationToken::new();
    let poller_handle = match &config.maintenance_status_url {
        Some(url) => {
            let poller = MaintenancePoller::new(
                url.clone(),
                config.maintenance_interval,
                config.maintenance_timeout,
                db_adapter.clone(),
            )?;
            Some(tokio::spawn(poller.run(shutdown.clone())))
        }
        None => {
            info!("MAINTENANCE_STATUS_URL is not set; maintenance polling disabled");
            None
        }
    };

    // --- 6. Create the Web Router ---
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(USERNAME_HEADER),
        ]);
    if let Some(origin) = &config.cors_origin {
        let origin = origin.parse::<HeaderValue>().map_err(|e| {
            ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string())
        })?;
        cors = cors.allow_origin(origin);
    }

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(web::router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(handle) = poller_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Maintenance poller task failed");
        }
    }
    info!("Server stopped.");
    Ok(())
}

/// Resolves on ctrl-c and stops background tasks.
async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for the shutdown signal");
    }
    info!("Shutdown signal received.");
    token.cancel();
}
