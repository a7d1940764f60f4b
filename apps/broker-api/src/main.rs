//! Broker API server: inbound network callbacks plus the notification
//! delivery pipeline (dispatcher, retry scheduler, read endpoints).

mod config;
mod logging;
mod openapi;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;

use pesabridge_notify::dispatch::delivery_channel;
use pesabridge_notify::{
    notify_router, CallbackAdapter, DeliveryConfig, DeliveryDispatcher, DeliveryEngine,
    FixedCooldown, NotifyState, RetryScheduler, SchedulerConfig,
};

use crate::config::Config;

#[tokio::main]
async fn main() {
    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    });

    logging::init_logging(&config.rust_log);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host,
        port = config.port,
        environment = %config.app_env,
        "Starting broker-api"
    );

    match config.validate_security_config() {
        Ok(warnings) => {
            for warning in warnings {
                tracing::warn!("Security: {warning}");
            }
        }
        Err(errors) => {
            for error in &errors {
                tracing::error!("Security: {error}");
            }
            tracing::error!("Refusing to start in production with insecure configuration");
            std::process::exit(1);
        }
    }

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to connect to database: {e}");
            std::process::exit(1);
        });

    if let Err(e) = pesabridge_db::MIGRATOR.run(&pool).await {
        tracing::error!("Failed to run migrations: {e}");
        std::process::exit(1);
    }
    tracing::info!("Database migrations applied");

    let engine = DeliveryEngine::new(
        pool.clone(),
        config.notify_encryption_key.to_vec(),
        DeliveryConfig {
            max_attempts: config.max_attempts,
            request_timeout: config.request_timeout,
            allow_insecure_urls: config.allow_insecure_urls,
        },
    )
    .unwrap_or_else(|e| {
        tracing::error!("Failed to build delivery engine: {e}");
        std::process::exit(1);
    });
    let engine = Arc::new(engine);

    let (queue, rx) = delivery_channel(config.queue_capacity);

    let dispatcher = DeliveryDispatcher::new(rx, pool.clone(), engine.clone(), config.max_concurrent);
    tokio::spawn(dispatcher.run());

    let scheduler = Arc::new(RetryScheduler::new(
        pool.clone(),
        engine.clone(),
        queue.clone(),
        Box::new(FixedCooldown::new(config.retry_cooldown)),
        SchedulerConfig {
            sweep_interval: config.sweep_interval,
            operation_ttl: config.operation_ttl,
            ..SchedulerConfig::default()
        },
    ));
    tokio::spawn(scheduler.clone().run());

    let adapter = Arc::new(CallbackAdapter::new(pool.clone(), queue));

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/api-docs/openapi.json", get(openapi_handler))
        .merge(notify_router(NotifyState::new(pool, adapter)))
        .layer(TraceLayer::new_for_http());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        tracing::error!("Failed to bind {addr}: {e}");
        std::process::exit(1);
    });
    tracing::info!("Listening on {addr}");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }

    scheduler.shutdown();
    tracing::info!("Shutdown complete");
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;
    Json(openapi::ApiDoc::openapi())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
