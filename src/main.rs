//! Demo server wiring the defense pipeline in front of a small API.
//!
//! Configuration comes from an optional TOML file (`PALISADE_CONFIG`) and
//! the `PALISADE_ENV` environment mode, which selects the active preset.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use palisade::audit::AuditLogger;
use palisade::config::{load_config, AppConfig, Environment};
use palisade::middleware::{defense_middleware, DefenseState};
use palisade::pipeline::{Orchestrator, RegistryOptions};
use palisade::rate_limit::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "palisade=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("palisade v0.1.0 starting");

    let config = match std::env::var("PALISADE_CONFIG") {
        Ok(path) => load_config(Path::new(&path))?,
        Err(_) => AppConfig::default(),
    };
    let environment = match config.environment {
        Some(environment) => environment,
        None => Environment::from_env()?,
    };

    tracing::info!(
        bind_address = %config.listener.bind_address,
        environment = environment.as_str(),
        rate_limit_disabled = config.rate_limit_disabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            palisade::observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let store = Arc::new(MemoryStore::new());
    let orchestrator = Arc::new(Orchestrator::new(
        store,
        RegistryOptions {
            allowed_origins: config.allowed_origins.clone(),
            rate_limit_disabled: config.rate_limit_disabled,
        },
        environment,
    )?);
    let audit = Arc::new(AuditLogger::new(1024));
    let state = Arc::new(DefenseState::new(orchestrator.clone(), audit));

    // Periodic TTL sweep of the counter store.
    {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                orchestrator.sweep_store();
            }
        });
    }

    let app = Router::new()
        .route("/", get(health))
        .route("/api/echo", post(echo))
        .route("/auth/login", post(echo))
        .layer(axum::middleware::from_fn_with_state(
            state,
            defense_middleware,
        ))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Echoes the (sanitized) body back, useful for exercising the pipeline.
async fn echo(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(body)
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
