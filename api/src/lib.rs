//! HTTP front door: webhook ingestion plus health probes.

use std::{env, error::Error, path::PathBuf, sync::Arc};

mod core;
mod routes;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::signal;
use tracing::info;

use llm_service::CompletionClient;
use review_pipeline::{EventDispatcher, ReviewConfig, dispatch::spawn_jsonl_sink};

use crate::core::app_state::{AppState, ServiceStatus};
use crate::routes::{health_route, webhook_route};

pub async fn start() -> Result<(), Box<dyn Error>> {
    let review_cfg = Arc::new(ReviewConfig::from_env());
    let llm = CompletionClient::from_env()?;
    let dispatcher = EventDispatcher::default();

    // Persistence subscriber: append-only JSONL log of review outcomes.
    let outcome_log = env::var("REVIEW_OUTCOME_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/review_outcomes.jsonl"));
    if let Some(parent) = outcome_log.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    spawn_jsonl_sink(&dispatcher, outcome_log);

    let state = AppState {
        review_cfg,
        llm,
        dispatcher,
        status: Arc::new(ServiceStatus::new()),
    };

    let app = Router::new()
        .route("/", get(health_route::home))
        .route("/review/webhook", post(webhook_route::handle_webhook))
        .route("/health/liveness", get(health_route::liveness))
        .route("/health/readiness", get(health_route::readiness))
        .with_state(state);

    let host_url = env::var("API_ADDRESS").unwrap_or_else(|_| {
        let port = env::var("SERVER_PORT").unwrap_or_else(|_| "5001".to_string());
        format!("0.0.0.0:{port}")
    });
    info!(%host_url, "starting webhook server");

    let listener = tokio::net::TcpListener::bind(&host_url).await?;

    // Start server with graceful shutdown on Ctrl+C
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Returns a future that resolves when Ctrl+C is pressed
async fn shutdown_signal() {
    signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
}
