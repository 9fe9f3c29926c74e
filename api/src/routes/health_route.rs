//! Liveness and readiness probes.
//!
//! Liveness answers "is the process healthy" from the shared status record
//! alone; readiness additionally checks that the configuration needed to
//! process webhooks is present and that the worker backlog is below its
//! threshold.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::core::app_state::AppState;

/// Maximum in-flight workers before the service reports not-ready.
const MAX_BACKLOG: usize = 50;

pub async fn home() -> &'static str {
    "The code review api server is running.\n"
}

/// `GET /health/liveness`
pub async fn liveness(State(state): State<AppState>) -> Response {
    let snapshot = state.status.snapshot();
    (
        StatusCode::OK,
        Json(json!({
            "status": "alive",
            "uptime_seconds": snapshot.uptime_seconds,
            "active_workers": snapshot.active_workers,
            "timestamp": now(),
        })),
    )
        .into_response()
}

/// `GET /health/readiness`
pub async fn readiness(State(state): State<AppState>) -> Response {
    let snapshot = state.status.snapshot();

    let mut missing: Vec<&str> = Vec::new();
    let has_gitlab = env_present("GITLAB_ACCESS_TOKEN");
    let has_github = env_present("GITHUB_ACCESS_TOKEN");
    if !has_gitlab && !has_github {
        missing.push("GITLAB_ACCESS_TOKEN or GITHUB_ACCESS_TOKEN");
    }

    if !missing.is_empty() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "reason": format!("missing required configuration: {}", missing.join(", ")),
                "timestamp": now(),
            })),
        )
            .into_response();
    }

    if snapshot.active_workers > MAX_BACKLOG {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "reason": format!(
                    "worker backlog {} exceeds threshold {}",
                    snapshot.active_workers, MAX_BACKLOG
                ),
                "timestamp": now(),
            })),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "uptime_seconds": snapshot.uptime_seconds,
            "events_accepted": snapshot.events_accepted,
            "worker_backlog": snapshot.active_workers,
            "dependencies": {
                "gitlab": if has_gitlab { "configured" } else { "unconfigured" },
                "github": if has_github { "configured" } else { "unconfigured" },
            },
            "timestamp": now(),
        })),
    )
        .into_response()
}

fn env_present(name: &str) -> bool {
    std::env::var(name).map(|v| !v.trim().is_empty()).unwrap_or(false)
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
