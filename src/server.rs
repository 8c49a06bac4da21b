//! Web hook listener
//!
//! Receives GitHub deliveries on the configured path and answers `/health`.
//! Deliveries are processed inline, so graceful shutdown waits for them.

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::lock::GlobalLock;
use crate::processor::{EventProcessor, Outcome};
use crate::webhook::{EventError, WebhookEvent, EVENT_HEADER};

pub struct AppState {
    pub processor: Arc<EventProcessor>,
    pub lock: GlobalLock,
    pub started_at: std::time::Instant,
}

pub fn create_router(state: Arc<AppState>, webhook_path: &str, log_requests: bool) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .route(webhook_path, post(webhook_handler))
        .with_state(state);

    if log_requests {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    /// A webhook or a sweep currently holds the global lock
    pub busy: bool,
    pub uptime_secs: u64,
    pub version: String,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        busy: state.lock.is_held(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let event_type = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let event = match WebhookEvent::parse(event_type, &body) {
        Ok(event) => event,
        Err(EventError::Unsupported(kind)) => {
            info!("Ignoring unsupported event type '{}'", kind);
            return (
                StatusCode::OK,
                Json(serde_json::json!({ "status": "ignored", "event": kind })),
            );
        }
        Err(e) => {
            warn!("Rejecting delivery: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            );
        }
    };

    let kind = event.kind();
    let outcome = state.processor.process(event).await;
    info!(event = kind, outcome = outcome_status(&outcome), "Processed delivery");

    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": outcome_status(&outcome), "event": kind })),
    )
}

fn outcome_status(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Dropped(_) => "dropped",
        Outcome::Ignored => "ignored",
        Outcome::Released { .. } => "released",
        Outcome::Transferred(_) => "transferred",
        Outcome::Rejected(_) => "rejected",
        Outcome::Failed(_) => "failed",
    }
}

/// Binds the listener. A failure here is fatal for the process.
pub async fn bind(addr: &str) -> anyhow::Result<tokio::net::TcpListener> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Web hook listener bound to {}", addr);
    Ok(listener)
}

/// Serves until `shutdown` resolves, then drains in-flight requests.
pub async fn run_server(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
