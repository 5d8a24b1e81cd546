//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub channels: ChannelHealthResponse,
    pub queue: QueueHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct ChannelHealthResponse {
    pub registered: usize,
    pub ready: usize,
    /// Channels whose driver cannot currently send
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct QueueHealthResponse {
    pub enabled: bool,
    pub capacity: usize,
    pub max_concurrency: usize,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let channels = state.manager.registry().status();
    let registered = channels.len();
    let unavailable: Vec<String> = channels
        .into_iter()
        .filter(|c| !c.ready)
        .map(|c| c.channel)
        .collect();

    let status = if unavailable.is_empty() {
        "healthy"
    } else {
        "degraded"
    };
    let queue = state.queue.config();

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        channels: ChannelHealthResponse {
            registered,
            ready: registered - unavailable.len(),
            unavailable,
        },
        queue: QueueHealthResponse {
            enabled: state.queue.is_enabled(),
            capacity: queue.capacity,
            max_concurrency: queue.max_concurrency,
        },
    })
}
