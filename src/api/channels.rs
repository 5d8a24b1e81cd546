use axum::{extract::State, Json};
use serde::Serialize;

use crate::registry::ChannelStatus;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct ChannelsResponse {
    pub channels: Vec<ChannelStatus>,
}

/// GET /api/v1/channels - registered channels and their readiness
pub async fn list_channels(State(state): State<AppState>) -> Json<ChannelsResponse> {
    Json(ChannelsResponse {
        channels: state.manager.registry().status(),
    })
}
