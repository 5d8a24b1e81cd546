use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::channels::list_channels;
use super::deliveries::list_deliveries;
use super::health::health;
use super::metrics::prometheus_metrics;
use super::notifications::{queue_notification, send_notification};

pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health & Metrics
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                .route("/notifications", post(send_notification))
                .route("/notifications/queue", post(queue_notification))
                .route("/channels", get(list_channels))
                .route("/deliveries", get(list_deliveries))
                .route_layer(middleware::from_fn_with_state(state, api_key_auth)),
        )
}
