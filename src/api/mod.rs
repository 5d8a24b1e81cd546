//! API layer - HTTP endpoint handlers organized by domain.

mod channels;
mod deliveries;
mod health;
mod metrics;
mod notifications;
mod routes;

// Re-export all handlers for use in server/app.rs
pub use channels::{list_channels, ChannelsResponse};
pub use deliveries::{list_deliveries, DeliveriesQuery, DeliveriesResponse};
pub use health::{health, HealthResponse};
pub use metrics::prometheus_metrics;
pub use notifications::{
    queue_notification, send_notification, QueueNotificationRequest, SendNotificationRequest,
};
pub use routes::api_routes;
