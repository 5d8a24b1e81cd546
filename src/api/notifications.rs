use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{AppError, Result};
use crate::notification::{
    DeliveryStrategy, Notification, NotificationResult, Priority, RoutingMap,
};
use crate::queue::{Job, JobConfig};
use crate::server::AppState;

/// Request to deliver a notification to one recipient
#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    /// Notification type (e.g., "order.shipped")
    pub kind: String,
    /// Channels in declaration order
    pub channels: Vec<String>,
    /// Channel content keyed by channel name
    pub content: HashMap<String, Value>,
    /// Recipient routing data keyed by channel name
    pub recipient: RoutingMap,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Overrides the configured delivery strategy
    #[serde(default)]
    pub strategy: Option<DeliveryStrategy>,
}

/// Request to deliver a notification later
#[derive(Debug, Deserialize)]
pub struct QueueNotificationRequest {
    #[serde(flatten)]
    pub notification: SendNotificationRequest,
    /// Wait this long before sending
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

impl SendNotificationRequest {
    fn to_notification(&self) -> Result<Notification> {
        let content: HashMap<String, &Value> = self
            .content
            .iter()
            .map(|(channel, value)| (channel.to_lowercase(), value))
            .collect();

        let mut builder = Notification::builder(&self.kind).priority(self.priority);
        for channel in &self.channels {
            let value = content.get(&channel.to_lowercase()).ok_or_else(|| {
                AppError::Validation(format!("missing content for channel '{}'", channel))
            })?;
            builder = builder.content(channel, (*value).clone());
        }
        if let Some(reference_id) = &self.reference_id {
            builder = builder.reference_id(reference_id);
        }
        for (key, value) in &self.metadata {
            builder = builder.metadata(key, value.clone());
        }

        Ok(builder.build()?)
    }
}

/// POST /api/v1/notifications - deliver now and return the per-channel outcome
pub async fn send_notification(
    State(state): State<AppState>,
    Json(request): Json<SendNotificationRequest>,
) -> Result<Json<NotificationResult>> {
    let notification = request.to_notification()?;
    let result = state
        .manager
        .send(&notification, &request.recipient, request.strategy)
        .await?;

    Ok(Json(result))
}

/// POST /api/v1/notifications/queue - accept for deferred delivery
pub async fn queue_notification(
    State(state): State<AppState>,
    Json(request): Json<QueueNotificationRequest>,
) -> Result<(StatusCode, Json<Job>)> {
    let notification = request.notification.to_notification()?;
    let job = state.queue.enqueue(
        notification,
        request.notification.recipient,
        JobConfig {
            delay_ms: request.delay_ms,
            strategy: request.notification.strategy,
        },
    )?;

    Ok((StatusCode::ACCEPTED, Json(job)))
}
