use std::sync::Arc;

use async_trait::async_trait;

use crate::driver::SendStatus;
use crate::history::{DeliveryLogStore, DeliveryRecord};
use crate::metrics::ListenerMetrics;

use super::{DeliveryEvent, EventListener, ListenerError};

/// Writes every event to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

#[async_trait]
impl EventListener for TracingListener {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn handle(&self, event: &DeliveryEvent) -> Result<(), ListenerError> {
        let notification = event.notification();
        match event {
            DeliveryEvent::Sending { channels, .. } => {
                tracing::debug!(
                    notification_id = %notification.id,
                    kind = %notification.kind,
                    channels = ?channels,
                    "Sending notification"
                );
            }
            DeliveryEvent::Sent { results, .. } => {
                tracing::info!(
                    notification_id = %notification.id,
                    kind = %notification.kind,
                    delivered = ?results.keys().collect::<Vec<_>>(),
                    "Notification sent"
                );
            }
            DeliveryEvent::Failed {
                error,
                failed_channel: Some(channel),
                ..
            } => {
                tracing::warn!(
                    notification_id = %notification.id,
                    channel = %channel,
                    error = %error,
                    "Channel delivery failed"
                );
            }
            DeliveryEvent::Failed { error, .. } => {
                tracing::error!(
                    notification_id = %notification.id,
                    kind = %notification.kind,
                    error = %error,
                    "Notification failed on every channel"
                );
            }
        }
        Ok(())
    }
}

/// Counts events by kind
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsListener;

#[async_trait]
impl EventListener for MetricsListener {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn handle(&self, event: &DeliveryEvent) -> Result<(), ListenerError> {
        ListenerMetrics::record_dispatched(event.kind().as_str());
        Ok(())
    }
}

/// Appends per-channel outcomes to a delivery log
pub struct HistoryListener {
    store: Arc<dyn DeliveryLogStore>,
}

impl HistoryListener {
    pub fn new(store: Arc<dyn DeliveryLogStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventListener for HistoryListener {
    fn name(&self) -> &str {
        "history"
    }

    async fn handle(&self, event: &DeliveryEvent) -> Result<(), ListenerError> {
        let notification = event.notification();
        match event {
            DeliveryEvent::Sent { results, .. } => {
                for (channel, result) in results {
                    self.store
                        .append(DeliveryRecord::new(
                            notification.id,
                            &notification.kind,
                            channel,
                            result.status,
                            None,
                        ))
                        .await?;
                }
            }
            DeliveryEvent::Failed {
                error,
                failed_channel: Some(channel),
                ..
            } => {
                self.store
                    .append(DeliveryRecord::new(
                        notification.id,
                        &notification.kind,
                        channel,
                        SendStatus::Failed,
                        Some(error.to_string()),
                    ))
                    .await?;
            }
            // Terminal failures repeat what the per-channel events already recorded
            DeliveryEvent::Failed { .. } | DeliveryEvent::Sending { .. } => {}
        }
        Ok(())
    }
}
