use serde_json::{Map, Value};

use crate::driver::DeliveryRequest;

use super::{Notification, RoutingMap};

/// Turns a notification and a recipient's routing data into per-channel requests
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    defaults: Map<String, Value>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata merged into every request; notification metadata wins on conflict
    pub fn with_default_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(key.into(), value);
        self
    }

    /// Build the request for one channel.
    ///
    /// Returns `None` when the recipient has no routing data for the channel.
    pub fn build(
        &self,
        notification: &Notification,
        channel: &str,
        routing: &RoutingMap,
    ) -> Option<DeliveryRequest> {
        let recipient = routing.get(channel)?;
        let message = notification.content_for(channel, recipient)?;

        let mut metadata = self.defaults.clone();
        metadata.extend(
            notification
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        Some(DeliveryRequest {
            channel: channel.to_lowercase(),
            recipient: recipient.clone(),
            message,
            notification_id: notification.id,
            reference_id: notification.reference_id.clone(),
            priority: notification.priority,
            metadata,
        })
    }
}
