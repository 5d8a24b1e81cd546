use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::driver::{SendError, SendResult};
use crate::error::ConfigurationError;

/// Priority levels for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority, can be delayed
    Low,
    /// Normal priority (default)
    #[default]
    Normal,
    /// High priority, should be delivered promptly
    High,
    /// Critical priority, immediate delivery required
    Critical,
}

/// Produces channel-specific content from the recipient's routing data for that channel
pub type ContentBuilder = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// A logical notification: the channels it targets and one content builder per channel.
///
/// Every declared channel has a builder; this is checked when the notification is built.
#[derive(Clone)]
pub struct Notification {
    /// Unique identifier for this notification
    pub id: Uuid,
    /// Type of notification (e.g., "order.shipped")
    pub kind: String,
    /// Caller reference propagated to every request
    pub reference_id: Option<String>,
    pub priority: Priority,
    /// Arbitrary metadata shared by every channel request
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    channels: Vec<String>,
    builders: HashMap<String, ContentBuilder>,
}

impl Notification {
    /// Create a builder for this notification type
    pub fn builder(kind: impl Into<String>) -> NotificationBuilder {
        NotificationBuilder::new(kind)
    }

    /// Declared channels, in declaration order
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Build the content for `channel` from the recipient's routing data
    pub fn content_for(&self, channel: &str, routing: &Value) -> Option<Value> {
        self.builders
            .get(&channel.to_lowercase())
            .map(|builder| builder(routing))
    }

    pub fn summary(&self) -> NotificationSummary {
        NotificationSummary {
            id: self.id,
            kind: self.kind.clone(),
            reference_id: self.reference_id.clone(),
            priority: self.priority,
        }
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("channels", &self.channels)
            .field("reference_id", &self.reference_id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Identifying fields of a notification carried by delivery events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSummary {
    pub id: Uuid,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub priority: Priority,
}

/// Builder for creating notifications
pub struct NotificationBuilder {
    kind: String,
    channels: Vec<(String, ContentBuilder)>,
    reference_id: Option<String>,
    priority: Priority,
    metadata: Map<String, Value>,
}

impl NotificationBuilder {
    /// Create a new notification builder
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            channels: Vec::new(),
            reference_id: None,
            priority: Priority::default(),
            metadata: Map::new(),
        }
    }

    /// Declare a channel together with its content builder
    pub fn channel<F>(mut self, channel: impl Into<String>, builder: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.channels.push((channel.into(), Arc::new(builder)));
        self
    }

    /// Declare a channel with fixed content
    pub fn content(self, channel: impl Into<String>, content: Value) -> Self {
        self.channel(channel, move |_: &Value| content.clone())
    }

    /// Set the caller reference id
    pub fn reference_id(mut self, id: impl Into<String>) -> Self {
        self.reference_id = Some(id.into());
        self
    }

    /// Set the priority
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Add one metadata entry
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Build the notification, validating its channel declarations
    pub fn build(self) -> Result<Notification, ConfigurationError> {
        if self.channels.is_empty() {
            return Err(ConfigurationError::InvalidNotification(format!(
                "notification '{}' declares no channels",
                self.kind
            )));
        }

        let mut channels = Vec::with_capacity(self.channels.len());
        let mut builders = HashMap::with_capacity(self.channels.len());
        for (channel, builder) in self.channels {
            let channel = channel.trim().to_lowercase();
            if channel.is_empty() {
                return Err(ConfigurationError::InvalidNotification(
                    "channel name must not be empty".to_string(),
                ));
            }
            if builders.insert(channel.clone(), builder).is_some() {
                return Err(ConfigurationError::InvalidNotification(format!(
                    "channel '{}' declared more than once",
                    channel
                )));
            }
            channels.push(channel);
        }

        Ok(Notification {
            id: Uuid::new_v4(),
            kind: self.kind,
            reference_id: self.reference_id,
            priority: self.priority,
            metadata: self.metadata,
            created_at: Utc::now(),
            channels,
            builders,
        })
    }
}

/// Recipient routing data keyed by channel; values are only interpreted by drivers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, Value>")]
pub struct RoutingMap(HashMap<String, Value>);

impl RoutingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add routing data for a channel
    pub fn with(mut self, channel: impl AsRef<str>, routing: Value) -> Self {
        self.insert(channel, routing);
        self
    }

    pub fn insert(&mut self, channel: impl AsRef<str>, routing: Value) {
        self.0.insert(channel.as_ref().to_lowercase(), routing);
    }

    pub fn get(&self, channel: &str) -> Option<&Value> {
        self.0.get(&channel.to_lowercase())
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.get(channel).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, Value>> for RoutingMap {
    fn from(map: HashMap<String, Value>) -> Self {
        map.into_iter()
            .fold(Self::new(), |routing, (channel, value)| routing.with(channel, value))
    }
}

/// A recipient that can describe how to reach it on each channel
pub trait Notifiable {
    fn routing(&self) -> RoutingMap;
}

impl Notifiable for RoutingMap {
    fn routing(&self) -> RoutingMap {
        self.clone()
    }
}

/// Channel-level continuation policy for one send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryStrategy {
    /// Sequential in declared order; abort on the first channel failure
    AllOrNothing,
    /// Channels run independently; failures are recorded, never raised
    #[default]
    BestEffort,
}

/// Overall outcome of one send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Partial,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Success => "success",
            DeliveryStatus::Partial => "partial",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// Result of one send, created fresh per call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub notification_id: Uuid,
    pub status: DeliveryStatus,
    /// Successful channels
    pub results: BTreeMap<String, SendResult>,
    /// Failed channels
    pub errors: BTreeMap<String, SendError>,
}

impl NotificationResult {
    /// Build a result, deriving the status from the two maps.
    ///
    /// `success` iff no errors, `failed` iff no results, otherwise `partial`.
    pub fn new(
        notification_id: Uuid,
        results: BTreeMap<String, SendResult>,
        errors: BTreeMap<String, SendError>,
    ) -> Self {
        let status = if errors.is_empty() {
            DeliveryStatus::Success
        } else if results.is_empty() {
            DeliveryStatus::Failed
        } else {
            DeliveryStatus::Partial
        };

        Self {
            notification_id,
            status,
            results,
            errors,
        }
    }
}
