//! Driver contract shared by every delivery transport.
//!
//! A driver wraps one third-party provider (an SMTP relay, an SMS gateway, a push
//! service, ...). The engine only ever talks to drivers through [`Driver`], so a
//! [`CompositeDriver`](crate::composite::CompositeDriver) wrapping several providers is
//! itself just another driver.
//!
//! # Outcomes
//!
//! A driver reports a failed delivery either by returning `Err(SendError)` or by
//! returning a [`SendResult`] whose status is [`SendStatus::Failed`]. Both forms are
//! treated identically by the retry executor, the composite driver, and the
//! orchestrator.

mod entry;
mod log;
mod mapper;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ConfigurationError;
use crate::notification::Priority;

pub use entry::{DriverEntry, DriverEntryBuilder, DriverSource, MapperFactory, MapperSource};
pub use log::{LogDriver, LogDriverFactory};
pub use mapper::{FnMapper, MappingError, MessageMapper};

/// Status reported by a driver for a single delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    /// The provider accepted and delivered the message
    Success,
    /// The provider rejected the message or could not be reached
    Failed,
    /// The provider accepted the message for asynchronous delivery
    Queued,
}

/// Result of a single driver invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResult {
    /// Provider-side (or locally generated) message identifier
    pub id: String,
    pub status: SendStatus,
    /// Raw provider response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SendError>,
}

impl SendResult {
    /// Successful delivery with a freshly generated id
    pub fn success(response: Option<Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: SendStatus::Success,
            response,
            error: None,
        }
    }

    /// Message accepted by the provider for later delivery
    pub fn queued(response: Option<Value>) -> Self {
        Self {
            status: SendStatus::Queued,
            ..Self::success(response)
        }
    }

    /// Failed delivery carrying the provider error
    pub fn failed(error: SendError) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: SendStatus::Failed,
            response: None,
            error: Some(error),
        }
    }

    /// Override the generated id with the provider's message id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_failure(&self) -> bool {
        self.status == SendStatus::Failed
    }

    /// Error describing why this result failed.
    ///
    /// Drivers are allowed to report `Failed` without an error payload; those are
    /// described with a generic provider error.
    pub fn failure(&self) -> Option<SendError> {
        if !self.is_failure() {
            return None;
        }
        Some(
            self.error
                .clone()
                .unwrap_or_else(|| SendError::provider("driver reported a failed delivery")),
        )
    }
}

/// A single failed sub-driver attempt recorded by the composite driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverFailure {
    /// Name of the driver entry that failed
    pub driver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl DriverFailure {
    pub fn new(driver: impl Into<String>, error: &SendError) -> Self {
        Self {
            driver: driver.into(),
            code: error.code().map(str::to_string),
            message: error.to_string(),
        }
    }
}

/// Errors produced by a delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SendError {
    /// The provider rejected the message or the transport failed
    #[error("{message}")]
    Provider {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        message: String,
    },

    /// A single attempt exceeded the configured per-attempt deadline
    #[error("send attempt timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The driver's message mapper rejected the message
    #[error("message mapping failed for driver '{driver}': {message}")]
    Mapping { driver: String, message: String },

    /// Every applicable sub-driver of a composite driver failed
    #[error("all drivers failed: {}", summarize(.failures))]
    Exhausted { failures: Vec<DriverFailure> },
}

impl SendError {
    /// Provider failure without an error code
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            code: None,
            message: message.into(),
        }
    }

    /// Provider failure tagged with a provider or transport error code
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Provider { code, .. } => code.as_deref(),
            Self::Timeout { .. } => Some("TIMEOUT"),
            Self::Mapping { .. } | Self::Exhausted { .. } => None,
        }
    }

    /// Ordered per-driver failures when this error is an aggregate
    pub fn failures(&self) -> &[DriverFailure] {
        match self {
            Self::Exhausted { failures } => failures,
            _ => &[],
        }
    }
}

fn summarize(failures: &[DriverFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.driver, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A channel-specific request handed to a driver
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRequest {
    /// Channel this request was built for (lowercase)
    pub channel: String,
    /// Opaque routing data for the recipient on this channel
    pub recipient: Value,
    /// Channel content produced by the notification
    pub message: Value,
    pub notification_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl DeliveryRequest {
    pub fn new(channel: impl Into<String>, recipient: Value, message: Value) -> Self {
        Self {
            channel: channel.into(),
            recipient,
            message,
            notification_id: Uuid::new_v4(),
            reference_id: None,
            priority: Priority::default(),
            metadata: Map::new(),
        }
    }

    /// Copy of this request carrying a different message body
    pub fn with_message(&self, message: Value) -> Self {
        Self {
            message,
            ..self.clone()
        }
    }
}

/// The capability every transport plugin implements.
///
/// Implementations must tolerate being invoked several times for the same request,
/// since the retry executor re-sends after retryable failures.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Driver name used in logs, metrics, and aggregated failures
    fn name(&self) -> &str;

    /// Kind of transport (e.g. "email", "sms", "log")
    fn channel_type(&self) -> &str {
        "generic"
    }

    /// Whether the driver has everything it needs (credentials, endpoints) to send
    fn is_ready(&self) -> bool {
        true
    }

    /// Deliver a single request
    async fn send(&self, request: &DeliveryRequest) -> Result<SendResult, SendError>;
}

/// Creates drivers from opaque per-driver configuration
pub trait DriverFactory: Send + Sync {
    fn create(&self, config: &Value) -> Result<Arc<dyn Driver>, ConfigurationError>;
}

impl<F> DriverFactory for F
where
    F: Fn(&Value) -> Result<Arc<dyn Driver>, ConfigurationError> + Send + Sync,
{
    fn create(&self, config: &Value) -> Result<Arc<dyn Driver>, ConfigurationError> {
        self(config)
    }
}
