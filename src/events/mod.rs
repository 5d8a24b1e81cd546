//! Delivery lifecycle events and the dispatcher that fans them out to listeners.
//!
//! The dispatcher is owned by the manager that emits events; there is no global
//! instance. Listener errors and panics are logged and counted, never returned to
//! the sender.

mod listeners;

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::driver::{SendError, SendResult};
use crate::metrics::ListenerMetrics;
use crate::notification::NotificationSummary;

pub use listeners::{HistoryListener, MetricsListener, TracingListener};

/// Error type returned by listeners
pub type ListenerError = anyhow::Error;

/// The three lifecycle event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Sending,
    Sent,
    Failed,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Sending, EventKind::Sent, EventKind::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Sending => "sending",
            EventKind::Sent => "sent",
            EventKind::Failed => "failed",
        }
    }
}

/// Event emitted by the notification manager during a send
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeliveryEvent {
    /// Emitted once before any channel is attempted
    Sending {
        notification: NotificationSummary,
        channels: Vec<String>,
    },
    /// Emitted after the send when at least one channel succeeded
    Sent {
        notification: NotificationSummary,
        channels: Vec<String>,
        results: BTreeMap<String, SendResult>,
    },
    /// Emitted per failed channel (`failed_channel` set), and once more as the
    /// terminal event when no channel succeeded
    Failed {
        notification: NotificationSummary,
        channels: Vec<String>,
        error: SendError,
        #[serde(skip_serializing_if = "Option::is_none")]
        failed_channel: Option<String>,
    },
}

impl DeliveryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DeliveryEvent::Sending { .. } => EventKind::Sending,
            DeliveryEvent::Sent { .. } => EventKind::Sent,
            DeliveryEvent::Failed { .. } => EventKind::Failed,
        }
    }

    pub fn notification(&self) -> &NotificationSummary {
        match self {
            DeliveryEvent::Sending { notification, .. }
            | DeliveryEvent::Sent { notification, .. }
            | DeliveryEvent::Failed { notification, .. } => notification,
        }
    }

    pub fn channels(&self) -> &[String] {
        match self {
            DeliveryEvent::Sending { channels, .. }
            | DeliveryEvent::Sent { channels, .. }
            | DeliveryEvent::Failed { channels, .. } => channels,
        }
    }
}

/// Observer of delivery events
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Name used in logs when the listener fails
    fn name(&self) -> &str {
        "listener"
    }

    async fn handle(&self, event: &DeliveryEvent) -> Result<(), ListenerError>;
}

/// Adapts a synchronous closure into an [`EventListener`]
pub struct FnListener<F> {
    name: String,
    f: F,
}

impl<F> FnListener<F>
where
    F: Fn(&DeliveryEvent) -> Result<(), ListenerError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> EventListener for FnListener<F>
where
    F: Fn(&DeliveryEvent) -> Result<(), ListenerError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &DeliveryEvent) -> Result<(), ListenerError> {
        (self.f)(event)
    }
}

/// Routes events to the listeners registered for their kind, in registration order
#[derive(Default)]
pub struct EventDispatcher {
    listeners: DashMap<EventKind, Vec<Arc<dyn EventListener>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a listener to one event kind
    pub fn on(&self, kind: EventKind, listener: Arc<dyn EventListener>) {
        self.listeners.entry(kind).or_default().push(listener);
    }

    /// Subscribe a listener to every event kind
    pub fn on_all(&self, listener: Arc<dyn EventListener>) {
        for kind in EventKind::ALL {
            self.on(kind, listener.clone());
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map(|l| l.len()).unwrap_or(0)
    }

    /// Deliver an event to every subscribed listener
    pub async fn dispatch(&self, event: &DeliveryEvent) {
        let kind = event.kind();
        let listeners = match self.listeners.get(&kind) {
            Some(listeners) => listeners.clone(),
            None => return,
        };

        for listener in listeners {
            match AssertUnwindSafe(listener.handle(event)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    ListenerMetrics::record_failure(kind.as_str());
                    tracing::warn!(
                        listener = %listener.name(),
                        event = %kind.as_str(),
                        error = %e,
                        "Event listener failed"
                    );
                }
                Err(_) => {
                    ListenerMetrics::record_failure(kind.as_str());
                    tracing::error!(
                        listener = %listener.name(),
                        event = %kind.as_str(),
                        "Event listener panicked"
                    );
                }
            }
        }
    }
}
