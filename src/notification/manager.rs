use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;

use crate::driver::{DeliveryRequest, Driver, SendError, SendResult};
use crate::error::DeliveryError;
use crate::events::{DeliveryEvent, EventDispatcher};
use crate::metrics::DeliveryMetrics;
use crate::registry::DriverRegistry;

use super::{
    DeliveryStrategy, Notifiable, Notification, NotificationResult, NotificationSummary,
    RequestBuilder, RoutingMap,
};

/// One channel ready to send: its resolved driver and built request
struct Planned {
    channel: String,
    driver: Arc<dyn Driver>,
    request: DeliveryRequest,
}

/// Top-level delivery orchestrator.
///
/// Holds the registry, request builder and event dispatcher as explicit collaborators.
pub struct NotificationManager {
    registry: Arc<DriverRegistry>,
    requests: RequestBuilder,
    events: Arc<EventDispatcher>,
    default_strategy: DeliveryStrategy,
}

impl NotificationManager {
    pub fn new(registry: Arc<DriverRegistry>, events: Arc<EventDispatcher>) -> Self {
        Self {
            registry,
            requests: RequestBuilder::default(),
            events,
            default_strategy: DeliveryStrategy::default(),
        }
    }

    /// Strategy used when `send` is called without an override
    pub fn with_strategy(mut self, strategy: DeliveryStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    pub fn with_request_builder(mut self, requests: RequestBuilder) -> Self {
        self.requests = requests;
        self
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    pub fn default_strategy(&self) -> DeliveryStrategy {
        self.default_strategy
    }

    /// Send a notification to a recipient
    pub async fn notify<N: Notifiable + ?Sized>(
        &self,
        notifiable: &N,
        notification: &Notification,
    ) -> Result<NotificationResult, DeliveryError> {
        self.send(notification, &notifiable.routing(), None).await
    }

    /// Deliver `notification` on every declared channel the recipient can be reached on.
    ///
    /// Configuration errors are returned before any driver is called. Under
    /// all-or-nothing the first failing channel aborts the send with
    /// [`DeliveryError::Aborted`]; under best-effort provider failures are recorded
    /// in the result and never returned as errors.
    #[tracing::instrument(
        name = "manager.send",
        skip(self, notification, routing),
        fields(notification_id = %notification.id, kind = %notification.kind)
    )]
    pub async fn send(
        &self,
        notification: &Notification,
        routing: &RoutingMap,
        strategy: Option<DeliveryStrategy>,
    ) -> Result<NotificationResult, DeliveryError> {
        let strategy = strategy.unwrap_or(self.default_strategy);
        let summary = notification.summary();
        let channels = notification.channels().to_vec();

        let plan = self.plan(notification, routing)?;

        self.events
            .dispatch(&DeliveryEvent::Sending {
                notification: summary.clone(),
                channels: channels.clone(),
            })
            .await;

        let mut results = BTreeMap::new();
        let mut errors = BTreeMap::new();
        // Failures in declared channel order
        let mut failures: Vec<(String, SendError)> = Vec::new();
        let mut aborted = false;

        match strategy {
            DeliveryStrategy::AllOrNothing => {
                for planned in plan {
                    let outcome = deliver(&planned).await;
                    match outcome {
                        Ok(result) => {
                            results.insert(planned.channel, result);
                        }
                        Err(error) => {
                            self.channel_failed(&summary, &channels, &planned.channel, &error)
                                .await;
                            failures.push((planned.channel, error));
                            aborted = true;
                            break;
                        }
                    }
                }
            }
            DeliveryStrategy::BestEffort => {
                let outcomes = join_all(plan.iter().map(deliver)).await;
                for (planned, outcome) in plan.into_iter().zip(outcomes) {
                    match outcome {
                        Ok(result) => {
                            results.insert(planned.channel, result);
                        }
                        Err(error) => {
                            self.channel_failed(&summary, &channels, &planned.channel, &error)
                                .await;
                            failures.push((planned.channel, error));
                        }
                    }
                }
            }
        }

        for (channel, error) in &failures {
            errors.insert(channel.clone(), error.clone());
        }
        let first_failure = failures.into_iter().next();

        if results.is_empty() {
            if let Some((_, error)) = &first_failure {
                self.events
                    .dispatch(&DeliveryEvent::Failed {
                        notification: summary.clone(),
                        channels: channels.clone(),
                        error: error.clone(),
                        failed_channel: None,
                    })
                    .await;
            } else {
                self.sent(&summary, &channels, &results).await;
            }
        } else {
            self.sent(&summary, &channels, &results).await;
        }

        let result = NotificationResult::new(notification.id, results, errors);
        DeliveryMetrics::record_notification(result.status.as_str());

        match first_failure {
            Some((channel, source)) if aborted => {
                tracing::error!(channel = %channel, error = %source, "Delivery aborted");
                Err(DeliveryError::Aborted {
                    channel,
                    source,
                    partial: Box::new(result),
                })
            }
            _ => {
                tracing::info!(
                    status = %result.status.as_str(),
                    delivered = result.results.len(),
                    failed = result.errors.len(),
                    "Notification processed"
                );
                Ok(result)
            }
        }
    }

    /// Build requests and resolve drivers for every routed channel
    fn plan(
        &self,
        notification: &Notification,
        routing: &RoutingMap,
    ) -> Result<Vec<Planned>, DeliveryError> {
        let mut plan = Vec::with_capacity(notification.channels().len());

        for channel in notification.channels() {
            let Some(request) = self.requests.build(notification, channel, routing) else {
                tracing::debug!(channel = %channel, "No routing for channel, skipping");
                // Unregistered names come from callers; keep them out of metric labels
                if self.registry.contains(channel) {
                    DeliveryMetrics::record_skipped(channel);
                }
                continue;
            };

            let driver = self.registry.resolve(channel)?;
            plan.push(Planned {
                channel: channel.clone(),
                driver,
                request,
            });
        }

        Ok(plan)
    }

    async fn channel_failed(
        &self,
        summary: &NotificationSummary,
        channels: &[String],
        channel: &str,
        error: &SendError,
    ) {
        self.events
            .dispatch(&DeliveryEvent::Failed {
                notification: summary.clone(),
                channels: channels.to_vec(),
                error: error.clone(),
                failed_channel: Some(channel.to_string()),
            })
            .await;
    }

    async fn sent(
        &self,
        summary: &NotificationSummary,
        channels: &[String],
        results: &BTreeMap<String, SendResult>,
    ) {
        self.events
            .dispatch(&DeliveryEvent::Sent {
                notification: summary.clone(),
                channels: channels.to_vec(),
                results: results.clone(),
            })
            .await;
    }
}

/// Invoke the channel's driver; a `failed` status counts as an error
async fn deliver(planned: &Planned) -> Result<SendResult, SendError> {
    let started = Instant::now();
    let outcome = match planned.driver.send(&planned.request).await {
        Ok(result) => match result.failure() {
            Some(error) => Err(error),
            None => Ok(result),
        },
        Err(error) => Err(error),
    };

    let label = if outcome.is_ok() { "success" } else { "failed" };
    DeliveryMetrics::record_channel(&planned.channel, label, started.elapsed());
    if let Err(error) = &outcome {
        tracing::warn!(
            channel = %planned.channel,
            driver = %planned.driver.name(),
            error = %error,
            "Channel delivery failed"
        );
    }

    outcome
}
