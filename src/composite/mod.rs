//! Composite driver presenting several sub-drivers as one.
//!
//! # Strategies
//!
//! - `priority-fallback`: drivers are tried in descending priority order until one
//!   succeeds. Every failure along the way is kept.
//! - `round-robin`: each send uses the next driver in a rotating cursor. No fallback.
//! - `random`: weighted draw when any driver declares a weight (undeclared weights
//!   count as 1), uniform draw otherwise. No fallback.
//!
//! Disabled entries are dropped at construction and can never be selected.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::driver::{DeliveryRequest, Driver, DriverEntry, DriverFailure, SendError, SendResult};
use crate::error::ConfigurationError;
use crate::metrics::DriverMetrics;
use crate::retry::RetryExecutor;

/// Sub-driver selection policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    #[default]
    PriorityFallback,
    RoundRobin,
    #[serde(alias = "weighted-random")]
    Random,
}

/// Outcome of a composite send with the failures collected on the way
#[derive(Debug, Clone)]
pub struct CompositeOutcome {
    /// The delivering sub-driver's result, or an `Exhausted` failure
    pub result: SendResult,
    /// Failed sub-driver attempts, in attempt order
    pub failures: Vec<DriverFailure>,
    /// Entry name of the sub-driver that delivered
    pub delivered_by: Option<String>,
}

/// Driver that selects and fails over between sub-drivers
pub struct CompositeDriver {
    name: String,
    drivers: Vec<DriverEntry>,
    strategy: SelectionStrategy,
    cursor: AtomicUsize,
    executor: RetryExecutor,
}

impl CompositeDriver {
    /// Build a composite from driver entries.
    ///
    /// Fails when no entry is enabled.
    pub fn new(
        name: impl Into<String>,
        entries: Vec<DriverEntry>,
        strategy: SelectionStrategy,
        executor: RetryExecutor,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let mut drivers: Vec<DriverEntry> =
            entries.into_iter().filter(DriverEntry::is_enabled).collect();

        if drivers.is_empty() {
            return Err(ConfigurationError::NoEnabledDrivers(name));
        }

        if strategy == SelectionStrategy::PriorityFallback {
            // stable: equal priorities keep declaration order
            drivers.sort_by(|a, b| b.priority().cmp(&a.priority()));
        }

        tracing::info!(
            composite = %name,
            strategy = ?strategy,
            drivers = ?drivers.iter().map(DriverEntry::name).collect::<Vec<_>>(),
            "Composite driver configured"
        );

        Ok(Self {
            name,
            drivers,
            strategy,
            cursor: AtomicUsize::new(0),
            executor,
        })
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    /// Enabled sub-drivers in selection order
    pub fn drivers(&self) -> &[DriverEntry] {
        &self.drivers
    }

    /// Send and report every failed sub-driver attempt alongside the result
    #[tracing::instrument(
        name = "composite.send",
        skip(self, request),
        fields(composite = %self.name, strategy = ?self.strategy, channel = %request.channel)
    )]
    pub async fn send_detailed(&self, request: &DeliveryRequest) -> CompositeOutcome {
        let mut failures = Vec::new();

        for index in self.selection() {
            let entry = &self.drivers[index];

            match self.attempt(entry, request).await {
                Ok(result) => {
                    if !failures.is_empty() {
                        DriverMetrics::record_fallback(&self.name);
                        tracing::info!(
                            driver = %entry.name(),
                            failed_before = failures.len(),
                            "Fallback driver delivered notification"
                        );
                    }
                    return CompositeOutcome {
                        result,
                        failures,
                        delivered_by: Some(entry.name().to_string()),
                    };
                }
                Err(error) => {
                    tracing::warn!(
                        driver = %entry.name(),
                        error = %error,
                        "Driver failed"
                    );
                    failures.push(DriverFailure::new(entry.name(), &error));
                }
            }
        }

        tracing::error!(
            attempted = failures.len(),
            "All applicable drivers failed"
        );

        CompositeOutcome {
            result: SendResult::failed(SendError::Exhausted {
                failures: failures.clone(),
            }),
            failures,
            delivered_by: None,
        }
    }

    /// Indices of the drivers to try for one send, in order
    fn selection(&self) -> Vec<usize> {
        match self.strategy {
            SelectionStrategy::PriorityFallback => (0..self.drivers.len()).collect(),
            SelectionStrategy::RoundRobin => vec![self.next_cursor()],
            SelectionStrategy::Random => vec![self.pick_random()],
        }
    }

    fn next_cursor(&self) -> usize {
        let len = self.drivers.len();
        match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % len))
        {
            Ok(previous) | Err(previous) => previous % len,
        }
    }

    fn pick_random(&self) -> usize {
        let mut rng = rand::rng();
        let len = self.drivers.len();

        if self.drivers.iter().any(|d| d.weight().is_some()) {
            let weights: Vec<u32> = self
                .drivers
                .iter()
                .map(|d| d.weight().unwrap_or(1))
                .collect();
            let total: u64 = weights.iter().map(|w| u64::from(*w)).sum();
            if total > 0 {
                let draw = rng.random_range(0..total);
                return weighted_index(&weights, draw).unwrap_or(0);
            }
        }

        rng.random_range(0..len)
    }

    /// One sub-driver: map once, then run under that driver's retry policy
    async fn attempt(
        &self,
        entry: &DriverEntry,
        request: &DeliveryRequest,
    ) -> Result<SendResult, SendError> {
        if !entry.driver().is_ready() {
            return Err(SendError::with_code(
                "NOT_READY",
                format!("driver '{}' is not ready", entry.name()),
            ));
        }

        let request = entry.map_request(request)?;
        let result = self
            .executor
            .execute(&**entry.driver(), &request, entry.retry(), entry.timeout())
            .await?;

        match result.failure() {
            Some(error) => Err(error),
            None => Ok(result),
        }
    }
}

#[async_trait]
impl Driver for CompositeDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "composite"
    }

    fn is_ready(&self) -> bool {
        self.drivers.iter().any(|d| d.driver().is_ready())
    }

    async fn send(&self, request: &DeliveryRequest) -> Result<SendResult, SendError> {
        Ok(self.send_detailed(request).await.result)
    }
}

/// Index selected by a cumulative-weight draw in `0..sum(weights)`
pub fn weighted_index(weights: &[u32], draw: u64) -> Option<usize> {
    let mut cumulative = 0u64;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += u64::from(*weight);
        if draw < cumulative {
            return Some(index);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::*;
    use crate::driver::testing::{request, ScriptedDriver};
    use crate::driver::{FnMapper, MapperSource, MessageMapper, SendStatus};
    use crate::retry::{RetryConfig, TrackingSleeper};

    fn executor() -> RetryExecutor {
        RetryExecutor::with_sleeper(RetryConfig::default(), Arc::new(TrackingSleeper::new()))
    }

    fn entry(driver: Arc<ScriptedDriver>, priority: i32) -> DriverEntry {
        DriverEntry::builder(driver.name().to_string())
            .instance(driver)
            .priority(priority)
            .build()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_round_robin_spreads_concurrent_sends() {
        let drivers = [
            ScriptedDriver::succeeding("a"),
            ScriptedDriver::succeeding("b"),
            ScriptedDriver::succeeding("c"),
        ];
        let composite = Arc::new(
            CompositeDriver::new(
                "push",
                drivers.iter().map(|d| entry(d.clone(), 0)).collect(),
                SelectionStrategy::RoundRobin,
                executor(),
            )
            .unwrap(),
        );

        let sends = (0..30).map(|_| {
            let composite = composite.clone();
            tokio::spawn(async move { composite.send(&request("push")).await })
        });
        for handle in futures::future::join_all(sends).await {
            assert_eq!(handle.unwrap().unwrap().status, SendStatus::Success);
        }

        for driver in &drivers {
            assert_eq!(driver.calls(), 10, "driver {}", driver.name());
        }
    }

    #[tokio::test]
    async fn test_priority_order_ignores_construction_order() {
        let low = ScriptedDriver::succeeding("low");
        let high = ScriptedDriver::succeeding("high");
        let mid = ScriptedDriver::succeeding("mid");

        let composite = CompositeDriver::new(
            "email",
            vec![entry(low.clone(), 3), entry(high.clone(), 10), entry(mid.clone(), 5)],
            SelectionStrategy::PriorityFallback,
            executor(),
        )
        .unwrap();

        let outcome = composite.send_detailed(&request("email")).await;

        assert_eq!(outcome.delivered_by.as_deref(), Some("high"));
        assert_eq!((high.calls(), mid.calls(), low.calls()), (1, 0, 0));
    }

    #[tokio::test]
    async fn test_fallback_returns_next_driver_result() {
        let primary = ScriptedDriver::failing("primary", "mailbox unavailable");
        let backup = ScriptedDriver::succeeding("backup");

        let composite = CompositeDriver::new(
            "email",
            vec![entry(primary.clone(), 10), entry(backup.clone(), 5)],
            SelectionStrategy::PriorityFallback,
            executor(),
        )
        .unwrap();

        let outcome = composite.send_detailed(&request("email")).await;

        assert_eq!(outcome.result.id, "backup");
        assert_eq!(outcome.result.status, SendStatus::Success);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].driver, "primary");
        assert_eq!(outcome.failures[0].message, "mailbox unavailable");
    }

    #[tokio::test]
    async fn test_all_failures_are_aggregated_in_attempt_order() {
        let composite = CompositeDriver::new(
            "sms",
            vec![
                entry(ScriptedDriver::failing("c", "rejected c"), 1),
                entry(ScriptedDriver::failing("a", "rejected a"), 9),
                entry(ScriptedDriver::failing("b", "rejected b"), 5),
            ],
            SelectionStrategy::PriorityFallback,
            executor(),
        )
        .unwrap();

        let result = composite.send(&request("sms")).await.unwrap();

        assert_eq!(result.status, SendStatus::Failed);
        let error = result.error.unwrap();
        let drivers: Vec<&str> = error.failures().iter().map(|f| f.driver.as_str()).collect();
        assert_eq!(drivers, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_round_robin_cycles_through_drivers() {
        let a = ScriptedDriver::succeeding("a");
        let b = ScriptedDriver::succeeding("b");
        let c = ScriptedDriver::succeeding("c");

        let composite = CompositeDriver::new(
            "push",
            vec![entry(a, 0), entry(b, 0), entry(c, 0)],
            SelectionStrategy::RoundRobin,
            executor(),
        )
        .unwrap();

        let mut used = Vec::new();
        for _ in 0..4 {
            let outcome = composite.send_detailed(&request("push")).await;
            used.push(outcome.delivered_by.unwrap());
        }

        assert_eq!(used, vec!["a", "b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_round_robin_does_not_fall_back() {
        let a = ScriptedDriver::failing("a", "rejected");
        let b = ScriptedDriver::succeeding("b");

        let composite = CompositeDriver::new(
            "push",
            vec![entry(a.clone(), 0), entry(b.clone(), 0)],
            SelectionStrategy::RoundRobin,
            executor(),
        )
        .unwrap();

        let outcome = composite.send_detailed(&request("push")).await;

        assert!(outcome.result.is_failure());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_disabled_entries_are_never_selected() {
        let disabled = ScriptedDriver::succeeding("disabled");
        let active = ScriptedDriver::failing("active", "rejected");

        let disabled_entry = DriverEntry::builder("disabled")
            .instance(disabled.clone())
            .priority(100)
            .enabled(false)
            .build()
            .unwrap();

        let composite = CompositeDriver::new(
            "email",
            vec![disabled_entry, entry(active, 1)],
            SelectionStrategy::PriorityFallback,
            executor(),
        )
        .unwrap();

        let outcome = composite.send_detailed(&request("email")).await;

        assert!(outcome.result.is_failure());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(disabled.calls(), 0);
        assert_eq!(composite.drivers().len(), 1);
    }

    #[test]
    fn test_requires_an_enabled_driver() {
        let disabled = DriverEntry::builder("off")
            .instance(ScriptedDriver::succeeding("off"))
            .enabled(false)
            .build()
            .unwrap();

        let result = CompositeDriver::new(
            "email",
            vec![disabled],
            SelectionStrategy::PriorityFallback,
            executor(),
        );

        assert!(matches!(result, Err(ConfigurationError::NoEnabledDrivers(name)) if name == "email"));
    }

    #[test]
    fn test_weighted_index() {
        let weights = [1, 3, 0, 6];
        assert_eq!(weighted_index(&weights, 0), Some(0));
        assert_eq!(weighted_index(&weights, 1), Some(1));
        assert_eq!(weighted_index(&weights, 3), Some(1));
        assert_eq!(weighted_index(&weights, 4), Some(3));
        assert_eq!(weighted_index(&weights, 9), Some(3));
        assert_eq!(weighted_index(&weights, 10), None);
    }

    #[tokio::test]
    async fn test_weighted_random_respects_zero_weights() {
        let never = ScriptedDriver::succeeding("never");
        let always = ScriptedDriver::succeeding("always");

        let composite = CompositeDriver::new(
            "chat",
            vec![
                DriverEntry::builder("never")
                    .instance(never.clone())
                    .weight(0)
                    .build()
                    .unwrap(),
                DriverEntry::builder("always")
                    .instance(always.clone())
                    .weight(5)
                    .build()
                    .unwrap(),
            ],
            SelectionStrategy::Random,
            executor(),
        )
        .unwrap();

        for _ in 0..20 {
            composite.send_detailed(&request("chat")).await;
        }

        assert_eq!(never.calls(), 0);
        assert_eq!(always.calls(), 20);
    }

    #[tokio::test]
    async fn test_mapper_runs_once_across_retries() {
        let mapped_count = Arc::new(AtomicUsize::new(0));
        let counter = mapped_count.clone();
        let mapper: Arc<dyn MessageMapper> = Arc::new(FnMapper::new(move |message: &Value| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "text": message["body"], "format": "sms" }))
        }));

        let driver = ScriptedDriver::scripted(
            "gateway",
            vec![
                Err(SendError::provider("connection reset")),
                Err(SendError::provider("socket closed")),
            ],
            Ok(SendResult::success(None)),
        );
        let sleeper = TrackingSleeper::new();
        let composite = CompositeDriver::new(
            "sms",
            vec![DriverEntry::builder("gateway")
                .instance(driver.clone())
                .mapper(MapperSource::Instance(mapper))
                .build()
                .unwrap()],
            SelectionStrategy::PriorityFallback,
            RetryExecutor::with_sleeper(RetryConfig::default(), Arc::new(sleeper.clone())),
        )
        .unwrap();

        let outcome = composite.send_detailed(&request("sms")).await;

        assert!(!outcome.result.is_failure());
        assert_eq!(mapped_count.load(Ordering::SeqCst), 1);
        assert_eq!(driver.calls(), 3);
        for message in driver.messages() {
            assert_eq!(message, json!({"text": "hello", "format": "sms"}));
        }
        assert_eq!(
            sleeper.calls(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[tokio::test]
    async fn test_entry_retry_override_is_used() {
        let driver = ScriptedDriver::failing("flaky", "timeout");
        let sleeper = TrackingSleeper::new();
        let composite = CompositeDriver::new(
            "email",
            vec![DriverEntry::builder("flaky")
                .instance(driver.clone())
                .retry(RetryConfig {
                    max_retries: 5,
                    retry_delay_ms: 10,
                    exponential_backoff: false,
                    ..RetryConfig::default()
                })
                .build()
                .unwrap()],
            SelectionStrategy::PriorityFallback,
            RetryExecutor::with_sleeper(RetryConfig::default(), Arc::new(sleeper.clone())),
        )
        .unwrap();

        composite.send_detailed(&request("email")).await;

        assert_eq!(driver.calls(), 5);
        assert_eq!(sleeper.total(), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_not_ready_driver_is_skipped_with_failure() {
        let offline = ScriptedDriver::not_ready("offline");
        let online = ScriptedDriver::succeeding("online");

        let composite = CompositeDriver::new(
            "email",
            vec![entry(offline.clone(), 10), entry(online, 1)],
            SelectionStrategy::PriorityFallback,
            executor(),
        )
        .unwrap();

        let outcome = composite.send_detailed(&request("email")).await;

        assert_eq!(outcome.delivered_by.as_deref(), Some("online"));
        assert_eq!(outcome.failures[0].code.as_deref(), Some("NOT_READY"));
        assert_eq!(offline.calls(), 0);
    }
}
