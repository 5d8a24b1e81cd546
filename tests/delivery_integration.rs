//! End-to-end delivery scenarios: composite selection, retry backoff, mapping, and
//! channel-level delivery strategies.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_test::assert_ok;

use ara_delivery_engine::composite::{CompositeDriver, SelectionStrategy};
use ara_delivery_engine::driver::{
    DeliveryRequest, Driver, DriverEntry, FnMapper, MapperSource, MessageMapper, SendError,
    SendResult, SendStatus,
};
use ara_delivery_engine::error::DeliveryError;
use ara_delivery_engine::events::{DeliveryEvent, EventDispatcher, EventKind, FnListener};
use ara_delivery_engine::notification::{
    DeliveryStatus, DeliveryStrategy, Notification, NotificationManager, RoutingMap,
};
use ara_delivery_engine::registry::DriverRegistry;
use ara_delivery_engine::retry::{RetryConfig, RetryExecutor, TrackingSleeper};

/// Shared record of which driver was called, in call order
type CallLog = Arc<Mutex<Vec<String>>>;

struct FakeDriver {
    name: String,
    script: Mutex<VecDeque<Result<SendResult, SendError>>>,
    fallback: Result<SendResult, SendError>,
    log: CallLog,
    messages: Mutex<Vec<Value>>,
}

impl FakeDriver {
    fn new(name: &str, log: &CallLog, fallback: Result<SendResult, SendError>) -> Arc<Self> {
        Self::scripted(name, log, Vec::new(), fallback)
    }

    fn scripted(
        name: &str,
        log: &CallLog,
        script: Vec<Result<SendResult, SendError>>,
        fallback: Result<SendResult, SendError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            fallback,
            log: log.clone(),
            messages: Mutex::new(Vec::new()),
        })
    }

    fn ok(name: &str, log: &CallLog) -> Arc<Self> {
        Self::new(name, log, Ok(SendResult::success(Some(json!({ "via": name }))).with_id(name)))
    }

    fn failing(name: &str, log: &CallLog, message: &str) -> Arc<Self> {
        Self::new(name, log, Err(SendError::provider(message)))
    }

    fn messages(&self) -> Vec<Value> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, request: &DeliveryRequest) -> Result<SendResult, SendError> {
        self.log.lock().unwrap().push(self.name.clone());
        self.messages.lock().unwrap().push(request.message.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn entry(driver: Arc<FakeDriver>, priority: i32) -> DriverEntry {
    DriverEntry::builder(driver.name().to_string())
        .instance(driver)
        .priority(priority)
        .build()
        .unwrap()
}

fn instant_executor() -> (RetryExecutor, TrackingSleeper) {
    let sleeper = TrackingSleeper::new();
    let executor = RetryExecutor::with_sleeper(RetryConfig::no_retry(), Arc::new(sleeper.clone()));
    (executor, sleeper)
}

fn email_request() -> DeliveryRequest {
    DeliveryRequest::new(
        "email",
        json!({"address": "user@example.com"}),
        json!({"subject": "Hi", "body": "Hello"}),
    )
}

#[tokio::test]
async fn test_priority_fallback_starts_with_highest_priority() {
    let log = new_log();
    let (executor, _) = instant_executor();
    let composite = CompositeDriver::new(
        "email",
        vec![
            entry(FakeDriver::ok("p3", &log), 3),
            entry(FakeDriver::ok("p10", &log), 10),
            entry(FakeDriver::ok("p5", &log), 5),
        ],
        SelectionStrategy::PriorityFallback,
        executor,
    )
    .unwrap();

    for _ in 0..3 {
        assert_ok!(composite.send(&email_request()).await);
    }

    assert_eq!(calls(&log), vec!["p10", "p10", "p10"]);
}

#[tokio::test]
async fn test_fallback_returns_the_delivering_drivers_result() {
    let log = new_log();
    let (executor, _) = instant_executor();
    let composite = CompositeDriver::new(
        "email",
        vec![
            entry(FakeDriver::failing("p10", &log, "invalid api key"), 10),
            entry(FakeDriver::ok("p5", &log), 5),
            entry(FakeDriver::ok("p3", &log), 3),
        ],
        SelectionStrategy::PriorityFallback,
        executor,
    )
    .unwrap();

    let outcome = composite.send_detailed(&email_request()).await;

    assert_eq!(outcome.result.id, "p5");
    assert_eq!(outcome.result.status, SendStatus::Success);
    assert_eq!(outcome.result.response, Some(json!({"via": "p5"})));
    assert_eq!(outcome.delivered_by.as_deref(), Some("p5"));
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].driver, "p10");
    assert_eq!(outcome.failures[0].message, "invalid api key");
    assert_eq!(calls(&log), vec!["p10", "p5"]);
}

#[tokio::test]
async fn test_exhausted_composite_reports_every_failure_in_attempt_order() {
    let log = new_log();
    let (executor, _) = instant_executor();
    let composite = CompositeDriver::new(
        "sms",
        vec![
            entry(FakeDriver::failing("b", &log, "b down"), 5),
            entry(FakeDriver::failing("a", &log, "a down"), 9),
            entry(FakeDriver::failing("c", &log, "c down"), 1),
        ],
        SelectionStrategy::PriorityFallback,
        executor,
    )
    .unwrap();

    let result = composite.send(&email_request()).await.unwrap();

    assert_eq!(result.status, SendStatus::Failed);
    let error = result.error.unwrap();
    let failures: Vec<(&str, &str)> = error
        .failures()
        .iter()
        .map(|f| (f.driver.as_str(), f.message.as_str()))
        .collect();
    assert_eq!(failures, vec![("a", "a down"), ("b", "b down"), ("c", "c down")]);
    assert_eq!(error.to_string(), "all drivers failed: a: a down; b: b down; c: c down");
}

#[tokio::test]
async fn test_round_robin_cycles_through_drivers() {
    let log = new_log();
    let (executor, _) = instant_executor();
    let composite = CompositeDriver::new(
        "push",
        vec![
            entry(FakeDriver::ok("A", &log), 0),
            entry(FakeDriver::ok("B", &log), 0),
            entry(FakeDriver::ok("C", &log), 0),
        ],
        SelectionStrategy::RoundRobin,
        executor,
    )
    .unwrap();

    for _ in 0..4 {
        composite.send(&email_request()).await.unwrap();
    }

    assert_eq!(calls(&log), vec!["A", "B", "C", "A"]);
}

#[tokio::test]
async fn test_round_robin_does_not_fall_back() {
    let log = new_log();
    let (executor, _) = instant_executor();
    let composite = CompositeDriver::new(
        "push",
        vec![
            entry(FakeDriver::failing("A", &log, "rejected"), 0),
            entry(FakeDriver::ok("B", &log), 0),
        ],
        SelectionStrategy::RoundRobin,
        executor,
    )
    .unwrap();

    let result = composite.send(&email_request()).await.unwrap();

    assert_eq!(result.status, SendStatus::Failed);
    assert_eq!(calls(&log), vec!["A"]);
}

#[tokio::test]
async fn test_backoff_doubles_and_caps() {
    let log = new_log();
    let sleeper = TrackingSleeper::new();
    let policy = RetryConfig {
        max_retries: 6,
        ..RetryConfig::default()
    };
    let executor = RetryExecutor::with_sleeper(policy, Arc::new(sleeper.clone()));
    let driver = FakeDriver::failing("smtp", &log, "connection reset by peer");

    let outcome = executor.execute(&*driver, &email_request(), None, None).await;

    assert!(outcome.is_err());
    assert_eq!(calls(&log).len(), 6);
    assert_eq!(
        sleeper.calls(),
        [1000, 2000, 4000, 5000, 5000]
            .into_iter()
            .map(Duration::from_millis)
            .collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_fatal_error_is_not_retried() {
    let log = new_log();
    let sleeper = TrackingSleeper::new();
    let executor = RetryExecutor::with_sleeper(RetryConfig::default(), Arc::new(sleeper.clone()));
    let driver = FakeDriver::failing("smtp", &log, "recipient address rejected");

    let outcome = executor.execute(&*driver, &email_request(), None, None).await;

    assert!(outcome.is_err());
    assert_eq!(calls(&log).len(), 1);
    assert_eq!(sleeper.total(), Duration::ZERO);
}

#[tokio::test]
async fn test_disabled_entries_are_never_selected() {
    for strategy in [
        SelectionStrategy::PriorityFallback,
        SelectionStrategy::RoundRobin,
        SelectionStrategy::Random,
    ] {
        let log = new_log();
        let (executor, _) = instant_executor();
        let disabled = DriverEntry::builder("off")
            .instance(FakeDriver::ok("off", &log))
            .priority(100)
            .weight(1000)
            .enabled(false)
            .build()
            .unwrap();
        let composite = CompositeDriver::new(
            "email",
            vec![disabled, entry(FakeDriver::failing("on", &log, "down"), 1)],
            strategy,
            executor,
        )
        .unwrap();

        for _ in 0..10 {
            composite.send(&email_request()).await.unwrap();
        }

        assert!(calls(&log).iter().all(|name| name == "on"), "{strategy:?}");
        assert_eq!(composite.drivers().len(), 1);
    }
}

#[tokio::test]
async fn test_weighted_random_never_picks_zero_weight() {
    let log = new_log();
    let (executor, _) = instant_executor();
    let heavy = DriverEntry::builder("heavy")
        .instance(FakeDriver::ok("heavy", &log))
        .weight(5)
        .build()
        .unwrap();
    let never = DriverEntry::builder("never")
        .instance(FakeDriver::ok("never", &log))
        .weight(0)
        .build()
        .unwrap();
    let composite =
        CompositeDriver::new("chat", vec![never, heavy], SelectionStrategy::Random, executor)
            .unwrap();

    for _ in 0..50 {
        composite.send(&email_request()).await.unwrap();
    }

    assert!(calls(&log).iter().all(|name| name == "heavy"));
}

#[tokio::test]
async fn test_mapper_runs_once_and_its_output_is_used_on_every_retry() {
    let log = new_log();
    let mapped = Arc::new(AtomicUsize::new(0));
    let counter = mapped.clone();
    let mapper: Arc<dyn MessageMapper> = Arc::new(FnMapper::new(move |message: &Value| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "title": message["subject"], "text": message["body"] }))
    }));
    let driver = FakeDriver::scripted(
        "fcm",
        &log,
        vec![
            Err(SendError::provider("gateway timeout")),
            Err(SendError::provider("socket hang up")),
        ],
        Ok(SendResult::success(None)),
    );
    let sleeper = TrackingSleeper::new();
    let executor = RetryExecutor::with_sleeper(RetryConfig::default(), Arc::new(sleeper.clone()));
    let composite = CompositeDriver::new(
        "push",
        vec![DriverEntry::builder("fcm")
            .instance(driver.clone())
            .mapper(MapperSource::Instance(mapper))
            .build()
            .unwrap()],
        SelectionStrategy::PriorityFallback,
        executor,
    )
    .unwrap();

    let result = composite.send(&email_request()).await.unwrap();

    assert_eq!(result.status, SendStatus::Success);
    assert_eq!(mapped.load(Ordering::SeqCst), 1);
    assert_eq!(
        driver.messages(),
        vec![json!({"title": "Hi", "text": "Hello"}); 3]
    );
    assert_eq!(sleeper.calls().len(), 2);
}

// Orchestrator scenarios

struct Harness {
    manager: NotificationManager,
    log: CallLog,
    events: Arc<Mutex<Vec<EventKind>>>,
}

fn harness(email_fails: bool) -> Harness {
    let log = new_log();
    let registry = Arc::new(DriverRegistry::default());
    let email = if email_fails {
        FakeDriver::failing("smtp", &log, "550 mailbox unavailable")
    } else {
        FakeDriver::ok("smtp", &log)
    };
    registry.register_driver("email", email);
    registry.register_driver("sms", FakeDriver::ok("twilio", &log));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let dispatcher = Arc::new(EventDispatcher::new());
    dispatcher.on_all(Arc::new(FnListener::new("test", move |event: &DeliveryEvent| {
        sink.lock().unwrap().push(event.kind());
        Ok(())
    })));

    Harness {
        manager: NotificationManager::new(registry, dispatcher),
        log,
        events,
    }
}

fn alert() -> Notification {
    Notification::builder("security.alert")
        .channel("email", |routing: &Value| {
            json!({ "to": routing["address"], "subject": "New sign-in" })
        })
        .content("sms", json!({ "text": "New sign-in" }))
        .build()
        .unwrap()
}

fn full_routing() -> RoutingMap {
    RoutingMap::new()
        .with("email", json!({"address": "user@example.com"}))
        .with("sms", json!({"phone": "+15550100"}))
}

#[tokio::test]
async fn test_all_or_nothing_aborts_before_later_channels() {
    let harness = harness(true);

    let error = harness
        .manager
        .send(&alert(), &full_routing(), Some(DeliveryStrategy::AllOrNothing))
        .await
        .unwrap_err();

    assert!(matches!(error, DeliveryError::Aborted { ref channel, .. } if channel == "email"));
    assert_eq!(calls(&harness.log), vec!["smtp"]);
    assert_eq!(
        *harness.events.lock().unwrap(),
        vec![EventKind::Sending, EventKind::Failed, EventKind::Failed]
    );
}

#[tokio::test]
async fn test_best_effort_reports_partial_success() {
    let harness = harness(true);

    let result = harness
        .manager
        .send(&alert(), &full_routing(), Some(DeliveryStrategy::BestEffort))
        .await
        .unwrap();

    assert_eq!(result.status, DeliveryStatus::Partial);
    assert_eq!(result.results.len(), 1);
    assert!(result.results.contains_key("sms"));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors["email"].to_string(), "550 mailbox unavailable");
    assert_eq!(
        *harness.events.lock().unwrap(),
        vec![EventKind::Sending, EventKind::Failed, EventKind::Sent]
    );
}

#[tokio::test]
async fn test_channels_without_routing_are_skipped() {
    let harness = harness(false);
    let routing = RoutingMap::new().with("sms", json!({"phone": "+15550100"}));

    let result = harness.manager.send(&alert(), &routing, None).await.unwrap();

    assert_eq!(result.status, DeliveryStatus::Success);
    assert!(!result.results.contains_key("email"));
    assert!(!result.errors.contains_key("email"));
    assert_eq!(calls(&harness.log), vec!["twilio"]);
}

#[tokio::test]
async fn test_content_builder_receives_channel_routing() {
    let harness = harness(false);
    let email = FakeDriver::ok("ses", &harness.log);
    harness
        .manager
        .registry()
        .register_driver("email", email.clone());

    harness
        .manager
        .send(&alert(), &full_routing(), None)
        .await
        .unwrap();

    assert_eq!(
        email.messages(),
        vec![json!({"to": "user@example.com", "subject": "New sign-in"})]
    );
}
