use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::config::Settings;
use crate::error::ConfigurationError;
use crate::events::{EventDispatcher, EventKind, HistoryListener, MetricsListener, TracingListener};
use crate::history::{DeliveryLogStore, MemoryDeliveryLog};
use crate::notification::NotificationManager;
use crate::queue::DeliveryQueue;
use crate::registry::{DriverCatalog, DriverRegistry};
use crate::retry::RetryExecutor;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub manager: Arc<NotificationManager>,
    pub queue: Arc<DeliveryQueue>,
    pub history: Arc<dyn DeliveryLogStore>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the registry, listeners, manager and queue from settings.
    ///
    /// Must be called inside a tokio runtime; the queue worker is spawned here.
    pub fn new(
        settings: Settings,
        catalog: &DriverCatalog,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<Self, ConfigurationError> {
        let executor = RetryExecutor::new(settings.delivery.retry.clone());
        let registry = Arc::new(DriverRegistry::from_settings(
            &settings.channels,
            catalog,
            executor,
        )?);

        let history: Arc<dyn DeliveryLogStore> =
            Arc::new(MemoryDeliveryLog::new(settings.history.capacity));
        let events = Arc::new(EventDispatcher::new());
        events.on_all(Arc::new(TracingListener));
        events.on_all(Arc::new(MetricsListener));
        let history_listener = Arc::new(HistoryListener::new(history.clone()));
        events.on(EventKind::Sent, history_listener.clone());
        events.on(EventKind::Failed, history_listener);

        let manager = Arc::new(
            NotificationManager::new(registry, events).with_strategy(settings.delivery.strategy),
        );
        let queue = Arc::new(DeliveryQueue::spawn(
            manager.clone(),
            settings.queue.clone(),
            shutdown,
        ));

        tracing::info!(
            channels = ?manager.registry().channels(),
            strategy = ?settings.delivery.strategy,
            "Delivery engine initialized"
        );

        Ok(Self {
            settings: Arc::new(settings),
            manager,
            queue,
            history,
            started_at: Instant::now(),
        })
    }
}
