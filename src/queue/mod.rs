//! In-process deferred delivery.
//!
//! Jobs are held in a bounded channel and handed off by a single worker task. Each
//! job waits out its delay without holding a concurrency slot, then runs through
//! [`NotificationManager::send`] with at most `max_concurrency` sends at once. Jobs
//! are not persisted; anything queued, delayed or waiting for a slot when the
//! shutdown signal arrives is dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{
    broadcast, mpsc, watch, AcquireError, Mutex, OwnedSemaphorePermit, Semaphore,
};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::metrics::QueueMetrics;
use crate::notification::{DeliveryStrategy, Notification, NotificationManager, RoutingMap};

/// Configuration for the delivery queue
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Whether deferred delivery is accepted
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Maximum number of jobs waiting in the channel
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Maximum number of jobs sending at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_capacity() -> usize {
    1024
}

fn default_max_concurrency() -> usize {
    16
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            capacity: default_capacity(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Per-job options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Wait this long before sending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Delivery strategy override for this job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<DeliveryStrategy>,
}

/// Handle describing an accepted job
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time the job will be sent
    pub run_at: DateTime<Utc>,
    pub config: JobConfig,
}

/// Error types for queue operations
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("Delivery queue is disabled")]
    Disabled,

    #[error("Delivery queue is full (capacity: {capacity})")]
    Full { capacity: usize },

    #[error("Delivery queue is shut down")]
    Closed,

    #[error("Invalid job delay: {delay_ms}ms")]
    InvalidDelay { delay_ms: u64 },
}

struct QueuedJob {
    job: Job,
    notification: Notification,
    routing: RoutingMap,
}

/// Bounded queue of deferred sends
pub struct DeliveryQueue {
    tx: Option<mpsc::Sender<QueuedJob>>,
    config: QueueConfig,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryQueue {
    /// Start the queue and its worker; a disabled queue rejects every job
    pub fn spawn(
        manager: Arc<NotificationManager>,
        config: QueueConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        if !config.enabled {
            tracing::info!("Delivery queue disabled");
            return Self {
                tx: None,
                config,
                worker: Mutex::new(None),
            };
        }

        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let (stopping, _) = watch::channel(false);
        let worker = QueueWorker {
            rx,
            manager,
            semaphore: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            max_concurrency: config.max_concurrency.max(1),
            shutdown,
            stopping,
        };
        let handle = tokio::spawn(worker.run());

        tracing::info!(
            capacity = config.capacity,
            max_concurrency = config.max_concurrency,
            "Delivery queue started"
        );

        Self {
            tx: Some(tx),
            config,
            worker: Mutex::new(Some(handle)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Accept a notification for deferred delivery
    pub fn enqueue(
        &self,
        notification: Notification,
        routing: RoutingMap,
        config: JobConfig,
    ) -> Result<Job, QueueError> {
        let tx = self.tx.as_ref().ok_or(QueueError::Disabled)?;

        let enqueued_at = Utc::now();
        let run_at = run_at(enqueued_at, config.delay_ms)?;
        let job = Job {
            id: Uuid::new_v4(),
            notification_id: notification.id,
            enqueued_at,
            run_at,
            config,
        };

        let queued = QueuedJob {
            job: job.clone(),
            notification,
            routing,
        };
        tx.try_send(queued).map_err(|e| {
            QueueMetrics::record_rejected();
            match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full {
                    capacity: self.config.capacity,
                },
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            }
        })?;

        QueueMetrics::record_enqueued();
        tracing::debug!(
            job_id = %job.id,
            notification_id = %job.notification_id,
            run_at = %job.run_at,
            "Job enqueued"
        );

        Ok(job)
    }

    /// Wait for the worker to finish after the shutdown signal
    pub async fn join(&self) {
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Delivery queue worker failed");
            }
        }
    }
}

/// Earliest send time for a job; rejects delays that do not fit a timestamp
fn run_at(enqueued_at: DateTime<Utc>, delay_ms: Option<u64>) -> Result<DateTime<Utc>, QueueError> {
    let Some(delay_ms) = delay_ms else {
        return Ok(enqueued_at);
    };

    i64::try_from(delay_ms)
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .and_then(|delay| enqueued_at.checked_add_signed(delay))
        .ok_or(QueueError::InvalidDelay { delay_ms })
}

struct QueueWorker {
    rx: mpsc::Receiver<QueuedJob>,
    manager: Arc<NotificationManager>,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    shutdown: broadcast::Receiver<()>,
    /// Flipped on shutdown; delayed and waiting jobs give up when it is set
    stopping: watch::Sender<bool>,
}

impl QueueWorker {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Delivery queue received shutdown signal");
                    break;
                }
                queued = self.rx.recv() => match queued {
                    Some(queued) => self.start(queued),
                    None => break,
                },
            }
        }

        self.stopping.send_replace(true);
        self.rx.close();
        let dropped = std::iter::from_fn(|| self.rx.try_recv().ok()).count();
        for _ in 0..dropped {
            QueueMetrics::record_processed("dropped");
        }

        // Wait for jobs already sending
        let _ = self
            .semaphore
            .acquire_many(self.max_concurrency as u32)
            .await;

        tracing::info!(dropped, "Delivery queue stopped");
    }

    fn start(&self, queued: QueuedJob) {
        let manager = self.manager.clone();
        let semaphore = self.semaphore.clone();
        let stopping = self.stopping.subscribe();
        let delay = queued
            .job
            .config
            .delay_ms
            .filter(|d| *d > 0)
            .map(Duration::from_millis);

        tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = stopped(stopping) => None,
                permit = acquire_after(semaphore, delay) => permit.ok(),
            };

            let Some(_permit) = permit else {
                QueueMetrics::record_processed("dropped");
                tracing::debug!(
                    job_id = %queued.job.id,
                    notification_id = %queued.job.notification_id,
                    "Queued job dropped at shutdown"
                );
                return;
            };

            run_job(&manager, queued).await;
        });
    }
}

/// Resolves once shutdown has begun
async fn stopped(mut stopping: watch::Receiver<bool>) {
    while !*stopping.borrow_and_update() {
        if stopping.changed().await.is_err() {
            return;
        }
    }
}

/// Wait out the job delay, then take a concurrency slot
async fn acquire_after(
    semaphore: Arc<Semaphore>,
    delay: Option<Duration>,
) -> Result<OwnedSemaphorePermit, AcquireError> {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    semaphore.acquire_owned().await
}

async fn run_job(manager: &NotificationManager, queued: QueuedJob) {
    let QueuedJob {
        job,
        notification,
        routing,
    } = queued;

    match manager
        .send(&notification, &routing, job.config.strategy)
        .await
    {
        Ok(result) => {
            QueueMetrics::record_processed(result.status.as_str());
            tracing::info!(
                job_id = %job.id,
                notification_id = %job.notification_id,
                status = %result.status.as_str(),
                "Queued job processed"
            );
        }
        Err(e) => {
            QueueMetrics::record_processed("error");
            tracing::error!(
                job_id = %job.id,
                notification_id = %job.notification_id,
                error = %e,
                "Queued job failed"
            );
        }
    }
}
