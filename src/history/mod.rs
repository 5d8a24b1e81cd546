//! Delivery history: post-hoc records of channel outcomes.
//!
//! Not consulted by the delivery path; fed by [`crate::events::HistoryListener`].

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::driver::SendStatus;

/// Outcome of one channel of one notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub notification_id: Uuid,
    /// Notification type
    pub kind: String,
    pub channel: String,
    pub status: SendStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl DeliveryRecord {
    pub fn new(
        notification_id: Uuid,
        kind: impl Into<String>,
        channel: impl Into<String>,
        status: SendStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            notification_id,
            kind: kind.into(),
            channel: channel.into(),
            status,
            error,
            recorded_at: Utc::now(),
        }
    }
}

/// Storage for delivery records
#[async_trait]
pub trait DeliveryLogStore: Send + Sync {
    async fn append(&self, record: DeliveryRecord) -> anyhow::Result<()>;

    /// Most recent records first
    async fn recent(&self, limit: usize) -> Vec<DeliveryRecord>;

    /// Records for one notification, most recent first
    async fn for_notification(&self, notification_id: Uuid) -> Vec<DeliveryRecord>;
}

/// Bounded in-memory log; the oldest records are evicted first
#[derive(Debug)]
pub struct MemoryDeliveryLog {
    records: RwLock<VecDeque<DeliveryRecord>>,
    capacity: usize,
}

impl MemoryDeliveryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl DeliveryLogStore for MemoryDeliveryLog {
    async fn append(&self, record: DeliveryRecord) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        records.push_front(record);
        records.truncate(self.capacity);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Vec<DeliveryRecord> {
        self.records
            .read()
            .await
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    async fn for_notification(&self, notification_id: Uuid) -> Vec<DeliveryRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.notification_id == notification_id)
            .cloned()
            .collect()
    }
}
