//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    CHANNEL_DELIVERIES_TOTAL, CHANNEL_DELIVERY_LATENCY, COMPOSITE_FALLBACKS_TOTAL,
    DRIVER_ATTEMPTS_TOTAL, DRIVER_RETRIES_TOTAL, EVENTS_DISPATCHED_TOTAL,
    LISTENER_FAILURES_TOTAL, NOTIFICATIONS_TOTAL, QUEUE_ENQUEUED_TOTAL, QUEUE_IN_FLIGHT,
    QUEUE_PROCESSED_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording notification and channel outcomes
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    /// Record the overall status of one send
    pub fn record_notification(status: &str) {
        NOTIFICATIONS_TOTAL.with_label_values(&[status]).inc();
    }

    /// Record one channel delivery and its latency
    pub fn record_channel(channel: &str, outcome: &str, elapsed: Duration) {
        CHANNEL_DELIVERIES_TOTAL
            .with_label_values(&[channel, outcome])
            .inc();
        CHANNEL_DELIVERY_LATENCY
            .with_label_values(&[channel])
            .observe(elapsed.as_secs_f64());
    }

    /// Record a channel skipped for lack of routing data
    pub fn record_skipped(channel: &str) {
        CHANNEL_DELIVERIES_TOTAL
            .with_label_values(&[channel, "skipped"])
            .inc();
    }
}

/// Helper struct for recording driver metrics
pub struct DriverMetrics;

impl DriverMetrics {
    /// Record one send attempt
    pub fn record_attempt(driver: &str, outcome: &str) {
        DRIVER_ATTEMPTS_TOTAL
            .with_label_values(&[driver, outcome])
            .inc();
    }

    /// Record a retry about to be scheduled
    pub fn record_retry(driver: &str) {
        DRIVER_RETRIES_TOTAL.with_label_values(&[driver]).inc();
    }

    /// Record a composite send delivered by a fallback driver
    pub fn record_fallback(composite: &str) {
        COMPOSITE_FALLBACKS_TOTAL
            .with_label_values(&[composite])
            .inc();
    }
}

/// Helper struct for recording event listener metrics
pub struct ListenerMetrics;

impl ListenerMetrics {
    pub fn record_dispatched(kind: &str) {
        EVENTS_DISPATCHED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn record_failure(kind: &str) {
        LISTENER_FAILURES_TOTAL.with_label_values(&[kind]).inc();
    }
}

/// Helper struct for recording delivery queue metrics
pub struct QueueMetrics;

impl QueueMetrics {
    pub fn record_enqueued() {
        QUEUE_ENQUEUED_TOTAL.with_label_values(&["accepted"]).inc();
        QUEUE_IN_FLIGHT.inc();
    }

    pub fn record_rejected() {
        QUEUE_ENQUEUED_TOTAL.with_label_values(&["rejected"]).inc();
    }

    /// Record a finished job
    pub fn record_processed(result: &str) {
        QUEUE_PROCESSED_TOTAL.with_label_values(&[result]).inc();
        QUEUE_IN_FLIGHT.dec();
    }
}
