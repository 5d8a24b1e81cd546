//! Prometheus metrics for the delivery engine.
//!
//! This module provides metrics for monitoring notification delivery:
//! - Notification metrics (overall outcome per send)
//! - Channel metrics (per-channel outcome and latency)
//! - Driver metrics (attempts, retries, composite fallbacks)
//! - Listener and queue metrics

mod helpers;

pub use helpers::{encode_metrics, DeliveryMetrics, DriverMetrics, ListenerMetrics, QueueMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "ara";

lazy_static! {
    // ============================================================================
    // Notification Metrics
    // ============================================================================

    /// Notifications processed, by overall status
    pub static ref NOTIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_total", METRIC_PREFIX),
        "Total notifications processed by overall status",
        &["status"]
    ).unwrap();

    /// Per-channel delivery outcomes
    pub static ref CHANNEL_DELIVERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_channel_deliveries_total", METRIC_PREFIX),
        "Total channel deliveries by channel and outcome",
        &["channel", "outcome"]
    ).unwrap();

    /// Per-channel delivery latency, including retries and fallbacks
    pub static ref CHANNEL_DELIVERY_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_channel_delivery_latency_seconds", METRIC_PREFIX),
        "Channel delivery latency in seconds",
        &["channel"],
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    // ============================================================================
    // Driver Metrics
    // ============================================================================

    /// Driver attempts by outcome
    pub static ref DRIVER_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_driver_attempts_total", METRIC_PREFIX),
        "Total driver send attempts by driver and outcome",
        &["driver", "outcome"]
    ).unwrap();

    /// Retries scheduled after a retryable failure
    pub static ref DRIVER_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_driver_retries_total", METRIC_PREFIX),
        "Total driver retries",
        &["driver"]
    ).unwrap();

    /// Composite sends that succeeded on a non-primary driver
    pub static ref COMPOSITE_FALLBACKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_composite_fallbacks_total", METRIC_PREFIX),
        "Total composite sends delivered by a fallback driver",
        &["composite"]
    ).unwrap();

    // ============================================================================
    // Listener Metrics
    // ============================================================================

    /// Events dispatched, by kind
    pub static ref EVENTS_DISPATCHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_dispatched_total", METRIC_PREFIX),
        "Total delivery events dispatched",
        &["kind"]
    ).unwrap();

    /// Listener errors and panics
    pub static ref LISTENER_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_listener_failures_total", METRIC_PREFIX),
        "Total event listener failures",
        &["kind"]
    ).unwrap();

    // ============================================================================
    // Queue Metrics
    // ============================================================================

    /// Jobs accepted by the delivery queue
    pub static ref QUEUE_ENQUEUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_queue_enqueued_total", METRIC_PREFIX),
        "Total jobs accepted or rejected by the delivery queue",
        &["result"]
    ).unwrap();

    /// Jobs processed by the queue worker
    pub static ref QUEUE_PROCESSED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_queue_processed_total", METRIC_PREFIX),
        "Total jobs processed by the delivery queue",
        &["result"]
    ).unwrap();

    /// Jobs waiting or running
    pub static ref QUEUE_IN_FLIGHT: IntGauge = register_int_gauge!(
        format!("{}_queue_in_flight", METRIC_PREFIX),
        "Number of queued jobs not yet finished"
    ).unwrap();
}
