//! Multi-channel notification delivery engine.
//!
//! Channels resolve to drivers through a [`registry::DriverRegistry`]; a channel with
//! several adapters is served by a [`composite::CompositeDriver`] that selects, retries
//! and falls back between them. [`notification::NotificationManager`] builds one request
//! per channel and merges the outcomes under the chosen delivery strategy.

// Delivery core
pub mod composite;
pub mod driver;
pub mod notification;
pub mod registry;
pub mod retry;

// Collaborators
pub mod events;
pub mod history;
pub mod queue;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;
