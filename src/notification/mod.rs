//! Notifications, recipient routing, and the delivery orchestrator.
//!
//! A [`Notification`] declares its channels together with one content builder per
//! channel. [`NotificationManager::send`] turns it into one [`DeliveryRequest`] per
//! routed channel, resolves each channel's driver through the
//! [`DriverRegistry`](crate::registry::DriverRegistry), and merges the outcomes under a
//! [`DeliveryStrategy`].
//!
//! [`DeliveryRequest`]: crate::driver::DeliveryRequest

mod manager;
mod request;
mod types;

pub use manager::NotificationManager;
pub use request::RequestBuilder;
pub use types::{
    ContentBuilder, DeliveryStatus, DeliveryStrategy, Notifiable, Notification,
    NotificationBuilder, NotificationResult, NotificationSummary, Priority, RoutingMap,
};
