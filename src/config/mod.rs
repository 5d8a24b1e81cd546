mod settings;

pub use settings::{
    ApiConfig, DeliveryConfig, HistoryConfig, OtelConfig, ServerConfig, Settings,
};

pub use crate::queue::QueueConfig;
pub use crate::registry::{AdapterConfig, ChannelConfig};
