//! Driver registry and channel resolution.
//!
//! Channels are registered in one of two shapes, which may coexist across channels:
//!
//! - **legacy**: one driver (instance or factory + config) per channel
//! - **adapters**: a list of named driver entries per channel, wrapped in a
//!   [`CompositeDriver`] after sorting by declared priority
//!
//! Channel names are case-insensitive. Resolution fails with a
//! [`ConfigurationError`] when a channel is unknown or its driver is not ready.

mod catalog;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;

use crate::composite::{CompositeDriver, SelectionStrategy};
use crate::driver::{Driver, DriverEntry, DriverFactory, MapperSource};
use crate::error::ConfigurationError;
use crate::retry::{RetryConfig, RetryExecutor};

pub use catalog::DriverCatalog;

/// Configuration for one channel
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelConfig {
    /// Legacy single-driver shape: catalog name of the driver
    #[serde(default)]
    pub driver: Option<String>,
    /// Legacy single-driver shape: driver configuration
    #[serde(default)]
    pub config: Value,
    /// Adapter shape: named drivers with priorities
    #[serde(default)]
    pub adapters: Vec<AdapterConfig>,
    /// Adapter shape: selection strategy
    #[serde(default)]
    pub strategy: SelectionStrategy,
}

/// Configuration for one adapter of a multi-adapter channel
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    pub name: String,
    /// Catalog name of the driver
    pub driver: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Per-attempt deadline in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Catalog name of the message mapper
    #[serde(default)]
    pub mapper: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl AdapterConfig {
    fn to_entry(&self, catalog: &DriverCatalog) -> Result<DriverEntry, ConfigurationError> {
        let mut builder = DriverEntry::builder(&self.name)
            .factory(catalog.driver(&self.driver)?, self.config.clone())
            .priority(self.priority)
            .enabled(self.enabled);

        if let Some(weight) = self.weight {
            builder = builder.weight(weight);
        }
        if let Some(retry) = &self.retry {
            builder = builder.retry(retry.clone());
        }
        if let Some(timeout_ms) = self.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(mapper) = &self.mapper {
            builder = builder.mapper(MapperSource::Factory(catalog.mapper(mapper)?));
        }

        builder.build()
    }
}

#[derive(Clone)]
enum Binding {
    Ready(Arc<dyn Driver>),
    Deferred {
        factory: Arc<dyn DriverFactory>,
        config: Value,
    },
}

/// Readiness summary for one registered channel
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChannelStatus {
    pub channel: String,
    pub ready: bool,
}

/// Holds the driver bound to each channel
pub struct DriverRegistry {
    channels: DashMap<String, Binding>,
    executor: RetryExecutor,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new(RetryExecutor::default())
    }
}

fn normalize(channel: &str) -> String {
    channel.trim().to_lowercase()
}

impl DriverRegistry {
    /// Create an empty registry; `executor` drives retries for adapter channels
    pub fn new(executor: RetryExecutor) -> Self {
        Self {
            channels: DashMap::new(),
            executor,
        }
    }

    /// Build a registry from channel configuration
    pub fn from_settings(
        channels: &HashMap<String, ChannelConfig>,
        catalog: &DriverCatalog,
        executor: RetryExecutor,
    ) -> Result<Self, ConfigurationError> {
        let registry = Self::new(executor);

        for (channel, config) in channels {
            if !config.adapters.is_empty() {
                if config.driver.is_some() {
                    tracing::warn!(
                        channel = %channel,
                        "Channel declares both a driver and adapters, using adapters"
                    );
                }
                let entries = config
                    .adapters
                    .iter()
                    .map(|adapter| adapter.to_entry(catalog))
                    .collect::<Result<Vec<_>, _>>()?;
                registry.register_adapters(channel, entries, config.strategy)?;
            } else if let Some(driver) = &config.driver {
                registry.register_factory(channel, catalog.driver(driver)?, config.config.clone());
            } else {
                return Err(ConfigurationError::InvalidDriver {
                    name: channel.clone(),
                    reason: "channel declares neither a driver nor adapters".to_string(),
                });
            }
        }

        Ok(registry)
    }

    /// Bind a ready driver to a channel
    pub fn register_driver(&self, channel: &str, driver: Arc<dyn Driver>) {
        tracing::info!(channel = %channel, driver = %driver.name(), "Registered driver");
        self.channels.insert(normalize(channel), Binding::Ready(driver));
    }

    /// Bind a driver factory to a channel; the driver is created on first resolution
    pub fn register_factory(&self, channel: &str, factory: Arc<dyn DriverFactory>, config: Value) {
        tracing::info!(channel = %channel, "Registered driver factory");
        self.channels
            .insert(normalize(channel), Binding::Deferred { factory, config });
    }

    /// Bind several driver entries to a channel behind a composite driver.
    ///
    /// Entries are ordered by declared priority, highest first; registration order
    /// only breaks ties.
    pub fn register_adapters(
        &self,
        channel: &str,
        mut entries: Vec<DriverEntry>,
        strategy: SelectionStrategy,
    ) -> Result<Arc<CompositeDriver>, ConfigurationError> {
        entries.sort_by(|a, b| b.priority().cmp(&a.priority()));

        let composite = Arc::new(CompositeDriver::new(
            normalize(channel),
            entries,
            strategy,
            self.executor.clone(),
        )?);
        self.channels
            .insert(normalize(channel), Binding::Ready(composite.clone()));

        Ok(composite)
    }

    /// Resolve the driver bound to a channel.
    ///
    /// Deferred factories run without any registry lock held, so a factory may call
    /// back into the registry.
    pub fn resolve(&self, channel: &str) -> Result<Arc<dyn Driver>, ConfigurationError> {
        let key = normalize(channel);
        let binding = self
            .channels
            .get(&key)
            .map(|b| b.value().clone())
            .ok_or_else(|| ConfigurationError::UnregisteredChannel(key.clone()))?;

        let driver = match binding {
            Binding::Ready(driver) => driver,
            Binding::Deferred { factory, config } => self.instantiate(&key, &factory, &config)?,
        };

        if !driver.is_ready() {
            return Err(ConfigurationError::DriverNotReady(key));
        }

        Ok(driver)
    }

    fn instantiate(
        &self,
        key: &str,
        factory: &Arc<dyn DriverFactory>,
        config: &Value,
    ) -> Result<Arc<dyn Driver>, ConfigurationError> {
        let created = factory.create(config)?;

        // A concurrent resolve may have won; keep whichever driver landed first
        let mut winner = created.clone();
        self.channels.entry(key.to_string()).and_modify(|binding| {
            let replace = match &*binding {
                Binding::Ready(existing) => {
                    winner = existing.clone();
                    false
                }
                // Skip if the channel was re-registered while we were instantiating
                Binding::Deferred { factory: current, .. } => Arc::ptr_eq(current, factory),
            };
            if replace {
                *binding = Binding::Ready(created.clone());
            }
        });

        tracing::debug!(channel = %key, driver = %winner.name(), "Instantiated driver");
        Ok(winner)
    }

    /// Whether a channel resolves to a driver that is ready to send
    pub fn is_ready(&self, channel: &str) -> bool {
        self.resolve(channel).is_ok()
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(&normalize(channel))
    }

    /// Registered channel names, sorted
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Readiness of every registered channel
    pub fn status(&self) -> Vec<ChannelStatus> {
        self.channels()
            .into_iter()
            .map(|channel| ChannelStatus {
                ready: self.is_ready(&channel),
                channel,
            })
            .collect()
    }
}
