//! Driver entries: one configured driver plus its selection metadata

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::ConfigurationError;
use crate::retry::RetryConfig;

use super::{DeliveryRequest, Driver, DriverFactory, MappingError, MessageMapper, SendError};

/// Zero-argument constructor for a mapper
pub type MapperFactory =
    Arc<dyn Fn() -> Result<Arc<dyn MessageMapper>, MappingError> + Send + Sync>;

/// Where a driver entry gets its driver from
#[derive(Clone)]
pub enum DriverSource {
    /// A ready driver instance
    Instance(Arc<dyn Driver>),
    /// A factory instantiated with the given configuration when the entry is built
    Factory {
        factory: Arc<dyn DriverFactory>,
        config: Value,
    },
}

/// Where a driver entry gets its message mapper from
#[derive(Clone)]
pub enum MapperSource {
    Instance(Arc<dyn MessageMapper>),
    Factory(MapperFactory),
}

impl MapperSource {
    fn resolve(self, entry: &str) -> Result<Arc<dyn MessageMapper>, ConfigurationError> {
        match self {
            MapperSource::Instance(mapper) => Ok(mapper),
            MapperSource::Factory(factory) => {
                factory().map_err(|e| ConfigurationError::MapperInstantiation {
                    name: entry.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// A resolved driver together with priority, weight, retry, mapper, and timeout settings.
///
/// Immutable once built; the driver is always present.
#[derive(Clone)]
pub struct DriverEntry {
    name: String,
    driver: Arc<dyn Driver>,
    priority: i32,
    weight: Option<u32>,
    retry: Option<RetryConfig>,
    mapper: Option<Arc<dyn MessageMapper>>,
    timeout: Option<Duration>,
    enabled: bool,
}

impl DriverEntry {
    /// Start building an entry with the given name
    pub fn builder(name: impl Into<String>) -> DriverEntryBuilder {
        DriverEntryBuilder::new(name)
    }

    /// Entry for a ready driver with default settings, named after the driver
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            name: driver.name().to_string(),
            driver,
            priority: 0,
            weight: None,
            retry: None,
            mapper: None,
            timeout: None,
            enabled: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn weight(&self) -> Option<u32> {
        self.weight
    }

    /// Per-entry retry override
    pub fn retry(&self) -> Option<&RetryConfig> {
        self.retry.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn has_mapper(&self) -> bool {
        self.mapper.is_some()
    }

    /// Apply this entry's mapper to the request message, if one is configured
    pub fn map_request<'a>(
        &self,
        request: &'a DeliveryRequest,
    ) -> Result<Cow<'a, DeliveryRequest>, SendError> {
        let Some(mapper) = &self.mapper else {
            return Ok(Cow::Borrowed(request));
        };

        let message = mapper
            .map(&request.message)
            .map_err(|e| SendError::Mapping {
                driver: self.name.clone(),
                message: e.to_string(),
            })?;

        Ok(Cow::Owned(request.with_message(message)))
    }
}

impl fmt::Debug for DriverEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverEntry")
            .field("name", &self.name)
            .field("driver", &self.driver.name())
            .field("priority", &self.priority)
            .field("weight", &self.weight)
            .field("retry", &self.retry)
            .field("mapper", &self.mapper.is_some())
            .field("timeout", &self.timeout)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Builder for [`DriverEntry`].
///
/// Exactly one of [`instance`](Self::instance) or [`factory`](Self::factory) must be
/// supplied; [`build`](Self::build) rejects anything else.
pub struct DriverEntryBuilder {
    name: String,
    instance: Option<Arc<dyn Driver>>,
    factory: Option<(Arc<dyn DriverFactory>, Value)>,
    priority: i32,
    weight: Option<u32>,
    retry: Option<RetryConfig>,
    mapper: Option<MapperSource>,
    timeout: Option<Duration>,
    enabled: bool,
}

impl DriverEntryBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: None,
            factory: None,
            priority: 0,
            weight: None,
            retry: None,
            mapper: None,
            timeout: None,
            enabled: true,
        }
    }

    /// Use a ready driver instance
    pub fn instance(mut self, driver: Arc<dyn Driver>) -> Self {
        self.instance = Some(driver);
        self
    }

    /// Instantiate the driver from a factory and its configuration
    pub fn factory(mut self, factory: Arc<dyn DriverFactory>, config: Value) -> Self {
        self.factory = Some((factory, config));
        self
    }

    pub fn source(self, source: DriverSource) -> Self {
        match source {
            DriverSource::Instance(driver) => self.instance(driver),
            DriverSource::Factory { factory, config } => self.factory(factory, config),
        }
    }

    /// Higher priority drivers are tried first
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Relative weight for random selection
    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn mapper(mut self, mapper: MapperSource) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Per-attempt deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn build(self) -> Result<DriverEntry, ConfigurationError> {
        let driver = match (self.instance, self.factory) {
            (Some(driver), None) => driver,
            (None, Some((factory, config))) => factory.create(&config)?,
            _ => return Err(ConfigurationError::AmbiguousEntry { name: self.name }),
        };

        let mapper = self
            .mapper
            .map(|source| source.resolve(&self.name))
            .transpose()?;

        Ok(DriverEntry {
            name: self.name,
            driver,
            priority: self.priority,
            weight: self.weight,
            retry: self.retry,
            mapper,
            timeout: self.timeout,
            enabled: self.enabled,
        })
    }
}
