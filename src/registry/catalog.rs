use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::driver::{DriverFactory, LogDriverFactory, MapperFactory};
use crate::error::ConfigurationError;

/// Named driver and mapper factories that channel configuration can refer to
#[derive(Clone, Default)]
pub struct DriverCatalog {
    drivers: HashMap<String, Arc<dyn DriverFactory>>,
    mappers: HashMap<String, MapperFactory>,
}

impl DriverCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the drivers shipped in this crate (`log`)
    pub fn with_builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register_driver("log", Arc::new(LogDriverFactory));
        catalog
    }

    pub fn register_driver(&mut self, name: &str, factory: Arc<dyn DriverFactory>) -> &mut Self {
        self.drivers.insert(name.to_lowercase(), factory);
        self
    }

    pub fn register_mapper(&mut self, name: &str, factory: MapperFactory) -> &mut Self {
        self.mappers.insert(name.to_lowercase(), factory);
        self
    }

    pub fn driver(&self, name: &str) -> Result<Arc<dyn DriverFactory>, ConfigurationError> {
        self.drivers
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownDriver(name.to_string()))
    }

    pub fn mapper(&self, name: &str) -> Result<MapperFactory, ConfigurationError> {
        self.mappers
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownMapper(name.to_string()))
    }

    pub fn driver_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for DriverCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverCatalog")
            .field("drivers", &self.driver_names())
            .field("mappers", &self.mappers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::driver::{FnMapper, MappingError, MessageMapper};

    #[test]
    fn test_builtin_catalog_has_log_driver() {
        let catalog = DriverCatalog::with_builtin();
        assert_eq!(catalog.driver_names(), vec!["log"]);

        let driver = catalog.driver("LOG").unwrap().create(&Value::Null).unwrap();
        assert_eq!(driver.name(), "log");
    }

    #[test]
    fn test_unknown_names_are_errors() {
        let catalog = DriverCatalog::new();
        assert!(matches!(
            catalog.driver("smtp"),
            Err(ConfigurationError::UnknownDriver(_))
        ));
        assert!(matches!(
            catalog.mapper("sms"),
            Err(ConfigurationError::UnknownMapper(_))
        ));
    }

    #[test]
    fn test_registered_mapper_resolves() {
        let mut catalog = DriverCatalog::new();
        let factory: MapperFactory =
            Arc::new(|| -> Result<Arc<dyn MessageMapper>, MappingError> {
                Ok(Arc::new(FnMapper::new(|message: &Value| {
                    Ok(json!({ "text": message["body"] }))
                })))
            });
        catalog.register_mapper("sms-text", factory);

        let mapper = catalog.mapper("sms-text").unwrap()().unwrap();
        assert_eq!(
            mapper.map(&json!({"body": "hi"})).unwrap(),
            json!({"text": "hi"})
        );
    }
}
