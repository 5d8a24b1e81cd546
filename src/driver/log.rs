//! Built-in driver that writes deliveries to the tracing log

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ConfigurationError;

use super::{DeliveryRequest, Driver, DriverFactory, SendError, SendResult};

/// Configuration accepted by [`LogDriverFactory`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogDriverConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Transport kind reported by the driver
    #[serde(default)]
    pub channel_type: Option<String>,
}

/// Driver that logs every delivery and reports success.
///
/// Useful for development deployments and as a last-resort fallback adapter.
#[derive(Debug, Clone)]
pub struct LogDriver {
    name: String,
    channel_type: String,
}

impl LogDriver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel_type: "log".to_string(),
        }
    }

    pub fn with_channel_type(mut self, channel_type: impl Into<String>) -> Self {
        self.channel_type = channel_type.into();
        self
    }
}

#[async_trait]
impl Driver for LogDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        &self.channel_type
    }

    async fn send(&self, request: &DeliveryRequest) -> Result<SendResult, SendError> {
        tracing::info!(
            driver = %self.name,
            channel = %request.channel,
            notification_id = %request.notification_id,
            recipient = %request.recipient,
            message = %request.message,
            "Delivered notification to log"
        );

        Ok(SendResult::success(Some(json!({
            "driver": self.name,
            "channel": request.channel,
            "logged": true,
        }))))
    }
}

/// Factory registered under the `log` driver name
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDriverFactory;

impl DriverFactory for LogDriverFactory {
    fn create(&self, config: &Value) -> Result<Arc<dyn Driver>, ConfigurationError> {
        let config: LogDriverConfig = if config.is_null() {
            LogDriverConfig::default()
        } else {
            serde_json::from_value(config.clone()).map_err(|e| {
                ConfigurationError::InvalidDriver {
                    name: "log".to_string(),
                    reason: e.to_string(),
                }
            })?
        };

        let mut driver = LogDriver::new(config.name.unwrap_or_else(|| "log".to_string()));
        if let Some(channel_type) = config.channel_type {
            driver = driver.with_channel_type(channel_type);
        }

        Ok(Arc::new(driver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::request;
    use crate::driver::SendStatus;

    #[tokio::test]
    async fn test_log_driver_succeeds() {
        let driver = LogDriver::new("dev-log");
        let result = driver.send(&request("email")).await.unwrap();

        assert_eq!(result.status, SendStatus::Success);
        assert_eq!(result.response.unwrap()["driver"], "dev-log");
    }

    #[test]
    fn test_factory_reads_config() {
        let driver = LogDriverFactory
            .create(&json!({"name": "sms-log", "channel_type": "sms"}))
            .unwrap();

        assert_eq!(driver.name(), "sms-log");
        assert_eq!(driver.channel_type(), "sms");
    }

    #[test]
    fn test_factory_rejects_invalid_config() {
        let result = LogDriverFactory.create(&json!({"name": 42}));
        assert!(matches!(result, Err(ConfigurationError::InvalidDriver { .. })));
    }
}
