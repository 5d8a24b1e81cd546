use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::driver::SendError;
use crate::notification::NotificationResult;
use crate::queue::QueueError;

/// Wiring and resolution failures. Raised before any driver is contacted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Channel '{0}' is not registered")]
    UnregisteredChannel(String),

    #[error("Driver for channel '{0}' is not ready")]
    DriverNotReady(String),

    #[error("Driver entry '{name}' must have exactly one driver source")]
    AmbiguousEntry { name: String },

    #[error("Invalid driver '{name}': {reason}")]
    InvalidDriver { name: String, reason: String },

    #[error("Mapper for '{name}' could not be instantiated: {reason}")]
    MapperInstantiation { name: String, reason: String },

    #[error("Unknown driver '{0}'")]
    UnknownDriver(String),

    #[error("Unknown mapper '{0}'")]
    UnknownMapper(String),

    #[error("Composite driver '{0}' has no enabled drivers")]
    NoEnabledDrivers(String),

    #[error("Invalid notification: {0}")]
    InvalidNotification(String),
}

/// Failure of a whole notification delivery
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// All-or-nothing delivery stopped at the first failing channel
    #[error("Delivery aborted on channel '{channel}': {source}")]
    Aborted {
        channel: String,
        source: SendError,
        partial: Box<NotificationResult>,
    },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

fn hidden(log_msg: &str, generic: &str) -> String {
    if is_production() {
        generic.to_string()
    } else {
        log_msg.to_string()
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String, String) {
        match self {
            AppError::Config(e) => {
                let log_msg = e.to_string();
                let client_msg = hidden(&log_msg, "Configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", client_msg, log_msg)
            }
            AppError::Auth(msg) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Internal(e) => {
                let client_msg = hidden(e, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", client_msg, e.clone())
            }
            AppError::Configuration(e) | AppError::Delivery(DeliveryError::Configuration(e)) => {
                let msg = e.to_string();
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "CONFIGURATION_ERROR",
                    msg.clone(),
                    msg,
                )
            }
            AppError::Delivery(e @ DeliveryError::Aborted { .. }) => {
                let log_msg = e.to_string();
                let client_msg = hidden(&log_msg, "Delivery failed");
                (StatusCode::BAD_GATEWAY, "DELIVERY_FAILED", client_msg, log_msg)
            }
            AppError::Queue(e @ QueueError::InvalidDelay { .. }) => {
                let msg = e.to_string();
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), msg)
            }
            AppError::Queue(e) => {
                let msg = e.to_string();
                (StatusCode::SERVICE_UNAVAILABLE, "QUEUE_UNAVAILABLE", msg.clone(), msg)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, client_message, log_message) = self.parts();

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "API error"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_maps_to_unprocessable() {
        let error = AppError::from(ConfigurationError::UnregisteredChannel("fax".into()));
        let (status, code, message, _) = error.parts();

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(code, "CONFIGURATION_ERROR");
        assert_eq!(message, "Channel 'fax' is not registered");
    }

    #[test]
    fn test_wrapped_configuration_error_keeps_status() {
        let error = AppError::from(DeliveryError::from(ConfigurationError::DriverNotReady(
            "sms".into(),
        )));
        assert_eq!(error.parts().0, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_invalid_job_delay_is_validation_error() {
        let error = AppError::from(QueueError::InvalidDelay { delay_ms: u64::MAX });
        let (status, code, _, _) = error.parts();

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "VALIDATION_ERROR");
        assert_eq!(
            AppError::from(QueueError::Closed).parts().0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_validation_response_status() {
        let response = AppError::Validation("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
