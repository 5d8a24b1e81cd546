//! Transforms from the caller's unified message shape to a driver-specific shape

use serde_json::Value;
use thiserror::Error;

/// Error raised when a message cannot be mapped for a driver
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct MappingError(pub String);

impl MappingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Per-driver message transform.
///
/// Applied once per sub-driver selection; every retry of that sub-driver reuses the
/// mapped message.
pub trait MessageMapper: Send + Sync {
    fn map(&self, message: &Value) -> Result<Value, MappingError>;
}

/// Adapts a closure into a [`MessageMapper`]
pub struct FnMapper<F>(F);

impl<F> FnMapper<F>
where
    F: Fn(&Value) -> Result<Value, MappingError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> MessageMapper for FnMapper<F>
where
    F: Fn(&Value) -> Result<Value, MappingError> + Send + Sync,
{
    fn map(&self, message: &Value) -> Result<Value, MappingError> {
        (self.0)(message)
    }
}
