use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("invalid arguments for {operation}: {message}")]
    InvalidArguments { operation: String, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Backend(String),
    #[error("background task failed: {0}")]
    Join(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        GatewayError::Backend(format!("{err:#}"))
    }
}

/// The single remote-procedure boundary: a named operation with positional JSON arguments.
///
/// Implementations must return `Err` on failure rather than a sentinel value.
/// Calls are independent of each other, so one gateway can serve many controllers.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn invoke(&self, operation: &str, args: Vec<Value>) -> Result<Value, GatewayError>;
}
