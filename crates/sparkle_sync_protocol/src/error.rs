//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The message is not valid JSON or misses required fields.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A change entry does not have the `[table, pkey, state, part]` shape.
    #[error("malformed change: {0}")]
    MalformedChange(String),
}

impl ProtocolError {
    /// Creates a malformed change error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedChange(message.into())
    }
}
