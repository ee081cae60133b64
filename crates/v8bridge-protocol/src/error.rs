//! Protocol error types.

use thiserror::Error;

/// Errors from framing or interpreting V8 debugger messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The byte stream does not follow the `Content-Length` framing.
    #[error("framing error: {0}")]
    Framing(String),

    /// A frame body is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A well-formed JSON message that is not a response or an event.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
