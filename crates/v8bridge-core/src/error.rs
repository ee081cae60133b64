//! Bridge error types.

use thiserror::Error;
use v8bridge_protocol::{ProtocolError, ScriptId};

/// Errors from bridge and transport operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Framing or message-level protocol failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    /// The debuggee answered with `success: false`.
    #[error("debugger rejected {command}: {message}")]
    Rejected {
        /// The rejected command.
        command: String,
        /// The debuggee's explanation.
        message: String,
    },

    /// No reply arrived within the configured deadline.
    #[error("request timed out: {command}")]
    Timeout {
        /// The command that timed out.
        command: String,
    },

    /// The connection closed while a request was outstanding.
    #[error("debugger connection closed")]
    Disconnected,

    /// The session has been detached.
    #[error("session detached")]
    Detached,

    /// A single-script lookup returned nothing.
    #[error("script not found: {0}")]
    ScriptNotFound(ScriptId),

    /// A handle lookup did not return the requested handle.
    #[error("unknown handle: {0}")]
    UnknownHandle(i64),

    /// No breakpoint with this id exists in the session.
    #[error("unknown breakpoint: {0}")]
    UnknownBreakpoint(i64),

    /// A reply body did not have the expected shape.
    #[error("debugger sent invalid response: {0}")]
    InvalidResponse(String),
}
