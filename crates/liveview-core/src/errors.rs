//! Error types for the session runtime.
//!
//! None of these are fatal to the process: protocol faults drop one frame,
//! handler faults drop one event, query faults are returned to the caller and
//! session faults close one connection.

use thiserror::Error;

use crate::ids::SessionId;

/// A client frame that could not be decoded into a known message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON or did not match any message shape.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The frame had no string `type` field.
    #[error("frame has no type field")]
    MissingType,
    /// The frame carried a `type` this runtime does not handle.
    #[error("unsupported frame type: {0}")]
    UnsupportedType(String),
}

/// Failure raised by an application event handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The component has no handler for the named event.
    #[error("component has no handler for event '{0}'")]
    UnknownEvent(String),
    /// The payload did not have the shape the handler expects.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// The handler's own logic failed.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Convenience constructor for application failures.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Outcome of a server-initiated query that produced no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The session was torn down before the client answered.
    #[error("session torn down before the client answered")]
    TornDown,
    /// The client did not answer within the configured timeout.
    #[error("client did not answer within {timeout_ms}ms")]
    Timeout {
        /// Configured wait in milliseconds.
        timeout_ms: u64,
    },
    /// The session is no longer running, so no request was sent.
    #[error("session is not running")]
    NotRunning,
    /// The request frame could not be handed to the writer.
    #[error("failed to send query request to client")]
    SendFailed,
}

/// Session lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Another live session already holds this identifier.
    #[error("session '{0}' is already registered")]
    DuplicateId(SessionId),
    /// The session has started (or finished) tearing down.
    #[error("session '{0}' is not running")]
    NotRunning(SessionId),
}

/// Result type for session lifecycle operations.
pub type Result<T> = std::result::Result<T, SessionError>;
