//! Error types for wirebus
//!
//! Every failure a caller of the bus client can observe is one of the
//! variants of [`Error`]. Transport-level failures (socket resets, handshake
//! errors, I/O) never escape raw: they are logged where they happen and
//! converted into one of these kinds, so presentation code only ever sees
//! connection-state transitions and per-call error kinds.
//!
//! # Error Categories
//!
//! - **Recoverable**: `NotConnected`, `RequestTimeout`, `ConnectionLost`,
//!   `StreamAborted`. The caller may retry once the connection is back.
//! - **Terminal**: `MaxReconnectAttemptsExceeded`. The client stops
//!   reconnecting until it is explicitly reopened.
//! - **Local**: `Cancelled`, `MalformedFrame`, `DuplicateRequestId`,
//!   `Serialization`, `InvalidEndpoint`, `Config`, `Internal`.
//!
//! # Examples
//!
//! ```rust
//! use wirebus_core::Error;
//!
//! let error = Error::NotConnected;
//! assert!(error.is_recoverable());
//! assert_eq!(error.kind(), "not_connected");
//!
//! let terminal = Error::MaxReconnectAttemptsExceeded { attempts: 10 };
//! assert!(!terminal.is_recoverable());
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type for wirebus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for wirebus operations
///
/// The enum is `Clone` because a single connection-level failure is fanned
/// out to every waiter it affects (all pending requests, all open streams).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A send was attempted while the connection is not `Connected`
    #[error("Not connected")]
    NotConnected,

    /// No response with a matching id arrived before the deadline
    #[error("Request {id} timed out after {timeout:?}")]
    RequestTimeout {
        /// Correlation id of the request that timed out
        id: String,
        /// The timeout the caller supplied
        timeout: Duration,
    },

    /// The connection dropped while a request was waiting for its response
    #[error("Connection lost")]
    ConnectionLost,

    /// The connection dropped before the server completed the stream
    #[error("Stream aborted before completion")]
    StreamAborted,

    /// The reconnection budget is exhausted
    ///
    /// Terminal for the client until `connect()` is called again.
    #[error("Maximum reconnect attempts exceeded after {attempts} consecutive failures")]
    MaxReconnectAttemptsExceeded {
        /// Consecutive failed connection attempts
        attempts: u32,
    },

    /// The caller cancelled a pending request
    #[error("Request cancelled")]
    Cancelled,

    /// An inbound frame was not JSON or had no string `type`
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// A request id was registered while another request with the same id
    /// is still outstanding
    #[error("Duplicate request id: {0}")]
    DuplicateRequestId(String),

    /// Serialization or deserialization of a payload failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The endpoint resolver produced an unusable URL, or the credentials
    /// could not be attached to the handshake
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Client configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short, stable label for this error kind
    ///
    /// Used as the `error_type` attribute on metrics and as a structured
    /// log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotConnected => "not_connected",
            Error::RequestTimeout { .. } => "request_timeout",
            Error::ConnectionLost => "connection_lost",
            Error::StreamAborted => "stream_aborted",
            Error::MaxReconnectAttemptsExceeded { .. } => "max_reconnect_attempts_exceeded",
            Error::Cancelled => "cancelled",
            Error::MalformedFrame(_) => "malformed_frame",
            Error::DuplicateRequestId(_) => "duplicate_request_id",
            Error::Serialization(_) => "serialization",
            Error::InvalidEndpoint(_) => "invalid_endpoint",
            Error::Config(_) => "config",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether the caller may retry the operation after a reconnect
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NotConnected
                | Error::RequestTimeout { .. }
                | Error::ConnectionLost
                | Error::StreamAborted
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
