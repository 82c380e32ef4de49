//! Error types for bus transport and protocol failures.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by bus connections and protocol helpers.
#[derive(Debug, Error, Clone)]
pub enum BusError {
    /// The connection has not been established yet.
    #[error("bus connection is not available yet")]
    NotConnected,

    /// The peer closed the connection.
    #[error("bus connection closed by peer")]
    Disconnected,

    /// An I/O error occurred on the underlying stream.
    #[error("bus I/O error: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// A wire message could not be parsed.
    #[error("malformed bus message: {message}")]
    MalformedMessage {
        /// Description of the parse failure.
        message: String,
    },

    /// A message could not be serialized for sending.
    #[error("failed to serialize bus message: {message}")]
    Serialize {
        /// Description of the serialization failure.
        message: String,
    },

    /// No reply arrived within the caller-supplied timeout.
    #[error("bus call timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// A method call named a method the peer does not implement.
    #[error("unknown bus method '{method}'")]
    UnknownMethod {
        /// Method name from the call.
        method: String,
    },

    /// The peer rejected the identity announcement.
    #[error("identity announcement rejected: {message}")]
    AnnounceRejected {
        /// Error text returned by the peer.
        message: String,
    },
}

impl BusError {
    /// Wraps an I/O error.
    #[must_use]
    pub fn io(source: io::Error) -> Self {
        Self::Io {
            source: Arc::new(source),
        }
    }

    /// Creates a malformed-message error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedMessage {
            message: message.into(),
        }
    }
}

impl From<io::Error> for BusError {
    fn from(source: io::Error) -> Self {
        Self::io(source)
    }
}

impl From<serde_json::Error> for BusError {
    fn from(source: serde_json::Error) -> Self {
        Self::Serialize {
            message: source.to_string(),
        }
    }
}
