//! Error types for the DDP client.

use ddp_protocol::{DdpError, ProtocolError};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Frame encoding or decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The transport is not open.
    #[error("not connected to server")]
    NotConnected,

    /// A method call completed with an error.
    #[error("method call failed: {0}")]
    Call(DdpError),

    /// The server answered with something the client cannot interpret.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the caller may retry the operation.
    ///
    /// The client never retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { retryable, .. } => *retryable,
            ClientError::NotConnected => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddp_protocol::ErrorKind;

    #[test]
    fn retryable_errors() {
        assert!(ClientError::transport_retryable("connection reset").is_retryable());
        assert!(!ClientError::transport_fatal("no runtime").is_retryable());
        assert!(ClientError::NotConnected.is_retryable());
        assert!(!ClientError::Call(DdpError::new(ErrorKind::Application, "403", "denied"))
            .is_retryable());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            ClientError::NotConnected.to_string(),
            "not connected to server"
        );

        let err = ClientError::Call(DdpError::new(ErrorKind::Application, "403", "denied"));
        assert_eq!(err.to_string(), "method call failed: 403: denied");
    }
}
