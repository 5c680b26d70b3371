//! Error types for frame encoding and decoding.

use thiserror::Error;

/// Result type for protocol codec operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding frames.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The frame is not valid JSON, or does not match the message shape.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is JSON but cannot be a DDP message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// Creates an invalid message error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidMessage(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::invalid("msg is not a string");
        assert_eq!(err.to_string(), "invalid message: msg is not a string");

        let err: ProtocolError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("malformed frame"));
    }
}
