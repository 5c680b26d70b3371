//! Error types for the local collection mirror.

use thiserror::Error;

/// Result type for local collection operations.
pub type LocalDbResult<T> = Result<T, LocalDbError>;

/// Errors raised while applying data events to a collection.
///
/// These never reach the connection: the database logs them and skips the
/// event.
#[derive(Error, Debug)]
pub enum LocalDbError {
    /// A `changed` or `removed` event named a document that is not present.
    #[error("document '{id}' not found in collection '{collection}'")]
    UnknownDocument {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
    },

    /// A field map could not be converted to or from a typed document.
    #[error("cannot convert document '{id}' in collection '{collection}': {message}")]
    Codec {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// What went wrong.
        message: String,
    },

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LocalDbError {
    /// Creates an unknown-document error.
    pub fn unknown(collection: &str, id: &str) -> Self {
        Self::UnknownDocument {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    /// Creates a codec error.
    pub fn codec(collection: &str, id: &str, message: impl std::fmt::Display) -> Self {
        Self::Codec {
            collection: collection.to_string(),
            id: id.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            LocalDbError::unknown("items", "a").to_string(),
            "document 'a' not found in collection 'items'"
        );
        assert_eq!(
            LocalDbError::codec("items", "a", "missing field `x`").to_string(),
            "cannot convert document 'a' in collection 'items': missing field `x`"
        );
    }
}
