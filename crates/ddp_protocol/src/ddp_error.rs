//! Errors carried inside protocol messages.
//!
//! These are values, not Rust errors: a `DdpError` is attached to the
//! operation that produced it (a method call, a subscription, the
//! connection) and handed to the application through callbacks and events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Where an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Socket-level failure reported by the transport.
    Transport,
    /// The server does not speak any protocol version we offered.
    ProtocolVersion,
    /// An error sent by the server in `nosub` or a top-level `error` message.
    Server,
    /// A method call's own error, carried in its `result` message.
    Application,
}

/// An error value carried by a DDP message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DdpError {
    /// Where the error came from.
    pub kind: ErrorKind,
    /// Error code (`error` field). Numeric codes are stringified.
    pub code: Option<String>,
    /// Human-readable reason.
    pub reason: Option<String>,
    /// Undocumented `message` field sent by some servers.
    pub message: Option<String>,
    /// Undocumented `errorType` field, e.g. `Meteor.Error`.
    pub error_type: Option<String>,
    /// Free-form `details` field.
    pub details: Option<Value>,
    /// The client message the server could not process.
    pub offending_message: Option<Value>,
}

impl DdpError {
    /// Creates an error with only a code and a reason.
    pub fn new(kind: ErrorKind, code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            code: Some(code.into()),
            reason: Some(reason.into()),
            message: None,
            error_type: None,
            details: None,
            offending_message: None,
        }
    }

    /// Creates a transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, "WebSocket error", reason)
    }

    /// Creates the error reported when the server rejects our protocol version.
    pub fn unsupported_version(server_version: Option<&str>) -> Self {
        Self::new(
            ErrorKind::ProtocolVersion,
            "Connection refused",
            format!(
                "The server is using an unsupported DDP protocol version: {}",
                server_version.unwrap_or("unknown")
            ),
        )
    }

    /// Reads an error object.
    ///
    /// The object may be a `nosub`/`result` error object or a whole top-level
    /// `error` message; both use the same field names. Non-object values
    /// produce an error whose reason is the value's JSON text.
    pub fn from_value(kind: ErrorKind, value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self {
                kind,
                code: None,
                reason: Some(value.to_string()),
                message: None,
                error_type: None,
                details: None,
                offending_message: None,
            };
        };

        let text = |name: &str| obj.get(name).and_then(Value::as_str).map(str::to_string);

        let code = obj.get("error").and_then(|code| match code {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Self {
            kind,
            code,
            reason: text("reason"),
            message: text("message"),
            error_type: text("errorType"),
            details: obj.get("details").cloned(),
            offending_message: obj.get("offendingMessage").cloned(),
        }
    }

    /// Returns true if this error came from a method call.
    pub fn is_application(&self) -> bool {
        self.kind == ErrorKind::Application
    }
}

impl fmt::Display for DdpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.reason) {
            (Some(code), Some(reason)) => write!(f, "{code}: {reason}"),
            (Some(code), None) => write!(f, "{code}"),
            (None, Some(reason)) => write!(f, "{reason}"),
            (None, None) => write!(f, "{:?} error", self.kind),
        }
    }
}

impl std::error::Error for DdpError {}
