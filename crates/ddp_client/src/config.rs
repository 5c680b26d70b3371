//! Configuration for a DDP connection.

use ddp_protocol::DDP_PROTOCOL_VERSION;

/// Configuration for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server URL, e.g. `ws://localhost:3000/websocket`.
    pub url: String,
    /// Protocol version proposed in the `connect` message.
    pub protocol_version: String,
    /// Protocol versions offered in the `connect` message.
    pub supported_versions: Vec<String>,
    /// Log every frame sent and received at debug level.
    pub log_messages: bool,
    /// Resend registered method calls when the transport reopens.
    ///
    /// Calls are resent with their original parameters and no staleness
    /// check. Disable this when a method must not run twice.
    pub resend_pending_calls: bool,
}

impl ConnectionConfig {
    /// Creates a new connection configuration.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocol_version: DDP_PROTOCOL_VERSION.to_string(),
            supported_versions: vec![DDP_PROTOCOL_VERSION.to_string()],
            log_messages: false,
            resend_pending_calls: true,
        }
    }

    /// Sets the proposed version and the offered version list.
    pub fn with_versions(mut self, version: impl Into<String>, supported: Vec<String>) -> Self {
        self.protocol_version = version.into();
        self.supported_versions = supported;
        self
    }

    /// Enables or disables frame logging.
    pub fn with_log_messages(mut self, enabled: bool) -> Self {
        self.log_messages = enabled;
        self
    }

    /// Enables or disables resending pending calls on reconnect.
    pub fn with_resend_pending_calls(mut self, enabled: bool) -> Self {
        self.resend_pending_calls = enabled;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("ws://localhost:3000/websocket")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_config_builder() {
        let config = ConnectionConfig::new("ws://example.com/websocket")
            .with_log_messages(true)
            .with_resend_pending_calls(false)
            .with_versions("1", vec!["1".into(), "pre2".into()]);

        assert_eq!(config.url, "ws://example.com/websocket");
        assert!(config.log_messages);
        assert!(!config.resend_pending_calls);
        assert_eq!(config.protocol_version, "1");
        assert_eq!(config.supported_versions, vec!["1", "pre2"]);
    }

    #[test]
    fn defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.protocol_version, DDP_PROTOCOL_VERSION);
        assert_eq!(config.supported_versions, vec![DDP_PROTOCOL_VERSION]);
        assert!(config.resend_pending_calls);
        assert!(!config.log_messages);
    }
}
