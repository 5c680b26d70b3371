//! CLI command implementations.

pub mod call;
pub mod login;
pub mod ping;
pub mod subscribe;

use ddp_client::{Connection, ConnectionConfig, ConnectionEvent, WebSocketTransport};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// How to reach the server.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// WebSocket URL.
    pub url: String,
    /// Log every frame at debug level.
    pub log_frames: bool,
    /// How long to wait for the server at each step.
    pub timeout: Duration,
}

/// An established connection plus its event feed.
pub struct Session {
    /// The connection.
    pub connection: Connection,
    /// Connection events after the handshake.
    pub events: UnboundedReceiver<ConnectionEvent>,
    /// Server-issued session id.
    pub session_id: String,
}

impl Session {
    /// Closes the connection and waits briefly for the close to complete.
    pub async fn close(mut self, timeout: Duration) {
        if self.connection.close().is_err() {
            return;
        }
        let _ = tokio::time::timeout(timeout, async {
            while let Some(event) = self.events.recv().await {
                if matches!(event, ConnectionEvent::Closed | ConnectionEvent::Disconnected) {
                    break;
                }
            }
        })
        .await;
        self.connection.dispose();
    }
}

/// Connects and waits for the server to accept the session.
pub async fn open_session(options: &ConnectOptions) -> Result<Session, Box<dyn std::error::Error>> {
    let transport = Arc::new(WebSocketTransport::new(&options.url)?);
    let config = ConnectionConfig::new(&options.url).with_log_messages(options.log_frames);
    let connection = Connection::new(config, transport);
    let mut events = connection.subscribe_events();
    connection.connect()?;

    let accepted = tokio::time::timeout(options.timeout, async {
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Connected { session } => return Ok(session),
                ConnectionEvent::Error(error) => return Err(error.to_string()),
                ConnectionEvent::Disconnected | ConnectionEvent::Closed => {
                    return Err("connection closed during handshake".to_string())
                }
            }
        }
        Err("connection dropped".to_string())
    })
    .await
    .map_err(|_| format!("no answer from {} within {:?}", options.url, options.timeout))?;

    let session_id = accepted?;
    Ok(Session {
        connection,
        events,
        session_id,
    })
}

/// Parses a command-line parameter as JSON, falling back to a string.
pub fn parse_param(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Renders a value for text output.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
