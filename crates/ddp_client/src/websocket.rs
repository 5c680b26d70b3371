//! WebSocket transport on tokio-tungstenite.

use crate::error::{ClientError, ClientResult};
use crate::transport::{EventSink, Transport, TransportEvent};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, trace, warn};

/// A [`Transport`] over a WebSocket.
///
/// Each `open` spawns one task that connects and then reads the socket,
/// delivering every event for that socket in order, plus one writer task
/// draining an unbounded queue of outgoing frames.
pub struct WebSocketTransport {
    url: String,
    runtime: Handle,
    writer: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WebSocketTransport {
    /// Creates a transport bound to the current tokio runtime.
    pub fn new(url: impl Into<String>) -> ClientResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| ClientError::transport_fatal(format!("no tokio runtime: {e}")))?;
        Ok(Self::with_handle(url, runtime))
    }

    /// Creates a transport spawning its tasks on `runtime`.
    pub fn with_handle(url: impl Into<String>, runtime: Handle) -> Self {
        Self {
            url: url.into(),
            runtime,
            writer: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The server URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn abort_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.url)
            .field("open", &self.writer.lock().is_some())
            .finish()
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, sink: EventSink) -> ClientResult<()> {
        self.abort_tasks();

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *self.writer.lock() = Some(tx);

        let url = self.url.clone();
        let runtime = self.runtime.clone();
        let task = self.runtime.spawn(async move {
            debug!(%url, "opening websocket");
            let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok((stream, _response)) => stream,
                Err(e) => {
                    warn!(%url, error = %e, "websocket connect failed");
                    sink.emit(TransportEvent::Error(e.to_string()));
                    sink.emit(TransportEvent::Closed { was_clean: false });
                    return;
                }
            };

            let (mut write, mut read) = stream.split();
            runtime.spawn(async move {
                while let Some(message) = rx.recv().await {
                    let closing = matches!(message, Message::Close(_));
                    if let Err(e) = write.send(message).await {
                        debug!(error = %e, "websocket write failed");
                        break;
                    }
                    if closing {
                        break;
                    }
                }
            });

            sink.emit(TransportEvent::Opened);

            let mut was_clean = false;
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if !sink.emit(TransportEvent::MessageReceived(text.as_str().to_owned())) {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        trace!(?frame, "websocket close frame");
                        was_clean = true;
                        break;
                    }
                    Ok(Message::Binary(_)) => debug!("ignoring binary frame"),
                    Ok(_) => {}
                    Err(tungstenite::Error::ConnectionClosed) => {
                        was_clean = true;
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "websocket read failed");
                        sink.emit(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
            }

            debug!(was_clean, "websocket closed");
            sink.emit(TransportEvent::Closed { was_clean });
        });
        self.tasks.lock().push(task);
        Ok(())
    }

    fn close(&self) -> ClientResult<()> {
        match self.writer.lock().take() {
            Some(writer) => writer
                .send(Message::Close(None))
                .map_err(|_| ClientError::transport_fatal("websocket writer is gone")),
            None => Ok(()),
        }
    }

    fn send(&self, text: String) -> ClientResult<()> {
        let writer = self.writer.lock();
        let Some(writer) = writer.as_ref() else {
            return Err(ClientError::NotConnected);
        };
        writer
            .send(Message::text(text))
            .map_err(|_| ClientError::transport_retryable("websocket writer is gone"))
    }

    fn dispose(&self) {
        *self.writer.lock() = None;
        self.abort_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_requires_runtime() {
        assert!(matches!(
            WebSocketTransport::new("ws://localhost:3000/websocket"),
            Err(ClientError::Transport {
                retryable: false,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn send_before_open_is_rejected() {
        let transport = WebSocketTransport::new("ws://localhost:3000/websocket").unwrap();
        assert_eq!(transport.url(), "ws://localhost:3000/websocket");
        assert!(matches!(
            transport.send("{}".into()),
            Err(ClientError::NotConnected)
        ));
        transport.close().unwrap();
        transport.dispose();
    }
}
