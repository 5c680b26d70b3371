//! Transport layer abstraction.
//!
//! A transport is a duplex text-message channel. The connection drives it
//! through [`Transport`]; the transport reports back through the
//! [`EventSink`] it was handed on [`Transport::open`], from whatever task or
//! thread reads the socket.

use crate::error::{ClientError, ClientResult};
use ddp_protocol::{ClientMessage, ServerMessage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Weak;

/// A signal emitted by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is open and can carry frames.
    Opened,
    /// The channel closed. `was_clean` is true for an orderly close handshake.
    Closed {
        /// Whether the close handshake completed.
        was_clean: bool,
    },
    /// A socket-level failure. Usually followed by `Closed`.
    Error(String),
    /// A text frame arrived.
    MessageReceived(String),
}

/// Receives transport events.
pub trait TransportListener: Send + Sync {
    /// Handles one event. Events from one transport arrive in order.
    fn on_transport_event(&self, event: TransportEvent);
}

/// Handle a transport uses to report events back to its owner.
///
/// Holds the listener weakly, so a transport never keeps its connection
/// alive.
#[derive(Clone)]
pub struct EventSink {
    listener: Weak<dyn TransportListener>,
}

impl EventSink {
    /// Creates a sink delivering to `listener`.
    pub fn new(listener: Weak<dyn TransportListener>) -> Self {
        Self { listener }
    }

    /// Delivers an event. Returns false if the listener is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        match self.listener.upgrade() {
            Some(listener) => {
                listener.on_transport_event(event);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("alive", &(self.listener.strong_count() > 0))
            .finish()
    }
}

/// A duplex text-message channel.
///
/// Implementations must deliver events for one connection in order and
/// must write each `send` as one whole frame.
pub trait Transport: Send + Sync {
    /// Starts opening the channel. Returns once the attempt is under way;
    /// success is reported with [`TransportEvent::Opened`].
    fn open(&self, sink: EventSink) -> ClientResult<()>;

    /// Starts an orderly close. Completion is reported with
    /// [`TransportEvent::Closed`].
    fn close(&self) -> ClientResult<()>;

    /// Writes one text frame.
    fn send(&self, text: String) -> ClientResult<()>;

    /// Releases every resource held by the transport.
    fn dispose(&self);
}

/// A mock transport for testing.
///
/// Records every frame sent and lets the test inject events as if they
/// came from the socket. Nothing is emitted on its own unless
/// `auto_open` is set.
#[derive(Debug, Default)]
pub struct MockTransport {
    sink: Mutex<Option<EventSink>>,
    sent: Mutex<Vec<String>>,
    open_calls: AtomicUsize,
    close_calls: AtomicUsize,
    auto_open: AtomicBool,
    fail_sends: AtomicBool,
    disposed: AtomicBool,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock transport that emits `Opened` as soon as it is opened.
    pub fn auto_open() -> Self {
        let transport = Self::default();
        transport.auto_open.store(true, Ordering::SeqCst);
        transport
    }

    /// Makes every `send` fail with a transport error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Injects an event. Returns false if nothing is listening.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => sink.emit(event),
            None => false,
        }
    }

    /// Injects a received text frame.
    pub fn receive(&self, text: impl Into<String>) -> bool {
        self.emit(TransportEvent::MessageReceived(text.into()))
    }

    /// Injects a received server message.
    pub fn receive_message(&self, message: &ServerMessage) -> bool {
        match message.encode() {
            Ok(text) => self.receive(text),
            Err(_) => false,
        }
    }

    /// Injects a received JSON value as a text frame.
    pub fn receive_json(&self, value: &serde_json::Value) -> bool {
        self.receive(value.to_string())
    }

    /// Returns every frame sent so far.
    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Returns every frame sent so far, decoded.
    ///
    /// Frames that do not decode as client messages are skipped.
    pub fn sent_messages(&self) -> Vec<ClientMessage> {
        self.sent
            .lock()
            .iter()
            .filter_map(|text| ClientMessage::decode(text).ok())
            .collect()
    }

    /// Removes and returns every frame sent so far, decoded.
    pub fn take_sent_messages(&self) -> Vec<ClientMessage> {
        std::mem::take(&mut *self.sent.lock())
            .iter()
            .filter_map(|text| ClientMessage::decode(text).ok())
            .collect()
    }

    /// Number of `open` calls.
    pub fn open_count(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Whether `dispose` was called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn open(&self, sink: EventSink) -> ClientResult<()> {
        if self.is_disposed() {
            return Err(ClientError::transport_fatal("transport disposed"));
        }
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = Some(sink.clone());
        if self.auto_open.load(Ordering::SeqCst) {
            sink.emit(TransportEvent::Opened);
        }
        Ok(())
    }

    fn close(&self) -> ClientResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn send(&self, text: String) -> ClientResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ClientError::transport_retryable("mock send failure"));
        }
        self.sent.lock().push(text);
        Ok(())
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        *self.sink.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<TransportEvent>>,
    }

    impl TransportListener for Recorder {
        fn on_transport_event(&self, event: TransportEvent) {
            self.events.lock().push(event);
        }
    }

    fn sink_for(recorder: &Arc<Recorder>) -> EventSink {
        let recorder: Arc<dyn TransportListener> = recorder.clone();
        EventSink::new(Arc::downgrade(&recorder))
    }

    #[test]
    fn mock_transport_records_frames() {
        let transport = MockTransport::new();
        transport.send(r#"{"msg":"ping"}"#.into()).unwrap();
        transport
            .send(r#"{"msg":"unsub","id":"3"}"#.into())
            .unwrap();

        assert_eq!(transport.sent_frames().len(), 2);
        let messages = transport.take_sent_messages();
        assert_eq!(messages[1], ClientMessage::Unsub { id: "3".into() });
        assert!(transport.sent_frames().is_empty());
    }

    #[test]
    fn mock_transport_emits_to_listener() {
        let recorder = Arc::new(Recorder::default());
        let transport = MockTransport::new();

        assert!(!transport.receive("{}"));

        transport.open(sink_for(&recorder)).unwrap();
        assert_eq!(transport.open_count(), 1);
        assert!(transport.emit(TransportEvent::Opened));
        assert!(transport.receive(r#"{"msg":"ping"}"#));

        let events = recorder.events.lock().clone();
        assert_eq!(
            events,
            vec![
                TransportEvent::Opened,
                TransportEvent::MessageReceived(r#"{"msg":"ping"}"#.into()),
            ]
        );
    }

    #[test]
    fn auto_open_emits_immediately() {
        let recorder = Arc::new(Recorder::default());
        let transport = MockTransport::auto_open();
        transport.open(sink_for(&recorder)).unwrap();
        assert_eq!(recorder.events.lock().as_slice(), &[TransportEvent::Opened]);
    }

    #[test]
    fn sink_is_dead_after_listener_drops() {
        let recorder = Arc::new(Recorder::default());
        let sink = sink_for(&recorder);
        drop(recorder);
        assert!(!sink.emit(TransportEvent::Opened));
    }

    #[test]
    fn failing_sends_and_dispose() {
        let transport = MockTransport::new();
        transport.set_fail_sends(true);
        assert!(matches!(
            transport.send("x".into()),
            Err(ClientError::Transport { retryable: true, .. })
        ));

        transport.dispose();
        assert!(transport.is_disposed());
        let recorder = Arc::new(Recorder::default());
        assert!(transport.open(sink_for(&recorder)).is_err());
    }
}
