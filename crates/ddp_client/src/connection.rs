//! Connection state machine and message dispatcher.
//!
//! ```text
//! NotConnected | Disconnected | Closed
//!        │ connect()
//!        ▼
//!    Connecting ──(transport opened: send connect, replay registry)
//!        │ "connected"
//!        ▼
//!    Connected ── close() ──► Closing ──(clean close)──► Closed
//!
//! any state ──(unclean close)──► Disconnected
//! ```
//!
//! Every mutation of the registry, the session and the state happens under
//! a `parking_lot` lock; no lock is held while user callbacks or data
//! observers run. Frames are written one at a time under the send lock.

use crate::config::ConnectionConfig;
use crate::error::{ClientError, ClientResult};
use crate::registry::{MethodCall, Registry, Subscription};
use crate::transport::{EventSink, Transport, TransportEvent, TransportListener};
use ddp_protocol::{ClientMessage, DdpError, ErrorKind, Fields, ServerMessage};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// The state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// `connect` was never called.
    NotConnected,
    /// Waiting for the transport to open and the server to accept.
    Connecting,
    /// The server accepted the session.
    Connected,
    /// The transport closed uncleanly. Registries are kept for replay.
    Disconnected,
    /// `close` was called; waiting for the transport to close.
    Closing,
    /// The transport closed cleanly. Registries and session are cleared.
    Closed,
}

impl ConnectionState {
    /// Returns true if `connect` may start a new attempt from this state.
    pub fn can_connect(&self) -> bool {
        matches!(
            self,
            ConnectionState::NotConnected | ConnectionState::Disconnected | ConnectionState::Closed
        )
    }
}

/// A connection-level signal.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The server accepted the session.
    Connected {
        /// Server-issued session id.
        session: String,
    },
    /// The transport closed uncleanly. Reconnecting is up to the caller.
    Disconnected,
    /// The transport closed cleanly.
    Closed,
    /// An error not tied to a method call.
    Error(DdpError),
}

/// A change to a server-published collection.
#[derive(Debug, Clone, PartialEq)]
pub enum DataEvent {
    /// A document was added.
    Added {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// Initial fields.
        fields: Fields,
    },
    /// Fields of a document changed.
    Changed {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// Fields to overwrite.
        fields: Fields,
        /// Fields to remove.
        cleared: Vec<String>,
    },
    /// A document was removed.
    Removed {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
    },
    /// A document was added before another one.
    AddedBefore {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// Initial fields.
        fields: Fields,
        /// The document this one precedes; `None` means the end.
        before: Option<String>,
    },
    /// A document moved before another one.
    MovedBefore {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
        /// The document this one now precedes; `None` means the end.
        before: Option<String>,
    },
}

impl DataEvent {
    /// The collection the event applies to.
    pub fn collection(&self) -> &str {
        match self {
            DataEvent::Added { collection, .. }
            | DataEvent::Changed { collection, .. }
            | DataEvent::Removed { collection, .. }
            | DataEvent::AddedBefore { collection, .. }
            | DataEvent::MovedBefore { collection, .. } => collection,
        }
    }

    /// The document the event applies to.
    pub fn document_id(&self) -> &str {
        match self {
            DataEvent::Added { id, .. }
            | DataEvent::Changed { id, .. }
            | DataEvent::Removed { id, .. }
            | DataEvent::AddedBefore { id, .. }
            | DataEvent::MovedBefore { id, .. } => id,
        }
    }
}

/// Receives collection data events in arrival order.
pub trait DataObserver: Send + Sync {
    /// Handles one event.
    fn on_data(&self, event: &DataEvent);
}

impl<F> DataObserver for F
where
    F: Fn(&DataEvent) + Send + Sync,
{
    fn on_data(&self, event: &DataEvent) {
        self(event)
    }
}

/// Identifies a registered data observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Frame counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Frames written to the transport.
    pub frames_sent: u64,
    /// Frames received from the transport.
    pub frames_received: u64,
    /// Received frames that were malformed and dropped.
    pub frames_dropped: u64,
}

struct Inner {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    state: RwLock<ConnectionState>,
    session: RwLock<Option<String>>,
    registry: Mutex<Registry>,
    transport_open: AtomicBool,
    send_lock: Mutex<()>,
    observers: RwLock<Vec<(ObserverId, Arc<dyn DataObserver>)>>,
    next_observer_id: AtomicU64,
    event_subscribers: Mutex<Vec<mpsc::UnboundedSender<ConnectionEvent>>>,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
}

/// A DDP connection.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Creates a connection over `transport`. Nothing happens until
    /// [`connect`](Self::connect).
    pub fn new(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                state: RwLock::new(ConnectionState::NotConnected),
                session: RwLock::new(None),
                registry: Mutex::new(Registry::default()),
                transport_open: AtomicBool::new(false),
                send_lock: Mutex::new(()),
                observers: RwLock::new(Vec::new()),
                next_observer_id: AtomicU64::new(0),
                event_subscribers: Mutex::new(Vec::new()),
                frames_sent: AtomicU64::new(0),
                frames_received: AtomicU64::new(0),
                frames_dropped: AtomicU64::new(0),
            }),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// The current state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    /// The server-issued session id, if any.
    pub fn session(&self) -> Option<String> {
        self.inner.session.read().clone()
    }

    /// Frame counters.
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            frames_sent: self.inner.frames_sent.load(Ordering::Relaxed),
            frames_received: self.inner.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.inner.frames_dropped.load(Ordering::Relaxed),
        }
    }

    /// Returns a receiver for connection-level events.
    ///
    /// Each receiver gets every event emitted after it was created.
    pub fn subscribe_events(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.event_subscribers.lock().push(tx);
        rx
    }

    /// Registers an observer for collection data events.
    pub fn add_data_observer(&self, observer: Arc<dyn DataObserver>) -> ObserverId {
        let id = ObserverId(self.inner.next_observer_id.fetch_add(1, Ordering::SeqCst));
        self.inner.observers.write().push((id, observer));
        id
    }

    /// Unregisters a data observer. Returns false if it was not registered.
    pub fn remove_data_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.inner.observers.write();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    /// Number of registered data observers.
    pub fn data_observer_count(&self) -> usize {
        self.inner.observers.read().len()
    }

    /// Starts connecting.
    ///
    /// A no-op while connecting, connected or closing. Returns once the
    /// transport started opening; progress is reported through events.
    pub fn connect(&self) -> ClientResult<()> {
        {
            let mut state = self.inner.state.write();
            if !state.can_connect() {
                debug!(state = ?*state, "connect request ignored");
                return Ok(());
            }
            *state = ConnectionState::Connecting;
        }

        info!(url = %self.inner.config.url, "connecting");
        if let Err(err) = self.inner.transport.open(self.event_sink()) {
            warn!(error = %err, "transport failed to open");
            *self.inner.state.write() = ConnectionState::Disconnected;
            self.inner
                .emit(ConnectionEvent::Error(DdpError::transport(err.to_string())));
            return Err(err);
        }
        Ok(())
    }

    /// Starts an orderly close. A no-op unless connected.
    pub fn close(&self) -> ClientResult<()> {
        {
            let mut state = self.inner.state.write();
            if *state != ConnectionState::Connected {
                debug!(state = ?*state, "close request ignored");
                return Ok(());
            }
            *state = ConnectionState::Closing;
        }
        info!("closing");
        self.inner.transport.close()
    }

    /// Closes the connection and releases the transport.
    ///
    /// A released transport reports no further events, so a connection that
    /// was connecting, connected or closing ends up `Closed` here, exactly as
    /// after a clean close.
    pub fn dispose(&self) {
        if let Err(err) = self.close() {
            debug!(error = %err, "close failed during dispose");
        }
        self.inner.transport.dispose();
        if matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Closing
        ) {
            self.inner.handle_close(true);
        }
    }

    /// Subscribes to a publication.
    ///
    /// The subscription is registered and returned immediately, not ready.
    /// If the transport is not open the `sub` frame goes out when it opens.
    pub fn subscribe(&self, name: impl Into<String>, params: Vec<Value>) -> Arc<Subscription> {
        let mut registry = self.inner.registry.lock();
        let subscription = registry.add_subscription(name.into(), params);
        debug!(id = %subscription.id(), name = subscription.name(), "subscribe");
        if self.inner.transport_open.load(Ordering::SeqCst) {
            if let Err(err) = self.inner.send(&subscription.sub_message()) {
                warn!(error = %err, "sub not sent; it will be replayed on reconnect");
            }
        }
        subscription
    }

    /// Asks the server to stop a subscription.
    ///
    /// The record stays registered until the server answers with `nosub`.
    pub fn unsubscribe(&self, subscription: &Subscription) -> ClientResult<()> {
        if !self.inner.transport_open.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }
        debug!(id = %subscription.id(), "unsubscribe");
        self.inner.send(&subscription.unsub_message())
    }

    /// Calls a remote method.
    ///
    /// The call is registered and returned immediately. If the transport is
    /// not open the `method` frame goes out when it opens.
    pub fn call(&self, method: impl Into<String>, params: Vec<Value>) -> Arc<MethodCall> {
        let mut registry = self.inner.registry.lock();
        let call = registry.add_call(method.into(), params);
        debug!(id = %call.id(), method = call.method(), "call");
        if self.inner.transport_open.load(Ordering::SeqCst) {
            if let Err(err) = self.inner.send(&call.method_message()) {
                warn!(error = %err, "method not sent; it will be replayed on reconnect");
            }
        }
        call
    }

    /// Sends a heartbeat ping.
    pub fn ping(&self, id: Option<String>) -> ClientResult<()> {
        if !self.inner.transport_open.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }
        self.inner.send(&ClientMessage::Ping { id })
    }

    /// Registered subscriptions, in registration order.
    pub fn active_subscriptions(&self) -> Vec<Arc<Subscription>> {
        self.inner.registry.lock().subscriptions()
    }

    /// Calls still waiting for `result` or `updated`, in registration order.
    pub fn pending_calls(&self) -> Vec<Arc<MethodCall>> {
        self.inner.registry.lock().calls()
    }

    fn event_sink(&self) -> EventSink {
        let listener: Arc<dyn TransportListener> = self.inner.clone();
        EventSink::new(Arc::downgrade(&listener))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .field("session", &self.session())
            .finish()
    }
}

impl TransportListener for Inner {
    fn on_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.handle_open(),
            TransportEvent::Closed { was_clean } => self.handle_close(was_clean),
            TransportEvent::Error(reason) => {
                warn!(%reason, "transport error");
                self.emit(ConnectionEvent::Error(DdpError::transport(reason)));
            }
            TransportEvent::MessageReceived(text) => self.handle_frame(&text),
        }
    }
}

impl Inner {
    fn send(&self, message: &ClientMessage) -> ClientResult<()> {
        let text = message.encode()?;
        let _guard = self.send_lock.lock();
        if self.config.log_messages {
            debug!(frame = %text, "send");
        } else {
            trace!(kind = message.kind(), "send");
        }
        self.transport.send(text)?;
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn emit(&self, event: ConnectionEvent) {
        self.event_subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn notify_observers(&self, event: DataEvent) {
        let observers: Vec<Arc<dyn DataObserver>> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer.on_data(&event);
        }
    }

    fn handle_open(&self) {
        debug!("transport opened");
        // The registry lock is held across the replay so that a concurrent
        // subscribe/call lands either in the replay or after it.
        let registry = self.registry.lock();
        self.transport_open.store(true, Ordering::SeqCst);

        let connect = ClientMessage::Connect {
            session: self.session.read().clone(),
            version: self.config.protocol_version.clone(),
            support: self.config.supported_versions.clone(),
        };
        if let Err(err) = self.send(&connect) {
            warn!(error = %err, "failed to send connect");
            return;
        }

        let subscriptions = registry.subscriptions();
        let calls = if self.config.resend_pending_calls {
            registry.calls()
        } else {
            Vec::new()
        };
        if !subscriptions.is_empty() || !calls.is_empty() {
            info!(
                subscriptions = subscriptions.len(),
                calls = calls.len(),
                "replaying registry"
            );
        }
        for subscription in &subscriptions {
            if let Err(err) = self.send(&subscription.sub_message()) {
                warn!(error = %err, id = %subscription.id(), "failed to replay sub");
            }
        }
        for call in &calls {
            if let Err(err) = self.send(&call.method_message()) {
                warn!(error = %err, id = %call.id(), "failed to replay method");
            }
        }
    }

    fn handle_close(&self, was_clean: bool) {
        self.transport_open.store(false, Ordering::SeqCst);

        if was_clean && *self.state.read() == ConnectionState::Closed {
            debug!("already closed");
            return;
        }
        if was_clean {
            *self.state.write() = ConnectionState::Closed;
            *self.session.write() = None;
            let (subscriptions, calls) = self.registry.lock().clear();
            for subscription in &subscriptions {
                subscription.stop(None);
            }
            info!(
                abandoned_calls = calls.len(),
                "connection closed"
            );
            self.emit(ConnectionEvent::Closed);
        } else {
            *self.state.write() = ConnectionState::Disconnected;
            info!("connection lost");
            self.emit(ConnectionEvent::Disconnected);
        }
    }

    fn force_close(&self) {
        *self.state.write() = ConnectionState::Closing;
        if let Err(err) = self.transport.close() {
            warn!(error = %err, "failed to close transport");
        }
    }

    fn handle_frame(&self, text: &str) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        if self.config.log_messages {
            debug!(frame = %text, "receive");
        }

        match ServerMessage::decode(text) {
            Ok(Some(message)) => self.dispatch(message),
            Ok(None) => trace!("frame without msg ignored"),
            Err(err) => {
                self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "dropping malformed frame");
            }
        }
    }

    fn dispatch(&self, message: ServerMessage) {
        trace!(kind = message.kind(), "dispatch");
        match message {
            ServerMessage::Connected { session } => {
                *self.session.write() = Some(session.clone());
                *self.state.write() = ConnectionState::Connected;
                info!(%session, "connected");
                self.emit(ConnectionEvent::Connected { session });
            }

            ServerMessage::Failed { version } => {
                let error = DdpError::unsupported_version(version.as_deref());
                warn!(server_version = ?version, "server refused protocol version");
                self.emit(ConnectionEvent::Error(error));
                self.force_close();
            }

            ServerMessage::Ping { id } => {
                if let Err(err) = self.send(&ClientMessage::Pong { id }) {
                    warn!(error = %err, "failed to send pong");
                }
            }

            ServerMessage::Pong { .. } => {}

            ServerMessage::Nosub { id, error } => {
                let error = error.map(|e| DdpError::from_value(ErrorKind::Server, &e));
                match self.registry.lock().remove_subscription(&id) {
                    Some(subscription) => subscription.stop(error.clone()),
                    None => debug!(%id, "nosub for unknown subscription"),
                }
                if let Some(error) = error {
                    self.emit(ConnectionEvent::Error(error));
                }
            }

            ServerMessage::Added {
                collection,
                id,
                fields,
            } => self.notify_observers(DataEvent::Added {
                collection,
                id,
                fields: fields.unwrap_or_default(),
            }),

            ServerMessage::Changed {
                collection,
                id,
                fields,
                cleared,
            } => self.notify_observers(DataEvent::Changed {
                collection,
                id,
                fields: fields.unwrap_or_default(),
                cleared: cleared.unwrap_or_default(),
            }),

            ServerMessage::Removed { collection, id } => {
                self.notify_observers(DataEvent::Removed { collection, id })
            }

            ServerMessage::AddedBefore {
                collection,
                id,
                fields,
                before,
            } => self.notify_observers(DataEvent::AddedBefore {
                collection,
                id,
                fields: fields.unwrap_or_default(),
                before,
            }),

            ServerMessage::MovedBefore {
                collection,
                id,
                before,
            } => self.notify_observers(DataEvent::MovedBefore {
                collection,
                id,
                before,
            }),

            ServerMessage::Ready { subs } => {
                let ready: Vec<Arc<Subscription>> = {
                    let registry = self.registry.lock();
                    subs.iter()
                        .filter_map(|id| {
                            let found = registry.subscription(id);
                            if found.is_none() {
                                debug!(%id, "ready for unknown subscription");
                            }
                            found
                        })
                        .collect()
                };
                for subscription in ready {
                    if subscription.mark_ready() {
                        debug!(id = %subscription.id(), "subscription ready");
                    }
                }
            }

            ServerMessage::Result { id, result, error } => {
                let call = {
                    let mut registry = self.registry.lock();
                    let Some(call) = registry.call(&id) else {
                        debug!(%id, "result for unknown call");
                        return;
                    };
                    let error = error.map(|e| DdpError::from_value(ErrorKind::Application, &e));
                    match call.record_result(result.unwrap_or(Value::Null), error) {
                        None => {
                            debug!(%id, "duplicate result ignored");
                            return;
                        }
                        Some(complete) => {
                            if complete {
                                registry.remove_call(&id);
                            }
                        }
                    }
                    call
                };
                call.fire_result();
            }

            ServerMessage::Updated { methods } => {
                let updated: Vec<Arc<MethodCall>> = {
                    let mut registry = self.registry.lock();
                    let mut updated = Vec::with_capacity(methods.len());
                    for id in &methods {
                        let Some(call) = registry.call(id) else {
                            debug!(%id, "updated for unknown call");
                            continue;
                        };
                        match call.record_updated() {
                            None => debug!(%id, "duplicate updated ignored"),
                            Some(complete) => {
                                if complete {
                                    registry.remove_call(id);
                                }
                                updated.push(call);
                            }
                        }
                    }
                    updated
                };
                for call in updated {
                    call.fire_updated();
                }
            }

            ServerMessage::Error { .. } => {
                if let Some(error) = message.connection_error() {
                    warn!(%error, "server error");
                    self.emit(ConnectionEvent::Error(error));
                }
            }

            ServerMessage::Unknown => debug!("unknown message kind ignored"),
        }
    }
}
