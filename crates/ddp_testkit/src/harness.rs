//! A connection, mock transport and local database wired together.

use crate::fixtures;
use ddp_client::{
    Connection, ConnectionConfig, ConnectionEvent, ConnectionState, MockTransport, TransportEvent,
};
use ddp_localdb::{JsonCollection, LocalDb};
use ddp_protocol::ClientMessage;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// A test client driving a [`Connection`] through a [`MockTransport`].
///
/// The local database is attached to the connection and stores every
/// collection as a [`JsonCollection`].
pub struct TestClient {
    /// The connection under test.
    pub connection: Connection,
    /// The transport the test controls.
    pub transport: Arc<MockTransport>,
    /// The local database attached to the connection.
    pub db: LocalDb,
    events: Mutex<UnboundedReceiver<ConnectionEvent>>,
}

impl TestClient {
    /// Creates a client that has not connected yet.
    pub fn new() -> Self {
        Self::with_config(ConnectionConfig::default())
    }

    /// Creates a client with a custom configuration.
    pub fn with_config(config: ConnectionConfig) -> Self {
        let transport = Arc::new(MockTransport::new());
        let connection = Connection::new(config, transport.clone());
        let events = connection.subscribe_events();
        let db = LocalDb::json();
        db.set_connection(Some(&connection));
        Self {
            connection,
            transport,
            db,
            events: Mutex::new(events),
        }
    }

    /// Creates a client that completed the handshake with session `s1`.
    ///
    /// Frames sent during the handshake are discarded.
    pub fn connected() -> Self {
        let client = Self::new();
        client.connect_with_session("s1");
        client.transport.take_sent_messages();
        client.take_events();
        client
    }

    /// Connects, opens the transport and answers with `connected`.
    pub fn connect_with_session(&self, session: &str) {
        self.connection.connect().expect("connect failed");
        self.open_transport();
        self.deliver(fixtures::connected(session));
        assert_eq!(self.connection.state(), ConnectionState::Connected);
    }

    /// Reports the transport as open.
    pub fn open_transport(&self) {
        self.transport.emit(TransportEvent::Opened);
    }

    /// Delivers one server frame.
    pub fn deliver(&self, frame: Value) {
        self.transport.receive_json(&frame);
    }

    /// Delivers a sequence of server frames.
    pub fn deliver_all(&self, frames: impl IntoIterator<Item = Value>) {
        for frame in frames {
            self.deliver(frame);
        }
    }

    /// Simulates the socket dropping.
    pub fn drop_transport(&self) {
        self.transport.emit(TransportEvent::Closed { was_clean: false });
    }

    /// Closes the connection and completes the close handshake.
    pub fn close_cleanly(&self) {
        self.connection.close().expect("close failed");
        self.transport.emit(TransportEvent::Closed { was_clean: true });
    }

    /// Removes and returns the frames sent since the last call.
    pub fn take_sent(&self) -> Vec<ClientMessage> {
        self.transport.take_sent_messages()
    }

    /// Removes the frames sent since the last call and returns their kinds.
    pub fn take_sent_kinds(&self) -> Vec<&'static str> {
        self.take_sent().iter().map(ClientMessage::kind).collect()
    }

    /// Removes and returns the connection events emitted so far.
    pub fn take_events(&self) -> Vec<ConnectionEvent> {
        let mut events = self.events.lock();
        let mut taken = Vec::new();
        while let Ok(event) = events.try_recv() {
            taken.push(event);
        }
        taken
    }

    /// The documents of one collection.
    pub fn documents(&self, collection: &str) -> BTreeMap<String, ddp_client::Fields> {
        self.db
            .collection_as::<JsonCollection>(collection)
            .map(|c| c.snapshot())
            .unwrap_or_default()
    }
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}
