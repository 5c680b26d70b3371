//! # DDP Client
//!
//! Connection state machine, subscriptions and method calls for the
//! Distributed Data Protocol.
//!
//! This crate provides:
//! - `Connection`: the state machine and inbound dispatcher
//! - `Subscription` and `MethodCall` records with callbacks and async waits
//! - `Account`: password login, resume tokens and logout
//! - A `Transport` abstraction with a mock and a WebSocket implementation
//!
//! ## Reconnection
//!
//! The client never reconnects on its own. After an unclean close the
//! connection is `Disconnected` and keeps its subscriptions and pending
//! calls; calling `connect` again resumes the session and replays them.
//! A clean close drops both.
//!
//! ## Threading
//!
//! Transports may deliver events from any thread. Callbacks, data observers
//! and event receivers are fed without any internal lock held, so they may
//! call back into the connection.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod account;
mod config;
mod connection;
mod error;
mod registry;
mod transport;
#[cfg(feature = "websocket")]
mod websocket;

pub use account::{Account, AccountState, PasswordHasher, Sha256Hasher};
pub use config::ConnectionConfig;
pub use connection::{
    Connection, ConnectionEvent, ConnectionState, ConnectionStats, DataEvent, DataObserver,
    ObserverId,
};
pub use error::{ClientError, ClientResult};
pub use registry::{MethodCall, Subscription};
pub use transport::{EventSink, MockTransport, Transport, TransportEvent, TransportListener};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

pub use ddp_protocol::{DdpError, ErrorKind, Fields, DDP_PROTOCOL_VERSION};
