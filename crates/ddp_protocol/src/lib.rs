//! # DDP Protocol
//!
//! Wire messages and JSON codecs for the Distributed Data Protocol.
//!
//! This crate provides:
//! - `ClientMessage` for frames the client sends
//! - `ServerMessage` for frames the server sends
//! - `DdpError` for errors carried inside protocol messages
//! - EJSON date helpers
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Framing
//!
//! Every frame is one UTF-8 JSON object whose `msg` field names the message
//! kind. Frames without a `msg` field (for example the `server_id` greeting)
//! decode to `None` and are meant to be ignored by the caller.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ddp_error;
pub mod ejson;
mod error;
mod messages;

pub use ddp_error::{DdpError, ErrorKind};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{ClientMessage, Fields, ServerMessage};

/// The DDP protocol version implemented by this crate.
pub const DDP_PROTOCOL_VERSION: &str = "1";
