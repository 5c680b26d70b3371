//! # DDP Testkit
//!
//! Test utilities for the DDP client crates.
//!
//! This crate provides:
//! - Server frame builders
//! - Property-based test generators and a reference collection model
//! - A `TestClient` wiring a connection, a mock transport and a local database
//! - Fuzz testing harnesses
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ddp_testkit::prelude::*;
//!
//! #[test]
//! fn subscription_becomes_ready() {
//!     let client = TestClient::connected();
//!     let sub = client.connection.subscribe("items", vec![]);
//!     client.deliver(added("items", "a", json!({"x": 1})));
//!     client.deliver(ready(&["0"]));
//!     assert!(sub.is_ready());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod harness;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
    pub use crate::stress::*;
    pub use serde_json::json;
}

pub use generators::{DocEvent, PropTestConfig, ReferenceModel};
pub use harness::TestClient;
