//! # DDP Local Collections
//!
//! A client-side mirror of the collections a DDP server publishes.
//!
//! This crate provides:
//! - `LocalDb`: routes a connection's data events to lazily-created collections
//! - `DocumentCollection`: the collection trait
//! - `JsonCollection`: documents as raw JSON field maps
//! - `TypedCollection`: documents converted through `DocumentCodec`
//!
//! ## Reconciliation
//!
//! Events are applied in arrival order. `changed` overwrites the listed
//! fields and then removes the cleared ones. A `changed` or `removed` for an
//! unknown document is skipped. Ordering hints (`addedBefore`,
//! `movedBefore`) are not tracked: the former is an add, the latter a no-op.
//!
//! Collection handlers run before the collection mutates, with no lock held.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod collection;
mod db;
mod error;
mod json_collection;
mod typed;

pub use codec::{from_fields_serde, to_fields_serde, DocumentCodec};
pub use collection::DocumentCollection;
pub use db::{CollectionFactory, LocalDb};
pub use error::{LocalDbError, LocalDbResult};
pub use json_collection::JsonCollection;
pub use typed::TypedCollection;
