//! Versioned document store.
//!
//! Every document lives in a named collection and carries a [`Version`] that
//! is bumped on each write. Writers pass the version they read; a mismatch is
//! reported as [`StoreError::ConcurrencyConflict`] so callers can re-read and
//! retry instead of silently overwriting a concurrent change.

pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use document::{Document, Modified, Version, Versioned};
pub use error::{Result, StoreError};
pub use memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use query::{DocumentQuery, FieldFilter, FilterOp};
pub use store::{DocumentStore, DocumentStoreExt};
