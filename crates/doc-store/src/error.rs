use thiserror::Error;
use uuid::Uuid;

use crate::Version;

/// Errors that can occur when interacting with the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document was changed by another writer since it was read.
    #[error(
        "Concurrency conflict on {collection}/{id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        collection: &'static str,
        id: Uuid,
        expected: Version,
        actual: Version,
    },

    /// The document does not exist.
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: &'static str, id: Uuid },

    /// A document with the same id already exists.
    #[error("Document already exists: {collection}/{id}")]
    AlreadyExists { collection: &'static str, id: Uuid },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if retrying after a fresh read may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for document store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
