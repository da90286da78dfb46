use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// A value that can be persisted in the document store.
///
/// Documents are serialized to JSON; `COLLECTION` names the logical table
/// they live in and `id` must be stable for the lifetime of the document.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Typed identifier of the document.
    type Id: Copy + Into<Uuid> + std::fmt::Display + Send + Sync + 'static;

    /// Name of the collection this document type is stored in.
    const COLLECTION: &'static str;

    /// Returns the document's identifier.
    fn id(&self) -> Self::Id;
}

/// Version number of a stored document, used for optimistic concurrency.
///
/// A document is at version 1 after insertion and each successful update
/// increments it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Version of a document that has not been stored yet.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Version assigned on insertion.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A document together with the version it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<D> {
    pub document: D,
    pub version: Version,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a read-modify-write cycle.
#[derive(Debug, Clone)]
pub struct Modified<D> {
    /// The document as read before the change.
    pub before: D,
    /// The document as written.
    pub after: D,
    /// Version assigned to the write.
    pub version: Version,
}
