use async_trait::async_trait;

use crate::{Document, DocumentQuery, Modified, Result, StoreError, Version, Versioned};

/// Core trait for document store implementations.
///
/// All implementations must be thread-safe (Send + Sync). Writes are atomic
/// per document: a reader never observes a half-applied update.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a new document at [`Version::first`].
    ///
    /// Fails with `AlreadyExists` if a document with the same id is stored.
    async fn insert<D: Document>(&self, document: &D) -> Result<Version>;

    /// Loads a document by id. Returns None if it doesn't exist.
    async fn get<D: Document>(&self, id: D::Id) -> Result<Option<Versioned<D>>>;

    /// Replaces a document, provided it is still at `expected`.
    ///
    /// Returns the new version. Fails with `ConcurrencyConflict` if another
    /// writer got there first and `NotFound` if the document is gone.
    async fn update<D: Document>(&self, document: &D, expected: Version) -> Result<Version>;

    /// Removes a document. When `expected` is set the delete only succeeds
    /// if the stored version matches.
    async fn delete<D: Document>(&self, id: D::Id, expected: Option<Version>) -> Result<()>;

    /// Returns every document in the collection matching the query,
    /// in insertion order.
    async fn find<D: Document>(&self, query: DocumentQuery) -> Result<Vec<Versioned<D>>>;

    /// Counts documents matching the query.
    async fn count<D: Document>(&self, query: DocumentQuery) -> Result<usize>;
}

/// Extension trait providing convenience methods for document stores.
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    /// Loads a document, failing with `NotFound` if it is absent.
    async fn get_required<D: Document>(&self, id: D::Id) -> Result<Versioned<D>> {
        self.get::<D>(id).await?.ok_or(StoreError::NotFound {
            collection: D::COLLECTION,
            id: id.into(),
        })
    }

    /// Checks if a document exists.
    async fn exists<D: Document>(&self, id: D::Id) -> Result<bool> {
        Ok(self.get::<D>(id).await?.is_some())
    }

    /// Reads a document, applies `change` and writes the result back.
    ///
    /// On a version conflict the document is re-read and `change` re-applied,
    /// up to `max_retries` times. `change` must therefore be a pure function
    /// of the document it is given. Errors returned by `change` abort the
    /// cycle without writing.
    async fn modify<D, E, F>(
        &self,
        id: D::Id,
        max_retries: u32,
        change: F,
    ) -> std::result::Result<Modified<D>, E>
    where
        D: Document,
        E: From<StoreError> + Send,
        F: Fn(&D) -> std::result::Result<D, E> + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            let current = self.get_required::<D>(id).await?;
            let updated = change(&current.document)?;

            match self.update(&updated, current.version).await {
                Ok(version) => {
                    return Ok(Modified {
                        before: current.document,
                        after: updated,
                        version,
                    });
                }
                Err(e) if e.is_conflict() && attempt < max_retries => {
                    attempt += 1;
                    metrics::counter!("store_conflicts_retried_total", "collection" => D::COLLECTION)
                        .increment(1);
                    tracing::debug!(
                        collection = D::COLLECTION,
                        %id,
                        attempt,
                        "retrying document write after conflict"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

// Blanket implementation for all DocumentStore implementations
impl<T: DocumentStore + ?Sized> DocumentStoreExt for T {}
