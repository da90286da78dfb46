use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{Document, DocumentQuery, DocumentStore, Result, StoreError, Version, Versioned};

#[derive(Debug, Clone)]
struct StoredDocument {
    seq: u64,
    body: Value,
    version: Version,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Collections {
    next_seq: u64,
    documents: HashMap<(&'static str, Uuid), StoredDocument>,
}

/// In-memory document store implementation for testing and single-node use.
///
/// Documents are kept as JSON so the store behaves like the PostgreSQL
/// implementation: reads always return a fresh copy and filters are evaluated
/// against the serialized form.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<RwLock<Collections>>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents stored in a collection.
    pub async fn document_count(&self, collection: &str) -> usize {
        self.inner
            .read()
            .await
            .documents
            .keys()
            .filter(|(c, _)| *c == collection)
            .count()
    }

    /// Clears all documents.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.documents.clear();
        inner.next_seq = 0;
    }

    fn decode<D: Document>(stored: &StoredDocument) -> Result<Versioned<D>> {
        Ok(Versioned {
            document: serde_json::from_value(stored.body.clone())?,
            version: stored.version,
            updated_at: stored.updated_at,
        })
    }

    async fn matching<D: Document>(&self, query: &DocumentQuery) -> Vec<StoredDocument> {
        let inner = self.inner.read().await;
        let mut matched: Vec<_> = inner
            .documents
            .iter()
            .filter(|((collection, _), stored)| {
                *collection == D::COLLECTION && query.matches(&stored.body)
            })
            .map(|(_, stored)| stored.clone())
            .collect();
        matched.sort_by_key(|stored| stored.seq);
        matched
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert<D: Document>(&self, document: &D) -> Result<Version> {
        let id: Uuid = document.id().into();
        let body = serde_json::to_value(document)?;

        let mut inner = self.inner.write().await;
        if inner.documents.contains_key(&(D::COLLECTION, id)) {
            return Err(StoreError::AlreadyExists {
                collection: D::COLLECTION,
                id,
            });
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.documents.insert(
            (D::COLLECTION, id),
            StoredDocument {
                seq,
                body,
                version: Version::first(),
                updated_at: Utc::now(),
            },
        );

        Ok(Version::first())
    }

    async fn get<D: Document>(&self, id: D::Id) -> Result<Option<Versioned<D>>> {
        let inner = self.inner.read().await;
        inner
            .documents
            .get(&(D::COLLECTION, id.into()))
            .map(Self::decode::<D>)
            .transpose()
    }

    async fn update<D: Document>(&self, document: &D, expected: Version) -> Result<Version> {
        let id: Uuid = document.id().into();
        let body = serde_json::to_value(document)?;

        let mut inner = self.inner.write().await;
        let stored =
            inner
                .documents
                .get_mut(&(D::COLLECTION, id))
                .ok_or(StoreError::NotFound {
                    collection: D::COLLECTION,
                    id,
                })?;

        if stored.version != expected {
            tracing::debug!(
                collection = D::COLLECTION,
                %id,
                %expected,
                actual = %stored.version,
                "stale document write"
            );
            return Err(StoreError::ConcurrencyConflict {
                collection: D::COLLECTION,
                id,
                expected,
                actual: stored.version,
            });
        }

        stored.body = body;
        stored.version = stored.version.next();
        stored.updated_at = Utc::now();

        Ok(stored.version)
    }

    async fn delete<D: Document>(&self, id: D::Id, expected: Option<Version>) -> Result<()> {
        let id: Uuid = id.into();
        let mut inner = self.inner.write().await;
        let stored = inner
            .documents
            .get(&(D::COLLECTION, id))
            .ok_or(StoreError::NotFound {
                collection: D::COLLECTION,
                id,
            })?;

        if let Some(expected) = expected
            && stored.version != expected
        {
            return Err(StoreError::ConcurrencyConflict {
                collection: D::COLLECTION,
                id,
                expected,
                actual: stored.version,
            });
        }

        inner.documents.remove(&(D::COLLECTION, id));
        Ok(())
    }

    async fn find<D: Document>(&self, query: DocumentQuery) -> Result<Vec<Versioned<D>>> {
        let matched = self.matching::<D>(&query).await;
        matched
            .iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(Self::decode::<D>)
            .collect()
    }

    async fn count<D: Document>(&self, query: DocumentQuery) -> Result<usize> {
        Ok(self.matching::<D>(&query).await.len())
    }
}
