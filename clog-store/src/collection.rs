//! The backend-independent collection contract

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::document::Document;
use crate::error::{Result, StoreError};

/// Default file suffix for collection storage
pub const DEFAULT_SUFFIX: &str = ".db";

/// Predicate used by [`DocumentCollection::query`]
pub type DocumentQuery<'a> = &'a (dyn Fn(&Document) -> bool + Send + Sync);

/// Handler used by [`DocumentCollection::upsert`]
pub type UpsertFn = Box<dyn FnOnce(Option<Document>) -> Document + Send>;

/// Naming options shared by every collection of a database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionOpts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl CollectionOpts {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            suffix: None,
        }
    }

    /// Storage path for `name`: `{prefix}{name}{suffix}`
    pub fn path_for(&self, name: &str) -> PathBuf {
        let mut path = self.prefix.clone().unwrap_or_default();
        path.push_str(name);
        path.push_str(self.suffix.as_deref().unwrap_or(DEFAULT_SUFFIX));
        PathBuf::from(path)
    }
}

/// A named collection of documents keyed by `_id`.
///
/// Implementations open their backing storage lazily on first use. None of
/// the operations are atomic across concurrent callers; `upsert` in
/// particular is a plain read-modify-write.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Collection name
    fn name(&self) -> &str;

    /// Open the backing storage. Called implicitly by every other operation.
    async fn open(&self) -> Result<()>;

    /// Flush to durable storage. A no-op where writes are already durable.
    async fn commit(&self) -> Result<()>;

    /// Get a document, or `None` when absent
    async fn get_safely(&self, id: &str) -> Result<Option<Document>>;

    /// Get a document, failing with [`StoreError::NotFound`] when absent
    async fn get(&self, id: &str) -> Result<Document> {
        self.get_safely(id)
            .await?
            .ok_or_else(|| StoreError::not_found(id))
    }

    /// Lazily stream every document in backend order.
    ///
    /// Each call starts a fresh pass over the collection.
    fn get_all(&self) -> BoxStream<'_, Result<Document>>;

    /// Insert or replace a document by `_id`
    async fn put(&self, doc: Document) -> Result<()>;

    /// Insert or replace many documents, atomically where the backend allows
    async fn put_all(&self, docs: Vec<Document>) -> Result<()>;

    /// Delete a document; deleting an absent id is not an error
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete many documents, atomically where the backend allows
    async fn delete_all(&self, ids: Vec<String>) -> Result<()>;

    /// Every document for which `predicate` holds, by linear scan
    async fn query(&self, predicate: DocumentQuery<'_>) -> Result<Vec<Document>> {
        let mut all = self.get_all();
        let mut results = Vec::new();

        while let Some(doc) = all.try_next().await? {
            if predicate(&doc) {
                results.push(doc);
            }
        }

        Ok(results)
    }

    /// Read the current document (if any), apply `handler`, write the result
    /// back under `id`.
    async fn upsert(&self, id: &str, handler: UpsertFn) -> Result<()> {
        let current = self.get_safely(id).await?;
        let mut next = handler(current);
        next.id = id.to_string();
        self.put(next).await
    }
}
