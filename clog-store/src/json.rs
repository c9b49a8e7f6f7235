//! Flat-file JSON collection
//!
//! Holds every document of a collection in memory with an id -> position
//! index. The whole collection is read from one file on first access and
//! written back to that file on [`commit`](DocumentCollection::commit).

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::collection::{CollectionOpts, DocumentCollection, DocumentQuery};
use crate::document::Document;
use crate::error::{Result, StoreError};

/// On-disk layout of a collection file
#[derive(Serialize, Deserialize)]
struct CollectionFile {
    name: String,
    #[serde(default)]
    options: CollectionOpts,
    #[serde(default)]
    index: BTreeMap<String, usize>,
    #[serde(default)]
    documents: Vec<Document>,
}

#[derive(Default)]
struct JsonState {
    opened: bool,
    index: HashMap<String, usize>,
    documents: Vec<Document>,
}

impl JsonState {
    fn from_documents(documents: Vec<Document>) -> Self {
        let index = documents
            .iter()
            .enumerate()
            .map(|(position, doc)| (doc.id.clone(), position))
            .collect();

        Self {
            opened: true,
            index,
            documents,
        }
    }

    fn put(&mut self, doc: Document) {
        match self.index.get(&doc.id) {
            Some(&position) => self.documents[position] = doc,
            None => {
                self.index.insert(doc.id.clone(), self.documents.len());
                self.documents.push(doc);
            }
        }
    }

    fn delete(&mut self, id: &str) {
        if let Some(position) = self.index.remove(id) {
            self.documents.remove(position);
            for slot in self.index.values_mut() {
                if *slot > position {
                    *slot -= 1;
                }
            }
        }
    }
}

/// Collection persisted as a single JSON file
pub struct JsonCollection {
    name: String,
    opts: CollectionOpts,
    path: PathBuf,
    state: RwLock<JsonState>,
}

impl JsonCollection {
    /// Create a collection stored at `{prefix}{name}{suffix}`
    pub fn new(name: impl Into<String>, opts: CollectionOpts) -> Self {
        let name = name.into();
        let path = opts.path_for(&name);

        Self {
            name,
            opts,
            path,
            state: RwLock::new(JsonState::default()),
        }
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of documents currently held
    pub async fn len(&self) -> Result<usize> {
        self.ensure_open().await?;
        Ok(self.state.read().await.documents.len())
    }

    /// Whether the collection holds no documents
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    async fn ensure_open(&self) -> Result<()> {
        if self.state.read().await.opened {
            return Ok(());
        }

        let mut state = self.state.write().await;
        if !state.opened {
            *state = self.load().await?;
        }

        Ok(())
    }

    /// Read the backing file. A missing, unreadable-as-JSON or foreign file
    /// starts the collection empty.
    async fn load(&self) -> Result<JsonState> {
        if !tokio::fs::try_exists(&self.path).await? {
            log::debug!("No collection file at {}, starting empty", self.path.display());
            return Ok(JsonState::from_documents(Vec::new()));
        }

        let bytes = tokio::fs::read(&self.path).await?;
        let file: CollectionFile = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(e) => {
                log::warn!(
                    "Collection file {} is not readable ({}), starting empty",
                    self.path.display(),
                    e
                );
                return Ok(JsonState::from_documents(Vec::new()));
            }
        };

        if file.name != self.name || file.options != self.opts {
            log::warn!(
                "Collection file {} belongs to {:?} with {:?}, expected {:?} with {:?}; starting empty",
                self.path.display(),
                file.name,
                file.options,
                self.name,
                self.opts
            );
            return Ok(JsonState::from_documents(Vec::new()));
        }

        log::info!(
            "Loaded {} documents for collection {} from {}",
            file.documents.len(),
            self.name,
            self.path.display()
        );

        // The position index is derived from document order rather than
        // trusted from the file.
        Ok(JsonState::from_documents(file.documents))
    }
}

#[async_trait]
impl DocumentCollection for JsonCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> Result<()> {
        self.ensure_open().await
    }

    async fn commit(&self) -> Result<()> {
        self.ensure_open().await?;

        let bytes = {
            let state = self.state.read().await;
            let file = CollectionFile {
                name: self.name.clone(),
                options: self.opts.clone(),
                index: state
                    .index
                    .iter()
                    .map(|(id, position)| (id.clone(), *position))
                    .collect(),
                documents: state.documents.clone(),
            };
            serde_json::to_vec(&file)?
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(&self.path, bytes).await?;
        log::debug!("Committed collection {} to {}", self.name, self.path.display());
        Ok(())
    }

    async fn get_safely(&self, id: &str) -> Result<Option<Document>> {
        self.ensure_open().await?;
        let state = self.state.read().await;

        Ok(state
            .index
            .get(id)
            .and_then(|&position| state.documents.get(position))
            .cloned())
    }

    fn get_all(&self) -> BoxStream<'_, Result<Document>> {
        stream::once(async move {
            self.ensure_open().await?;
            Ok::<_, StoreError>(self.state.read().await.documents.clone())
        })
        .map_ok(|documents| stream::iter(documents.into_iter().map(Ok::<Document, StoreError>)))
        .try_flatten()
        .boxed()
    }

    async fn put(&self, doc: Document) -> Result<()> {
        self.ensure_open().await?;
        self.state.write().await.put(doc);
        Ok(())
    }

    async fn put_all(&self, docs: Vec<Document>) -> Result<()> {
        self.ensure_open().await?;
        let mut state = self.state.write().await;
        for doc in docs {
            state.put(doc);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.ensure_open().await?;
        self.state.write().await.delete(id);
        Ok(())
    }

    async fn delete_all(&self, ids: Vec<String>) -> Result<()> {
        self.ensure_open().await?;
        let mut state = self.state.write().await;
        for id in &ids {
            state.delete(id);
        }
        Ok(())
    }

    async fn query(&self, predicate: DocumentQuery<'_>) -> Result<Vec<Document>> {
        self.ensure_open().await?;
        let state = self.state.read().await;

        Ok(state
            .documents
            .iter()
            .filter(|doc| predicate(doc))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn opts(dir: &TempDir) -> CollectionOpts {
        CollectionOpts::with_prefix(format!("{}/data/", dir.path().display()))
    }

    fn doc(id: &str, milestone: u32) -> Document {
        Document::new(id).with("milestone", milestone)
    }

    #[tokio::test]
    async fn test_put_get_and_missing() {
        let dir = TempDir::new().unwrap();
        let col = JsonCollection::new("v8_releases", opts(&dir));

        col.put(doc("11.4", 114)).await.unwrap();

        let found = col.get("11.4").await.unwrap();
        assert_eq!(found.get("milestone"), Some(&serde_json::Value::from(114)));
        assert!(col.get_safely("11.5").await.unwrap().is_none());
        assert!(col.get("11.5").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_put_replaces_in_place() {
        let dir = TempDir::new().unwrap();
        let col = JsonCollection::new("v8_releases", opts(&dir));

        col.put_all(vec![doc("a", 1), doc("b", 2), doc("c", 3)])
            .await
            .unwrap();
        col.put(doc("b", 20)).await.unwrap();

        let ids: Vec<String> = col
            .get_all()
            .map_ok(|d| d.id)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(
            col.get("b").await.unwrap().get("milestone"),
            Some(&serde_json::Value::from(20))
        );
    }

    #[tokio::test]
    async fn test_delete_keeps_index_consistent() {
        let dir = TempDir::new().unwrap();
        let col = JsonCollection::new("v8_changes", opts(&dir));

        col.put_all(vec![doc("a", 1), doc("b", 2), doc("c", 3), doc("d", 4)])
            .await
            .unwrap();
        col.delete("b").await.unwrap();
        col.delete("missing").await.unwrap();

        assert!(col.get_safely("b").await.unwrap().is_none());
        assert_eq!(col.get("a").await.unwrap().id, "a");
        assert_eq!(col.get("c").await.unwrap().id, "c");
        assert_eq!(col.get("d").await.unwrap().id, "d");

        col.delete_all(vec!["a".to_string(), "d".to_string()])
            .await
            .unwrap();
        assert_eq!(col.len().await.unwrap(), 1);
        assert_eq!(col.get("c").await.unwrap().id, "c");
    }

    #[tokio::test]
    async fn test_commit_and_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let col = JsonCollection::new("v8_tags", opts(&dir));
            col.put(doc("maglev", 1)).await.unwrap();
            col.put(doc("heap", 2)).await.unwrap();
            col.commit().await.unwrap();
        }

        let reopened = JsonCollection::new("v8_tags", opts(&dir));
        assert_eq!(reopened.len().await.unwrap(), 2);
        assert_eq!(reopened.get("heap").await.unwrap().id, "heap");
    }

    #[tokio::test]
    async fn test_uncommitted_changes_are_not_persisted() {
        let dir = TempDir::new().unwrap();
        {
            let col = JsonCollection::new("v8_tags", opts(&dir));
            col.put(doc("maglev", 1)).await.unwrap();
        }

        let reopened = JsonCollection::new("v8_tags", opts(&dir));
        assert!(reopened.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_file_is_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        let first = JsonCollection::new("v8_tags", opts(&dir));
        first.put(doc("maglev", 1)).await.unwrap();
        first.commit().await.unwrap();

        // Same file, different recorded options
        let foreign_opts = CollectionOpts {
            prefix: opts(&dir).prefix,
            suffix: Some(".db".to_string()),
        };
        let foreign = JsonCollection::new("v8_tags", foreign_opts);
        assert_eq!(foreign.path(), first.path());
        assert!(foreign.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_unparseable_file_is_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        let col = JsonCollection::new("v8_tags", opts(&dir));
        tokio::fs::create_dir_all(col.path().parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(col.path(), b"{not json").await.unwrap();

        assert!(col.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_query_and_upsert() {
        let dir = TempDir::new().unwrap();
        let col = JsonCollection::new("v8_features", opts(&dir));
        col.put_all(vec![doc("1", 113), doc("2", 114), doc("3", 114)])
            .await
            .unwrap();

        let hits = col
            .query(&|d: &Document| d.get("milestone") == Some(&serde_json::Value::from(114)))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);

        col.upsert(
            "4",
            Box::new(|current| {
                assert!(current.is_none());
                Document::new("ignored").with("milestone", 115)
            }),
        )
        .await
        .unwrap();
        assert_eq!(col.get("4").await.unwrap().id, "4");
    }
}
