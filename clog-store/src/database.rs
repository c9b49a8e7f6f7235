//! Collection registry
//!
//! A [`Database`] hands out named collections of one backend and commits
//! them together. It is constructed explicitly and passed to whoever needs
//! it; there is no process-wide instance.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::collection::{CollectionOpts, DocumentCollection};
use crate::error::Result;
use crate::json::JsonCollection;
use crate::kv::{KvCollection, KvOptions, KvStore};

/// Storage backend for every collection of a database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// One JSON file per collection, committed explicitly
    #[default]
    Json,
    /// A shared RocksDB instance, durable per write
    Kv,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Json => write!(f, "json"),
            Backend::Kv => write!(f, "kv"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Backend::Json),
            "kv" | "rocksdb" => Ok(Backend::Kv),
            other => Err(format!("unknown backend: {}", other)),
        }
    }
}

/// How a database stores its collections
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub backend: Backend,
    pub opts: CollectionOpts,
    pub kv: KvOptions,
}

impl StoreConfig {
    pub fn new(backend: Backend, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            opts: CollectionOpts::with_prefix(prefix),
            kv: KvOptions::default(),
        }
    }
}

/// Name of the shared key-value store within the collection prefix
const KV_STORE_NAME: &str = "kv";

/// Registry of collections for one backend
pub struct Database {
    config: StoreConfig,
    collections: DashMap<String, Arc<dyn DocumentCollection>>,
    kv: Arc<KvStore>,
}

impl Database {
    /// Create a database. Nothing is opened until a collection is used.
    pub fn new(config: StoreConfig) -> Self {
        let kv = Arc::new(KvStore::new(config.opts.path_for(KV_STORE_NAME)));

        Self {
            config,
            collections: DashMap::new(),
            kv,
        }
    }

    pub fn backend(&self) -> Backend {
        self.config.backend
    }

    /// Get (creating on first use) the collection called `name`
    pub fn collection(&self, name: &str) -> Arc<dyn DocumentCollection> {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| self.create(name))
            .clone()
    }

    fn create(&self, name: &str) -> Arc<dyn DocumentCollection> {
        log::debug!("Creating {} collection {}", self.config.backend, name);
        match self.config.backend {
            Backend::Json => Arc::new(JsonCollection::new(name, self.config.opts.clone())),
            Backend::Kv => Arc::new(KvCollection::new(name, self.kv.clone(), self.config.kv)),
        }
    }

    /// Commit every collection handed out so far
    pub async fn commit(&self) -> Result<()> {
        let collections: Vec<Arc<dyn DocumentCollection>> = self
            .collections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for collection in collections {
            collection.commit().await?;
        }

        log::info!("Committed {} collections", self.collections.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use tempfile::TempDir;

    fn prefix(dir: &TempDir) -> String {
        format!("{}/data/", dir.path().display())
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("json".parse::<Backend>().unwrap(), Backend::Json);
        assert_eq!("RocksDB".parse::<Backend>().unwrap(), Backend::Kv);
        assert!("sqlite".parse::<Backend>().is_err());
    }

    #[test]
    fn test_collection_is_cached_by_name() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(StoreConfig::new(Backend::Json, prefix(&dir)));

        let a = db.collection("v8_tags");
        let b = db.collection("v8_tags");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "v8_tags");
    }

    #[tokio::test]
    async fn test_commit_persists_json_collections() {
        let dir = TempDir::new().unwrap();
        {
            let db = Database::new(StoreConfig::new(Backend::Json, prefix(&dir)));
            db.collection("v8_releases")
                .put(Document::new("11.4").with("milestone", 114))
                .await
                .unwrap();
            db.commit().await.unwrap();
        }

        let db = Database::new(StoreConfig::new(Backend::Json, prefix(&dir)));
        let doc = db.collection("v8_releases").get("11.4").await.unwrap();
        assert_eq!(doc.get("milestone"), Some(&serde_json::Value::from(114)));
    }

    #[tokio::test]
    async fn test_kv_collections_share_one_store() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(StoreConfig::new(Backend::Kv, prefix(&dir)));

        db.collection("v8_features")
            .put(Document::new("1"))
            .await
            .unwrap();
        db.collection("v8_changes")
            .put(Document::new("1"))
            .await
            .unwrap();
        db.commit().await.unwrap();

        assert!(db.collection("v8_features").get_safely("1").await.unwrap().is_some());
        assert!(db.collection("v8_tags").get_safely("1").await.unwrap().is_none());
    }
}
