//! V8 Changelog Document Store
//!
//! Keyed document collections with two interchangeable backends behind one
//! capability trait, [`DocumentCollection`].
//!
//! ## Backends
//!
//! - **JSON** ([`JsonCollection`]) - the whole collection lives in memory and
//!   is written to one file on `commit`
//! - **KV** ([`KvCollection`]) - RocksDB with compound `(collection, id)` keys,
//!   atomic batches, and transparent chunking of oversized values
//!
//! ## Example
//!
//! ```ignore
//! use clog_store::{Backend, Database, Document, StoreConfig};
//!
//! let db = Database::new(StoreConfig::new(Backend::Json, "data/"));
//! let releases = db.collection("v8_releases");
//!
//! releases.put(Document::new("11.4").with("milestone", 114)).await?;
//! db.commit().await?;
//! ```

pub mod collection;
pub mod database;
pub mod document;
pub mod error;
pub mod json;
pub mod kv;

// Re-exports for convenience
pub use collection::{CollectionOpts, DocumentCollection, DocumentQuery, UpsertFn};
pub use database::{Backend, Database, StoreConfig};
pub use document::Document;
pub use error::{Result, StoreError};
pub use json::JsonCollection;
pub use kv::{KvCollection, KvOptions, KvStore};
