//! RocksDB-backed collections
//!
//! Every collection of a database shares one RocksDB instance. Documents live
//! under the compound key `(collection, id)` and are encoded as MessagePack.
//! Multi-document writes go through a single atomic `WriteBatch`.
//!
//! Values larger than [`KvOptions::max_value_size`] are split into numbered
//! chunks stored under `(collection, id, n)`, with a small marker record at
//! the document's primary key. A per-collection metadata record remembers
//! whether chunked storage was ever used so the common read path can skip
//! the marker check.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::collection::DocumentCollection;
use crate::document::Document;
use crate::error::{Result, StoreError};

const DOC_TAG: u8 = b'd';
const CHUNK_TAG: u8 = b'c';
const META_TAG: u8 = b'm';
const SEPARATOR: u8 = 0x00;

/// Documents decoded per iterator pass in `get_all`
const PAGE_SIZE: usize = 64;

/// Size limits for stored values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KvOptions {
    /// Largest value written inline; larger values are chunked
    pub max_value_size: usize,
    /// Size of each chunk of a multipart value
    pub chunk_size: usize,
}

impl Default for KvOptions {
    fn default() -> Self {
        Self {
            max_value_size: 64 * 1024,
            chunk_size: 56 * 1024,
        }
    }
}

/// Marker stored at the primary key of a chunked document
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultipartMarker {
    is_multipart: bool,
    chunks: u32,
}

impl MultipartMarker {
    /// Recognize a marker among decoded values. Documents always carry `_id`,
    /// markers never do.
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.contains_key("_id") || object.get("isMultipart") != Some(&Value::Bool(true)) {
            return None;
        }
        let chunks = object.get("chunks")?.as_u64()?;
        Some(Self {
            is_multipart: true,
            chunks: u32::try_from(chunks).ok()?,
        })
    }
}

fn encode_document(doc: &Document) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(&doc.to_value())?)
}

fn decode_document(value: Value) -> Result<Document> {
    Ok(serde_json::from_value(value)?)
}

/// Collection-level metadata record
#[derive(Debug, Default, Serialize, Deserialize)]
struct CollectionMeta {
    multipart: bool,
}

fn doc_prefix(collection: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(collection.len() + 2);
    key.push(DOC_TAG);
    key.extend_from_slice(collection.as_bytes());
    key.push(SEPARATOR);
    key
}

fn doc_key(collection: &str, id: &str) -> Vec<u8> {
    let mut key = doc_prefix(collection);
    key.extend_from_slice(id.as_bytes());
    key
}

fn chunk_key(collection: &str, id: &str, n: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(collection.len() + id.len() + 7);
    key.push(CHUNK_TAG);
    key.extend_from_slice(collection.as_bytes());
    key.push(SEPARATOR);
    key.extend_from_slice(id.as_bytes());
    key.push(SEPARATOR);
    key.extend_from_slice(&n.to_be_bytes());
    key
}

fn meta_key(collection: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(collection.len() + 1);
    key.push(META_TAG);
    key.extend_from_slice(collection.as_bytes());
    key
}

/// A lazily opened RocksDB instance shared by several collections
pub struct KvStore {
    path: PathBuf,
    db: OnceCell<Arc<DB>>,
}

impl KvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn handle(&self) -> Result<&Arc<DB>> {
        self.db
            .get_or_try_init(|| async {
                if let Some(parent) = self.path.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }

                let mut opts = Options::default();
                opts.create_if_missing(true);
                opts.set_max_background_jobs(2);
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

                let db = DB::open(&opts, &self.path)?;
                log::info!("KV store opened at: {}", self.path.display());
                Ok::<_, StoreError>(Arc::new(db))
            })
            .await
    }
}

/// A collection stored in a shared [`KvStore`]
pub struct KvCollection {
    name: String,
    store: Arc<KvStore>,
    options: KvOptions,
    multipart: OnceCell<AtomicBool>,
}

impl KvCollection {
    pub fn new(name: impl Into<String>, store: Arc<KvStore>, options: KvOptions) -> Self {
        Self {
            name: name.into(),
            store,
            options,
            multipart: OnceCell::new(),
        }
    }

    async fn db(&self) -> Result<&Arc<DB>> {
        self.store.handle().await
    }

    /// Whether chunked storage has ever been used by this collection
    async fn multipart_flag(&self, db: &DB) -> Result<&AtomicBool> {
        self.multipart
            .get_or_try_init(|| async {
                let used = match db.get(meta_key(&self.name))? {
                    Some(bytes) => rmp_serde::from_slice::<CollectionMeta>(&bytes)?.multipart,
                    None => false,
                };
                Ok::<_, StoreError>(AtomicBool::new(used))
            })
            .await
    }

    /// The backend's per-value limit
    fn check_value_size(&self, size: usize) -> Result<()> {
        if size > self.options.max_value_size {
            return Err(StoreError::OversizeValue {
                size,
                limit: self.options.max_value_size,
            });
        }
        Ok(())
    }

    fn decode_entry(&self, db: &DB, id: &str, bytes: &[u8], multipart: bool) -> Result<Document> {
        let value: Value = rmp_serde::from_slice(bytes)?;
        if multipart {
            if let Some(marker) = MultipartMarker::from_value(&value) {
                return self.reassemble(db, id, marker.chunks);
            }
        }
        decode_document(value)
    }

    fn reassemble(&self, db: &DB, id: &str, chunks: u32) -> Result<Document> {
        let mut buffer = Vec::with_capacity(chunks as usize * self.options.chunk_size);

        for n in 0..chunks {
            match db.get(chunk_key(&self.name, id, n))? {
                Some(part) => buffer.extend_from_slice(&part),
                None => {
                    return Err(StoreError::CorruptMultipart {
                        id: id.to_string(),
                        reason: format!("chunk {} of {} is missing", n, chunks),
                    })
                }
            }
        }

        decode_document(rmp_serde::from_slice(&buffer)?)
    }

    /// Stage deletion of the chunks of an existing multipart document
    fn stage_clear_chunks(&self, db: &DB, batch: &mut WriteBatch, id: &str) -> Result<()> {
        if let Some(bytes) = db.get(doc_key(&self.name, id))? {
            let value: Value = rmp_serde::from_slice(&bytes)?;
            if let Some(marker) = MultipartMarker::from_value(&value) {
                for n in 0..marker.chunks {
                    batch.delete(chunk_key(&self.name, id, n));
                }
            }
        }
        Ok(())
    }

    fn stage_multipart(&self, batch: &mut WriteBatch, id: &str, encoded: &[u8]) -> Result<()> {
        let mut chunks = 0u32;
        for (n, chunk) in encoded.chunks(self.options.chunk_size).enumerate() {
            batch.put(chunk_key(&self.name, id, n as u32), chunk);
            chunks += 1;
        }

        let marker = rmp_serde::to_vec_named(&MultipartMarker {
            is_multipart: true,
            chunks,
        })?;
        batch.put(doc_key(&self.name, id), marker);
        Ok(())
    }

    /// Stage one document write. Returns whether it took the chunked path.
    fn stage_put(
        &self,
        db: &DB,
        batch: &mut WriteBatch,
        doc: &Document,
        multipart: bool,
    ) -> Result<bool> {
        if multipart {
            self.stage_clear_chunks(db, batch, &doc.id)?;
        }

        let encoded = encode_document(doc)?;
        match self.check_value_size(encoded.len()) {
            Ok(()) => {
                batch.put(doc_key(&self.name, &doc.id), &encoded);
                Ok(false)
            }
            Err(StoreError::OversizeValue { size, limit }) => {
                log::debug!(
                    "Document {}/{} is {} bytes (limit {}), writing in chunks",
                    self.name,
                    doc.id,
                    size,
                    limit
                );
                self.stage_multipart(batch, &doc.id, &encoded)?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply a batch of staged puts, recording multipart use if needed
    fn write_batch(
        &self,
        db: &DB,
        mut batch: WriteBatch,
        chunked: bool,
        flag: &AtomicBool,
    ) -> Result<()> {
        if chunked && !flag.load(Ordering::Acquire) {
            let meta = rmp_serde::to_vec_named(&CollectionMeta { multipart: true })?;
            batch.put(meta_key(&self.name), meta);
        }

        db.write(batch)?;

        if chunked {
            flag.store(true, Ordering::Release);
        }
        Ok(())
    }

    /// Read one page of documents starting at `from` (inclusive).
    ///
    /// Returns the page and the key to resume from, if the collection may
    /// hold more documents.
    fn read_page(
        &self,
        db: &DB,
        from: &[u8],
        prefix: &[u8],
        multipart: bool,
    ) -> Result<(Vec<Document>, Option<Vec<u8>>)> {
        let mut page = Vec::with_capacity(PAGE_SIZE);
        let mut last_key = None;

        for item in db.iterator(IteratorMode::From(from, Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                return Ok((page, None));
            }

            let id = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            page.push(self.decode_entry(db, &id, &value, multipart)?);
            last_key = Some(key);

            if page.len() == PAGE_SIZE {
                break;
            }
        }

        // Resume at the smallest key strictly greater than the last one read
        let resume = match last_key {
            Some(key) if page.len() == PAGE_SIZE => {
                let mut next = key.into_vec();
                next.push(SEPARATOR);
                Some(next)
            }
            _ => None,
        };

        Ok((page, resume))
    }

    #[cfg(test)]
    async fn chunk_keys(&self, id: &str) -> Result<usize> {
        let db = self.db().await?;
        let mut prefix = chunk_key(&self.name, id, 0);
        prefix.truncate(prefix.len() - 4);

        let mut count = 0;
        for item in db.iterator(IteratorMode::From(&prefix, Direction::Forward)) {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }
}

struct PageCursor {
    next_key: Option<Vec<u8>>,
    buffered: VecDeque<Document>,
}

#[async_trait]
impl DocumentCollection for KvCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> Result<()> {
        let db = self.db().await?;
        self.multipart_flag(db).await?;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        // Writes are durable per call; flushing only trims the WAL.
        self.db().await?.flush()?;
        Ok(())
    }

    async fn get_safely(&self, id: &str) -> Result<Option<Document>> {
        let db = self.db().await?;
        let multipart = self.multipart_flag(db).await?.load(Ordering::Acquire);

        match db.get(doc_key(&self.name, id))? {
            Some(bytes) => Ok(Some(self.decode_entry(db, id, &bytes, multipart)?)),
            None => Ok(None),
        }
    }

    fn get_all(&self) -> BoxStream<'_, Result<Document>> {
        let prefix = doc_prefix(&self.name);
        let cursor = PageCursor {
            next_key: Some(prefix.clone()),
            buffered: VecDeque::new(),
        };

        stream::try_unfold(cursor, move |mut cursor| {
            let prefix = prefix.clone();
            async move {
                loop {
                    if let Some(doc) = cursor.buffered.pop_front() {
                        return Ok(Some((doc, cursor)));
                    }

                    let Some(from) = cursor.next_key.take() else {
                        return Ok(None);
                    };

                    let db = self.db().await?;
                    let multipart = self.multipart_flag(db).await?.load(Ordering::Acquire);
                    let (page, resume) = self.read_page(db, &from, &prefix, multipart)?;

                    cursor.buffered.extend(page);
                    cursor.next_key = resume;
                }
            }
        })
        .boxed()
    }

    async fn put(&self, doc: Document) -> Result<()> {
        let db = self.db().await?;
        let flag = self.multipart_flag(db).await?;

        let mut batch = WriteBatch::default();
        let chunked = self.stage_put(db, &mut batch, &doc, flag.load(Ordering::Acquire))?;
        self.write_batch(db, batch, chunked, flag)
    }

    async fn put_all(&self, docs: Vec<Document>) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }

        let db = self.db().await?;
        let flag = self.multipart_flag(db).await?;
        let multipart = flag.load(Ordering::Acquire);

        let mut batch = WriteBatch::default();
        let mut chunked = false;
        for doc in &docs {
            chunked |= self.stage_put(db, &mut batch, doc, multipart)?;
        }

        log::debug!("Writing {} documents to {} in one batch", docs.len(), self.name);
        self.write_batch(db, batch, chunked, flag)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.delete_all(vec![id.to_string()]).await
    }

    async fn delete_all(&self, ids: Vec<String>) -> Result<()> {
        let db = self.db().await?;
        let multipart = self.multipart_flag(db).await?.load(Ordering::Acquire);

        let mut batch = WriteBatch::default();
        for id in &ids {
            if multipart {
                self.stage_clear_chunks(db, &mut batch, id)?;
            }
            batch.delete(doc_key(&self.name, id));
        }

        db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> Arc<KvStore> {
        Arc::new(KvStore::new(dir.path().join("data").join("kv.db")))
    }

    fn large_doc(id: &str, bytes: usize) -> Document {
        let message: String = "v8 ".repeat(bytes / 3);
        Document::new(id)
            .with("message", message)
            .with("milestone", 114)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = TempDir::new().unwrap();
        let col = KvCollection::new("v8_changes", store(&dir), KvOptions::default());

        col.put(Document::new("abc").with("subject", "[maglev] Fix"))
            .await
            .unwrap();

        let doc = col.get("abc").await.unwrap();
        assert_eq!(doc.get("subject"), Some(&Value::from("[maglev] Fix")));

        col.delete("abc").await.unwrap();
        assert!(col.get_safely("abc").await.unwrap().is_none());
        assert!(col.get("abc").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_get_all_is_key_ordered_and_scoped() {
        let dir = TempDir::new().unwrap();
        let kv = store(&dir);
        let tags = KvCollection::new("v8_tags", kv.clone(), KvOptions::default());
        let other = KvCollection::new("v8_tag", kv, KvOptions::default());

        tags.put_all(vec![
            Document::new("wasm"),
            Document::new("api"),
            Document::new("heap"),
        ])
        .await
        .unwrap();
        other.put(Document::new("zzz")).await.unwrap();

        let ids: Vec<String> = tags
            .get_all()
            .map_ok(|d| d.id)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids, vec!["api", "heap", "wasm"]);

        // Restartable: a second pass sees the same sequence
        let again: Vec<Document> = tags.get_all().try_collect().await.unwrap();
        assert_eq!(again.len(), 3);
    }

    #[tokio::test]
    async fn test_get_all_spans_pages() {
        let dir = TempDir::new().unwrap();
        let col = KvCollection::new("v8_features", store(&dir), KvOptions::default());

        let docs: Vec<Document> = (0..(PAGE_SIZE * 2 + 5))
            .map(|n| Document::new(format!("{:05}", n)).with("n", n as u64))
            .collect();
        col.put_all(docs).await.unwrap();

        let all: Vec<Document> = col.get_all().try_collect().await.unwrap();
        assert_eq!(all.len(), PAGE_SIZE * 2 + 5);
        assert_eq!(all.first().unwrap().id, "00000");
        assert_eq!(all.last().unwrap().id, format!("{:05}", PAGE_SIZE * 2 + 4));
    }

    #[tokio::test]
    async fn test_chunked_round_trip_and_delete() {
        let dir = TempDir::new().unwrap();
        let col = KvCollection::new("v8_releases", store(&dir), KvOptions::default());

        let original = large_doc("11.4", 200 * 1024);
        col.put(original.clone()).await.unwrap();

        assert!(col.chunk_keys("11.4").await.unwrap() >= 4);
        assert_eq!(col.get("11.4").await.unwrap(), original);

        let all: Vec<Document> = col.get_all().try_collect().await.unwrap();
        assert_eq!(all, vec![original]);

        col.delete("11.4").await.unwrap();
        assert_eq!(col.chunk_keys("11.4").await.unwrap(), 0);
        assert!(col.get_safely("11.4").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_multipart_with_small_value_clears_chunks() {
        let dir = TempDir::new().unwrap();
        let col = KvCollection::new("v8_releases", store(&dir), KvOptions::default());

        col.put(large_doc("11.4", 150 * 1024)).await.unwrap();
        assert!(col.chunk_keys("11.4").await.unwrap() > 0);

        let small = Document::new("11.4").with("milestone", 114);
        col.put(small.clone()).await.unwrap();

        assert_eq!(col.chunk_keys("11.4").await.unwrap(), 0);
        assert_eq!(col.get("11.4").await.unwrap(), small);
    }

    #[tokio::test]
    async fn test_multipart_flag_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kv.db");
        let original = large_doc("big", 100 * 1024);

        {
            let kv = Arc::new(KvStore::new(&path));
            let col = KvCollection::new("v8_changes", kv, KvOptions::default());
            col.put_all(vec![original.clone(), Document::new("small")])
                .await
                .unwrap();
        }

        let kv = Arc::new(KvStore::new(&path));
        let col = KvCollection::new("v8_changes", kv, KvOptions::default());
        assert_eq!(col.get("big").await.unwrap(), original);
        assert_eq!(col.get("small").await.unwrap().id, "small");
    }

    #[tokio::test]
    async fn test_small_limits_force_chunking() {
        let dir = TempDir::new().unwrap();
        let options = KvOptions {
            max_value_size: 16,
            chunk_size: 8,
        };
        let col = KvCollection::new("v8_tags", store(&dir), options);

        let doc = Document::new("webassembly").with("milestones", vec![110, 111, 112, 113, 114, 115]);
        col.upsert("webassembly", Box::new(move |_| doc)).await.unwrap();

        assert!(col.chunk_keys("webassembly").await.unwrap() > 1);
        let stored = col.get("webassembly").await.unwrap();
        assert_eq!(stored.get("milestones").unwrap().as_array().unwrap().len(), 6);
    }
}
