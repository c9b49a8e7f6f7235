//! Domain model: releases, features, changes and the tag index.
//!
//! Features and changes are persisted as tagged records so that a cached
//! "confirmed empty" result for a milestone is distinct from both a real
//! entry and a cache miss.

mod change;
mod feature;
mod release;
mod tag;

pub use change::{Change, ChangeRecord, Signature};
pub use feature::{Feature, FeatureRecord};
pub use release::{Release, ReleaseMeta};
pub use tag::Tag;

use clog_store::Document;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::version::Milestone;

/// Result of a cache lookup for one milestone
#[derive(Debug, Clone, PartialEq)]
pub enum Cached<T> {
    /// Fetched before and confirmed empty
    Empty,
    /// Fetched before with at least one entry
    Populated(Vec<T>),
}

impl<T> Cached<T> {
    /// Classify fetched entries, empty or not
    pub fn from_fetched(items: Vec<T>) -> Self {
        if items.is_empty() {
            Cached::Empty
        } else {
            Cached::Populated(items)
        }
    }

    /// Build from the records stored for a milestone. `None` when nothing is
    /// stored; a sentinel next to real entries is ignored.
    pub fn from_records<R>(records: Vec<R>) -> Option<Self>
    where
        R: MilestoneRecord<Item = T>,
    {
        if records.is_empty() {
            return None;
        }

        let items: Vec<T> = records.into_iter().filter_map(R::into_item).collect();
        Some(Self::from_fetched(items))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cached::Empty)
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Cached::Empty => Vec::new(),
            Cached::Populated(items) => items,
        }
    }
}

/// A persisted per-milestone record: either a real entry or the sentinel
/// marking that milestone as confirmed empty.
pub trait MilestoneRecord: Serialize + DeserializeOwned + Sized {
    type Item;

    /// Sentinel for `milestone`
    fn none(milestone: Milestone) -> Self;

    fn from_item(item: Self::Item) -> Self;

    fn into_item(self) -> Option<Self::Item>;

    fn milestone(&self) -> Milestone;

    /// Document id: the entry's own identity, or the version for a sentinel
    fn document_id(&self) -> String;

    fn to_document(&self) -> clog_store::Result<Document> {
        Document::encode(self.document_id(), self)
    }

    fn from_document(doc: &Document) -> clog_store::Result<Self> {
        doc.decode()
    }
}

/// Predicate matching documents whose `milestone` field equals `milestone`
pub fn milestone_query(milestone: Milestone) -> impl Fn(&Document) -> bool + Send + Sync {
    move |doc: &Document| doc.get("milestone").and_then(Value::as_u64) == Some(u64::from(milestone))
}
