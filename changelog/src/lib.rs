//! V8 Changelog Library
//!
//! Aggregates V8 releases with the web platform features and engine commits
//! that shipped in them, and caches everything in a document store so that
//! a release is fetched from upstream at most once.

pub mod aggregator;
pub mod cache;
pub mod changelog;
pub mod collections;
pub mod config;
pub mod error;
pub mod filters;
pub mod model;
pub mod orchestrator;
pub mod sources;
pub mod tags;
pub mod version;

pub use aggregator::ReleaseAggregator;
pub use cache::ReleaseCache;
pub use changelog::ChangeLog;
pub use collections::Collections;
pub use config::{ClogConfig, Settings};
pub use error::{ClogError, ClogResult};
pub use model::{Change, Feature, Release, ReleaseMeta, Tag};
pub use orchestrator::{Backfill, MilestoneRange};
pub use version::{to_milestone, to_version, Milestone, ReleaseRef};
