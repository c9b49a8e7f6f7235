//! In-memory sources and a write-counting collection for tests.

use async_trait::async_trait;
use clog_store::{Document, DocumentCollection, DocumentQuery};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    revision_range, ChannelDetails, CommitDetail, CommitLogSource, FeatureDetail, FeatureSearch,
    FeatureSource, LogOptions, MilestoneDetail, MilestoneDetails, ReleaseMetadataSource, Sources,
};
use crate::error::{ClogError, ClogResult};
use crate::model::Signature;
use crate::version::Milestone;

pub(crate) fn milestone_detail(milestone: Milestone, stable_date: Option<&str>) -> MilestoneDetail {
    MilestoneDetail {
        mstone: milestone,
        stable_date: stable_date.map(String::from),
        branch_point: None,
        earliest_beta: None,
        late_stable_date: None,
    }
}

/// Channels with a fixed stable milestone and a date for every milestone
pub(crate) struct FakeReleases {
    pub stable: Milestone,
    pub undated: Vec<Milestone>,
    pub calls: AtomicUsize,
}

impl FakeReleases {
    pub fn new(stable: Milestone) -> Self {
        Self {
            stable,
            undated: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn date(&self, milestone: Milestone) -> Option<String> {
        if self.undated.contains(&milestone) || milestone > self.stable {
            None
        } else {
            Some(format!("2023-01-{:02}T00:00:00", milestone % 28 + 1))
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseMetadataSource for FakeReleases {
    async fn channels(&self) -> ClogResult<ChannelDetails> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut stable = milestone_detail(self.stable, None);
        stable.stable_date = self.date(self.stable);

        Ok(ChannelDetails {
            stable,
            beta: Some(milestone_detail(self.stable + 1, None)),
            dev: None,
            canary: None,
        })
    }

    async fn milestones(&self, start: Milestone, end: Milestone) -> ClogResult<MilestoneDetails> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((start..=end)
            .map(|m| {
                let mut detail = milestone_detail(m, None);
                detail.stable_date = self.date(m);
                (m, detail)
            })
            .collect())
    }
}

/// Feature search over a fixed list, understanding the two query shapes the
/// pipeline issues
pub(crate) struct FakeFeatures {
    pub features: Vec<FeatureDetail>,
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl FakeFeatures {
    pub fn new(features: Vec<FeatureDetail>) -> Self {
        Self {
            features,
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn quoted_value<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    let start = query.find(key)? + key.len();
    let rest = &query[start..];
    rest.split('"').next()
}

fn number_after(query: &str, key: &str) -> Option<Milestone> {
    let start = query.find(key)? + key.len();
    query[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()
}

#[async_trait]
impl FeatureSource for FakeFeatures {
    async fn search_by_query(&self, query: &str) -> ClogResult<FeatureSearch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ClogError::upstream("features returned 500"));
        }

        let category = quoted_value(query, "category=\"");
        let exact: Option<Milestone> =
            quoted_value(query, "desktop=\"").and_then(|m| m.parse().ok());
        let low = number_after(query, "desktop>=");
        let high = number_after(query, "desktop<=");

        let features: Vec<FeatureDetail> = self
            .features
            .iter()
            .filter(|f| category.map_or(true, |c| f.category == c))
            .filter(|f| match (f.milestone(), exact) {
                (Some(m), Some(e)) => m == e,
                (Some(m), None) => low.map_or(true, |l| m >= l) && high.map_or(true, |h| m <= h),
                (None, _) => false,
            })
            .cloned()
            .collect();

        Ok(FeatureSearch {
            total_count: features.len() as u64,
            features,
        })
    }
}

/// Commit logs keyed by revision range, tracking concurrent requests
pub(crate) struct FakeCommits {
    pub logs: HashMap<String, Vec<CommitDetail>>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeCommits {
    pub fn new() -> Self {
        Self {
            logs: HashMap::new(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Add commits to the range of `milestone`
    pub fn with(mut self, milestone: Milestone, commits: Vec<CommitDetail>) -> Self {
        self.logs.insert(revision_range(milestone), commits);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CommitLogSource for FakeCommits {
    fn get_logs<'a>(
        &'a self,
        revision: &str,
        options: &LogOptions,
    ) -> BoxStream<'a, ClogResult<CommitDetail>> {
        let revision = revision.to_string();
        let limit = options.limit;

        stream::once(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::task::yield_now().await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let commits = self.logs.get(&revision).cloned().unwrap_or_default();
            Ok::<_, ClogError>(stream::iter(commits.into_iter().map(Ok)))
        })
        .try_flatten()
        .take(limit)
        .boxed()
    }
}

pub(crate) fn commit(hash: &str, author: &str, subject: &str) -> CommitDetail {
    let signature = Signature {
        name: author.to_string(),
        email: format!("{}@chromium.org", author.to_lowercase().replace(' ', "")),
        date: "2023-06-06T10:46:47+00:00".to_string(),
    };

    CommitDetail {
        commit: hash.to_string(),
        author: signature.clone(),
        committer: signature,
        message: format!("{}\n\nBug: v8:1", subject),
    }
}

pub(crate) fn feature(id: u64, name: &str, category: &str, milestone: Milestone) -> FeatureDetail {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": name,
        "category": category,
        "summary": format!("{} summary", name),
        "browsers": { "chrome": { "desktop": milestone } }
    }))
    .unwrap()
}

/// Counting handles on a set of fake sources
pub(crate) struct FakeSources {
    pub releases: Arc<FakeReleases>,
    pub features: Arc<FakeFeatures>,
    pub commits: Arc<FakeCommits>,
}

impl FakeSources {
    pub fn new(releases: FakeReleases, features: FakeFeatures, commits: FakeCommits) -> Self {
        Self {
            releases: Arc::new(releases),
            features: Arc::new(features),
            commits: Arc::new(commits),
        }
    }

    pub fn sources(&self) -> Sources {
        Sources {
            metadata: self.releases.clone(),
            features: self.features.clone(),
            commits: self.commits.clone(),
        }
    }

    /// Calls made to any external source
    pub fn external_calls(&self) -> usize {
        self.releases.calls() + self.features.calls() + self.commits.calls()
    }
}

/// Wraps a collection and counts writes
pub(crate) struct CountingCollection {
    inner: Arc<dyn DocumentCollection>,
    writes: Mutex<usize>,
}

impl CountingCollection {
    pub fn new(inner: Arc<dyn DocumentCollection>) -> Self {
        Self {
            inner,
            writes: Mutex::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    fn count(&self) {
        *self.writes.lock().unwrap() += 1;
    }
}

#[async_trait]
impl DocumentCollection for CountingCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn open(&self) -> clog_store::Result<()> {
        self.inner.open().await
    }

    async fn commit(&self) -> clog_store::Result<()> {
        self.inner.commit().await
    }

    async fn get_safely(&self, id: &str) -> clog_store::Result<Option<Document>> {
        self.inner.get_safely(id).await
    }

    fn get_all(&self) -> BoxStream<'_, clog_store::Result<Document>> {
        self.inner.get_all()
    }

    async fn put(&self, doc: Document) -> clog_store::Result<()> {
        self.count();
        self.inner.put(doc).await
    }

    async fn put_all(&self, docs: Vec<Document>) -> clog_store::Result<()> {
        self.count();
        self.inner.put_all(docs).await
    }

    async fn delete(&self, id: &str) -> clog_store::Result<()> {
        self.count();
        self.inner.delete(id).await
    }

    async fn delete_all(&self, ids: Vec<String>) -> clog_store::Result<()> {
        self.count();
        self.inner.delete_all(ids).await
    }

    async fn query(&self, predicate: DocumentQuery<'_>) -> clog_store::Result<Vec<Document>> {
        self.inner.query(predicate).await
    }
}
