//! External data sources.
//!
//! - [`ReleaseMetadataSource`]: current channels and per-milestone dates
//! - [`FeatureSource`]: chromestatus feature search
//! - [`CommitLogSource`]: commit history for a revision range
//!
//! [`ChromestatusClient`] implements the first two, [`GitilesClient`] and
//! [`LocalGitLog`] the last.

mod chromestatus;
mod gitiles;
pub mod git;

#[cfg(test)]
pub(crate) mod fake;

pub use chromestatus::{ChromestatusClient, DEFAULT_BASE_URL as CHROMESTATUS_URL};
pub use git::LocalGitLog;
pub use gitiles::{GitilesClient, DEFAULT_REPO_URL as GITILES_URL};

use async_trait::async_trait;
use futures::future::{self, try_join_all};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, OnceLock};

use crate::error::ClogResult;
use crate::filters::is_counted;
use crate::model::{Change, Feature, Signature};
use crate::version::{to_version, Milestone};

/// Release dates of one milestone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneDetail {
    pub mstone: Milestone,
    #[serde(default)]
    pub stable_date: Option<String>,
    #[serde(default)]
    pub branch_point: Option<String>,
    #[serde(default)]
    pub earliest_beta: Option<String>,
    #[serde(default)]
    pub late_stable_date: Option<String>,
}

/// The milestone currently on each release channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDetails {
    pub stable: MilestoneDetail,
    #[serde(default)]
    pub beta: Option<MilestoneDetail>,
    #[serde(default)]
    pub dev: Option<MilestoneDetail>,
    #[serde(default)]
    pub canary: Option<MilestoneDetail>,
}

/// Milestone details keyed by milestone
pub type MilestoneDetails = BTreeMap<Milestone, MilestoneDetail>;

/// Chrome availability of a feature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChromeAvailability {
    #[serde(default)]
    pub desktop: Option<Milestone>,
    #[serde(default)]
    pub status: Option<ChromeStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChromeStatus {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub milestone_str: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Browsers {
    #[serde(default)]
    pub chrome: ChromeAvailability,
}

/// One entry of a feature search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDetail {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub flag_name: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub browsers: Browsers,
}

impl FeatureDetail {
    /// Reported desktop milestone, falling back to the last number in the
    /// status string ("Enabled by default in 114")
    pub fn milestone(&self) -> Option<Milestone> {
        let chrome = &self.browsers.chrome;
        chrome.desktop.or_else(|| {
            chrome
                .status
                .as_ref()
                .and_then(|status| status.milestone_str.as_deref())
                .and_then(last_number)
        })
    }

    /// Domain feature, tagged with its reported milestone or `fallback`
    pub fn into_feature(self, fallback: Milestone) -> Feature {
        let milestone = self.milestone().unwrap_or(fallback);
        Feature {
            id: self.id,
            name: self.name,
            category: self.category,
            flag_name: self.flag_name.filter(|flag| !flag.is_empty()),
            summary: self.summary,
            milestone,
        }
    }
}

fn last_number(text: &str) -> Option<Milestone> {
    static NUMBER: OnceLock<regex::Regex> = OnceLock::new();
    let re = NUMBER.get_or_init(|| regex::Regex::new(r"\d+").expect("valid regex"));

    re.find_iter(text).last()?.as_str().parse().ok()
}

/// Result of a feature search query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSearch {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub features: Vec<FeatureDetail>,
}

/// One commit as reported by a commit log source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitDetail {
    pub commit: String,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl CommitDetail {
    pub fn into_change(self, milestone: Milestone) -> Change {
        Change {
            commit: self.commit,
            author: self.author,
            committer: self.committer,
            message: self.message,
            milestone,
        }
    }
}

/// Options for a commit log request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    /// Only commits touching this path
    pub path_filter: Option<String>,
    pub no_merges: bool,
    /// Upper bound on commits returned
    pub limit: usize,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            path_filter: None,
            no_merges: true,
            limit: 10_000,
        }
    }
}

/// Revision range of the commits that went into `milestone`:
/// `branch-heads/{previous}..branch-heads/{this}`
pub fn revision_range(milestone: Milestone) -> String {
    format!(
        "branch-heads/{}..branch-heads/{}",
        to_version(milestone.saturating_sub(1)),
        to_version(milestone)
    )
}

/// Feature search for features shipping in `milestone`
pub fn feature_query(milestone: Milestone, category: &str) -> String {
    format!(
        "browsers.chrome.desktop=\"{}\" category=\"{}\"",
        milestone, category
    )
}

/// Feature search for features shipping in `start..=end`
pub fn feature_range_query(start: Milestone, end: Milestone, category: &str) -> String {
    format!(
        "browsers.chrome.desktop>={} browsers.chrome.desktop<={} category=\"{}\"",
        start, end, category
    )
}

/// Release channel metadata
#[async_trait]
pub trait ReleaseMetadataSource: Send + Sync {
    /// The milestone currently on each channel
    async fn channels(&self) -> ClogResult<ChannelDetails>;

    /// Details for every milestone in `start..=end`
    async fn milestones(&self, start: Milestone, end: Milestone) -> ClogResult<MilestoneDetails>;
}

/// Feature search
#[async_trait]
pub trait FeatureSource: Send + Sync {
    async fn search_by_query(&self, query: &str) -> ClogResult<FeatureSearch>;
}

/// Commit history
pub trait CommitLogSource: Send + Sync {
    /// Lazily stream the commits of `revision`. Each call starts a new pass.
    fn get_logs<'a>(
        &'a self,
        revision: &str,
        options: &LogOptions,
    ) -> BoxStream<'a, ClogResult<CommitDetail>>;
}

/// The external collaborators of the pipeline
#[derive(Clone)]
pub struct Sources {
    pub metadata: Arc<dyn ReleaseMetadataSource>,
    pub features: Arc<dyn FeatureSource>,
    pub commits: Arc<dyn CommitLogSource>,
}

impl Sources {
    /// Run every query concurrently and union the results by feature id
    pub async fn search_features(&self, queries: &[String]) -> ClogResult<Vec<FeatureDetail>> {
        let searches = try_join_all(
            queries
                .iter()
                .map(|query| self.features.search_by_query(query)),
        )
        .await?;

        let mut seen = HashSet::new();
        Ok(searches
            .into_iter()
            .flat_map(|search| search.features)
            .filter(|feature| seen.insert(feature.id))
            .collect())
    }

    /// Commits of `milestone` that pass the relevance filter
    pub async fn counted_changes(
        &self,
        milestone: Milestone,
        options: &LogOptions,
    ) -> ClogResult<Vec<Change>> {
        let revision = revision_range(milestone);
        let changes: Vec<Change> = self
            .commits
            .get_logs(&revision, options)
            .map_ok(|detail| detail.into_change(milestone))
            .try_filter(|change| future::ready(is_counted(change)))
            .try_collect()
            .await?;

        tracing::debug!(milestone, revision = %revision, count = changes.len(), "Fetched commit log");
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(desktop: Option<Milestone>, milestone_str: Option<&str>) -> FeatureDetail {
        FeatureDetail {
            id: 1,
            name: "Feature".to_string(),
            category: "JavaScript".to_string(),
            flag_name: None,
            summary: String::new(),
            browsers: Browsers {
                chrome: ChromeAvailability {
                    desktop,
                    status: Some(ChromeStatus {
                        text: None,
                        milestone_str: milestone_str.map(String::from),
                    }),
                },
            },
        }
    }

    #[test]
    fn test_feature_milestone_prefers_desktop() {
        assert_eq!(detail(Some(114), Some("Shipped in 113")).milestone(), Some(114));
    }

    #[test]
    fn test_feature_milestone_falls_back_to_status() {
        assert_eq!(detail(None, Some("Enabled by default in 113")).milestone(), Some(113));
        assert_eq!(detail(None, Some("No active development")).milestone(), None);
        assert_eq!(detail(None, None).milestone(), None);
    }

    #[test]
    fn test_revision_range() {
        assert_eq!(
            revision_range(114),
            "branch-heads/11.3..branch-heads/11.4"
        );
        assert_eq!(
            revision_range(120),
            "branch-heads/11.9..branch-heads/12.0"
        );
    }

    #[test]
    fn test_feature_queries() {
        assert_eq!(
            feature_query(114, "JavaScript"),
            r#"browsers.chrome.desktop="114" category="JavaScript""#
        );
        assert_eq!(
            feature_range_query(110, 114, "WebAssembly"),
            r#"browsers.chrome.desktop>=110 browsers.chrome.desktop<=114 category="WebAssembly""#
        );
    }

    #[test]
    fn test_into_feature_uses_fallback() {
        let feature = detail(None, None).into_feature(117);
        assert_eq!(feature.milestone, 117);
        assert_eq!(detail(Some(114), None).into_feature(117).milestone, 114);
    }

    #[test]
    fn test_milestone_details_parse_string_keys() {
        let json = r#"{"113": {"mstone": 113, "stable_date": "2023-05-02T00:00:00"},
                       "114": {"mstone": 114, "stable_date": null}}"#;
        let details: MilestoneDetails = serde_json::from_str(json).unwrap();
        assert_eq!(details[&113].stable_date.as_deref(), Some("2023-05-02T00:00:00"));
        assert_eq!(details[&114].stable_date, None);
    }
}
