//! Read API over the release pipeline.

use clog_store::Database;
use std::sync::Arc;

use crate::aggregator::ReleaseAggregator;
use crate::cache::ReleaseCache;
use crate::collections::Collections;
use crate::config::{ClogConfig, Settings};
use crate::error::{ClogError, ClogResult};
use crate::model::{Release, Tag};
use crate::orchestrator::{Backfill, MilestoneRange};
use crate::sources::{
    ChannelDetails, ChromestatusClient, CommitLogSource, GitilesClient, LocalGitLog,
    MilestoneDetail, Sources,
};
use crate::version::{Milestone, ReleaseRef};

/// Releases, features, changes and tags of V8, cached in a document store
pub struct ChangeLog {
    database: Arc<Database>,
    aggregator: ReleaseAggregator,
    backfill: Backfill,
    cache: ReleaseCache,
}

impl ChangeLog {
    pub fn new(database: Arc<Database>, sources: Sources, settings: Settings, cache: ReleaseCache) -> Self {
        let collections = Collections::open(&database);
        let aggregator = ReleaseAggregator::new(collections, sources, settings);

        Self {
            database,
            backfill: Backfill::new(aggregator.clone()),
            aggregator,
            cache,
        }
    }

    /// Build the store and the HTTP (or local git) sources from `config`
    pub async fn from_config(config: &ClogConfig) -> ClogResult<Self> {
        let chromestatus = Arc::new(ChromestatusClient::new(config.chromestatus_url.clone())?);

        let commits: Arc<dyn CommitLogSource> = match &config.git_dir {
            Some(git_dir) => Arc::new(LocalGitLog::open(git_dir).await?),
            None => Arc::new(GitilesClient::new(
                config.gitiles_url.clone(),
                config.gitiles_interval(),
            )?),
        };

        let sources = Sources {
            metadata: chromestatus.clone(),
            features: chromestatus,
            commits,
        };

        tracing::info!(
            backend = %config.backend,
            prefix = %config.data_prefix,
            "Opening changelog"
        );

        Ok(Self::new(
            Arc::new(Database::new(config.store_config())),
            sources,
            config.settings(),
            ReleaseCache::new(config.cache_capacity, config.latest_ttl()),
        ))
    }

    pub fn aggregator(&self) -> &ReleaseAggregator {
        &self.aggregator
    }

    fn collections(&self) -> &Collections {
        self.aggregator.collections()
    }

    fn floor(&self) -> Milestone {
        self.aggregator.settings().floor
    }

    /// Current channels, from the cache while fresh
    async fn channels(&self) -> ClogResult<ChannelDetails> {
        if let Some(channels) = self.cache.latest() {
            return Ok(channels);
        }

        let channels = self.aggregator.sources().metadata.channels().await?;
        self.cache.set_latest(channels.clone());
        Ok(channels)
    }

    async fn milestone_details(&self, start: Milestone, end: Milestone) -> ClogResult<()> {
        if (start..=end).all(|m| self.cache.milestone(m).is_some()) {
            return Ok(());
        }

        let details = self.aggregator.sources().metadata.milestones(start, end).await?;
        self.cache.set_milestones(&details);
        Ok(())
    }

    async fn milestone_detail(&self, milestone: Milestone) -> ClogResult<Option<MilestoneDetail>> {
        self.milestone_details(milestone, milestone).await?;
        Ok(self.cache.milestone(milestone))
    }

    /// The current stable release. Stored with its tags on first sight.
    pub async fn get_latest(&self) -> ClogResult<Release> {
        let stable = self.channels().await?.stable;

        if let Some(meta) = self.collections().release_meta(stable.mstone).await? {
            return Ok(Release::from_meta(meta));
        }

        tracing::info!(milestone = stable.mstone, "New stable release");
        let mut release = Release::new(stable.mstone, stable.stable_date);
        self.aggregator.get_tags(&mut release, false).await?;
        Ok(release)
    }

    /// One release by milestone or version. Milestones below the floor are
    /// raised to it.
    pub async fn get_release(
        &self,
        release: ReleaseRef,
        stable_date: Option<String>,
    ) -> ClogResult<Release> {
        let milestone = release.milestone().max(self.floor());

        if let Some(meta) = self.collections().release_meta(milestone).await? {
            return Ok(Release::from_meta(meta));
        }

        let stable_date = match stable_date {
            Some(date) => Some(date),
            None => self
                .milestone_detail(milestone)
                .await?
                .ok_or_else(|| ClogError::NotFound(format!("release {}", release)))?
                .stable_date,
        };

        Ok(Release::new(milestone, stable_date))
    }

    /// Releases in a range, newest first, without features or changes.
    /// An open end stops at the current stable release.
    pub async fn get_range(&self, start: Milestone, end: Option<Milestone>) -> ClogResult<Vec<Release>> {
        let end = match end {
            Some(end) => end,
            None => self.channels().await?.stable.mstone,
        };
        let range = MilestoneRange::normalize(start, end, self.floor());

        let mut metas = self
            .collections()
            .release_metas(range.first(), range.end)
            .await?;

        if metas.len() == range.len() {
            metas.sort_by(|a, b| b.milestone.cmp(&a.milestone));
            return Ok(metas.into_iter().map(Release::from_meta).collect());
        }

        self.milestone_details(range.first(), range.end).await?;

        let mut releases = Vec::with_capacity(range.len());
        for milestone in range.milestones().rev() {
            match metas.iter().position(|meta| meta.milestone == milestone) {
                Some(index) => releases.push(Release::from_meta(metas.swap_remove(index))),
                None => {
                    let stable_date = self
                        .cache
                        .milestone(milestone)
                        .and_then(|detail| detail.stable_date);
                    releases.push(Release::new(milestone, stable_date));
                }
            }
        }

        Ok(releases)
    }

    /// Fully populated releases in a range, newest first
    pub async fn get_all_data(
        &self,
        start: Milestone,
        end: Option<Milestone>,
    ) -> ClogResult<Vec<Release>> {
        self.backfill.get_all_data(start, end).await
    }

    /// Releases carrying `tag`, newest first
    pub async fn get_by_tag(&self, tag: &str) -> ClogResult<Vec<Release>> {
        let Some(tag) = self.collections().tag(tag).await? else {
            return Ok(Vec::new());
        };

        let mut releases = Vec::with_capacity(tag.milestones.len());
        for &milestone in tag.milestones.iter().rev() {
            if let Some(meta) = self.collections().release_meta(milestone).await? {
                releases.push(Release::from_meta(meta));
            }
        }

        Ok(releases)
    }

    pub async fn get_tags(&self) -> ClogResult<Vec<Tag>> {
        self.collections().all_tags().await
    }

    /// Attach features and changes to a release
    pub async fn resolve(&self, release: &mut Release) -> ClogResult<()> {
        self.aggregator.resolve(release).await
    }

    /// Flush every collection to its backend
    pub async fn commit(&self) -> ClogResult<()> {
        self.database.commit().await?;
        Ok(())
    }
}
