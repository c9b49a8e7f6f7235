//! Fully populated releases for a range of milestones.
//!
//! Milestones whose meta, features and changes are all stored are rebuilt
//! from the store. Everything else is fetched in one pass: release dates for
//! the range, one feature search per category, and the commit log of each
//! milestone in waves of at most `fan_out` requests.

use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use tracing::Instrument;

use crate::aggregator::{change_records, feature_records, ReleaseAggregator};
use crate::collections::{index_tags, TagIndexUpdate};
use crate::error::{ClogError, ClogResult};
use crate::model::{Change, Feature, Release};
use crate::sources::{feature_range_query, MilestoneDetails};
use crate::tags::release_tags;
use crate::version::Milestone;

/// A normalized milestone range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestoneRange {
    pub start: Milestone,
    pub end: Milestone,
    /// Number of milestones covered, ending at `end`
    pub length: u32,
}

impl MilestoneRange {
    /// Swap reversed bounds and clamp both to `floor`.
    ///
    /// A range covers `end - start` milestones, ending at `end`. Only a range
    /// starting at the floor includes its lower bound, and a range of one
    /// milestone always covers it.
    pub fn normalize(start: Milestone, end: Milestone, floor: Milestone) -> Self {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        let start = start.max(floor);
        let end = end.max(floor);

        let length = if end == start {
            1
        } else if start == floor {
            end - start + 1
        } else {
            end - start
        };

        Self { start, end, length }
    }

    /// First milestone covered
    pub fn first(&self) -> Milestone {
        self.end + 1 - self.length
    }

    pub fn milestones(&self) -> RangeInclusive<Milestone> {
        self.first()..=self.end
    }

    pub fn len(&self) -> usize {
        self.length as usize
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Builds fully populated releases for whole ranges
#[derive(Clone)]
pub struct Backfill {
    aggregator: ReleaseAggregator,
}

impl Backfill {
    pub fn new(aggregator: ReleaseAggregator) -> Self {
        Self { aggregator }
    }

    /// Resolve the end of a range, defaulting to the current stable milestone
    pub async fn range(&self, start: Milestone, end: Option<Milestone>) -> ClogResult<MilestoneRange> {
        let end = match end {
            Some(end) => end,
            None => self.aggregator.sources().metadata.channels().await?.stable.mstone,
        };
        Ok(MilestoneRange::normalize(
            start,
            end,
            self.aggregator.settings().floor,
        ))
    }

    /// Every release in the range with features, changes and tags attached,
    /// newest first
    pub async fn get_all_data(
        &self,
        start: Milestone,
        end: Option<Milestone>,
    ) -> ClogResult<Vec<Release>> {
        let range = self.range(start, end).await?;
        let span = tracing::info_span!("get_all_data", start = range.first(), end = range.end);

        async move {
            let probed = try_join_all(range.milestones().map(|m| self.probe(m))).await?;

            let mut releases = Vec::with_capacity(range.len());
            let mut pending = Vec::new();
            for (milestone, cached) in range.milestones().zip(probed) {
                match cached {
                    Some(release) => releases.push(release),
                    None => pending.push(milestone),
                }
            }

            if pending.is_empty() {
                tracing::debug!(count = releases.len(), "Range fully cached");
            } else {
                tracing::info!(
                    cached = releases.len(),
                    pending = pending.len(),
                    "Fetching uncached releases"
                );
                releases.extend(self.fetch(&pending).await?);
            }

            releases.sort_by(|a, b| b.milestone.cmp(&a.milestone));
            Ok(releases)
        }
        .instrument(span)
        .await
    }

    /// The release of `milestone` rebuilt from the store, if everything it
    /// needs is stored
    async fn probe(&self, milestone: Milestone) -> ClogResult<Option<Release>> {
        let collections = self.aggregator.collections();
        let Some(meta) = collections.release_meta(milestone).await? else {
            return Ok(None);
        };

        let (features, changes) = tokio::try_join!(
            collections.cached_features(milestone),
            collections.cached_changes(milestone)
        )?;

        match (features, changes) {
            (Some(features), Some(changes)) => {
                let mut release = Release::from_meta(meta);
                release.features = Some(features.into_vec());
                release.changes = Some(changes.into_vec());
                Ok(Some(release))
            }
            _ => Ok(None),
        }
    }

    /// Fetch and persist the releases of `pending`, sorted ascending
    async fn fetch(&self, pending: &[Milestone]) -> ClogResult<Vec<Release>> {
        let (Some(&low), Some(&high)) = (pending.first(), pending.last()) else {
            return Ok(Vec::new());
        };

        let (details, mut features, mut changes) = tokio::try_join!(
            self.fetch_details(low, high),
            self.fetch_features(low, high),
            self.fetch_changes(pending)
        )?;

        let mut releases = Vec::with_capacity(pending.len());
        let mut feature_docs = Vec::new();
        let mut change_docs = Vec::new();
        let mut update = TagIndexUpdate::new();

        for &milestone in pending {
            let stable_date = details
                .get(&milestone)
                .and_then(|detail| detail.stable_date.clone());
            let release_features = features.remove(&milestone).unwrap_or_default();
            let release_changes = changes.remove(&milestone).unwrap_or_default();

            let tags = release_tags(&release_features, &release_changes);
            index_tags(&mut update, milestone, &tags);
            feature_docs.extend(feature_records(milestone, &release_features));
            change_docs.extend(change_records(milestone, &release_changes));

            let mut release = Release::new(milestone, stable_date);
            release.tags = Some(tags);
            release.features = Some(release_features);
            release.changes = Some(release_changes);
            releases.push(release);
        }

        let collections = self.aggregator.collections();
        collections.put_features(&feature_docs).await?;
        collections.put_changes(&change_docs).await?;
        collections.merge_tags(update).await?;

        // Metas mark a milestone complete, so they go last
        let metas: Vec<_> = releases.iter().map(Release::meta).collect();
        collections.put_metas(&metas).await?;

        tracing::info!(
            releases = releases.len(),
            features = feature_docs.len(),
            changes = change_docs.len(),
            "Stored fetched releases"
        );
        Ok(releases)
    }

    async fn fetch_details(&self, low: Milestone, high: Milestone) -> ClogResult<MilestoneDetails> {
        self.aggregator.sources().metadata.milestones(low, high).await
    }

    /// Features shipping in `low..=high`, by milestone
    async fn fetch_features(
        &self,
        low: Milestone,
        high: Milestone,
    ) -> ClogResult<BTreeMap<Milestone, Vec<Feature>>> {
        let queries: Vec<String> = self
            .aggregator
            .settings()
            .categories
            .iter()
            .map(|category| feature_range_query(low, high, category))
            .collect();

        let mut buckets: BTreeMap<Milestone, Vec<Feature>> = BTreeMap::new();
        for detail in self.aggregator.sources().search_features(&queries).await? {
            let Some(milestone) = detail.milestone() else {
                continue;
            };
            buckets
                .entry(milestone)
                .or_default()
                .push(detail.into_feature(milestone));
        }

        Ok(buckets)
    }

    /// Counted changes of every pending milestone, one wave at a time
    async fn fetch_changes(
        &self,
        pending: &[Milestone],
    ) -> ClogResult<BTreeMap<Milestone, Vec<Change>>> {
        let sources = self.aggregator.sources();
        let settings = self.aggregator.settings();
        let mut changes = BTreeMap::new();

        for (wave, milestones) in pending.chunks(settings.fan_out.max(1)).enumerate() {
            tracing::debug!(wave, size = milestones.len(), "Fetching commit logs");

            let fetched = try_join_all(milestones.iter().map(|&milestone| async move {
                let counted = sources
                    .counted_changes(milestone, &settings.log_options)
                    .await?;
                Ok::<_, ClogError>((milestone, counted))
            }))
            .await?;

            changes.extend(fetched);
        }

        Ok(changes)
    }
}
