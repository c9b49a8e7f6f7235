//! Cache-first aggregation of one release.
//!
//! Features and changes for a milestone are read from the store first. On a
//! miss they are fetched from the sources and written back, with a sentinel
//! record when nothing qualified, so the next call is a hit.

use std::collections::BTreeSet;

use crate::collections::{index_tags, Collections, TagIndexUpdate};
use crate::config::Settings;
use crate::error::ClogResult;
use crate::model::{
    Cached, Change, ChangeRecord, Feature, FeatureRecord, MilestoneRecord, Release,
};
use crate::sources::{feature_query, Sources};
use crate::tags::release_tags;
use crate::version::Milestone;

/// Resolves features, changes and tags of single releases
#[derive(Clone)]
pub struct ReleaseAggregator {
    collections: Collections,
    sources: Sources,
    settings: Settings,
}

impl ReleaseAggregator {
    pub fn new(collections: Collections, sources: Sources, settings: Settings) -> Self {
        Self {
            collections,
            sources,
            settings,
        }
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Features shipping in `milestone`
    pub async fn get_features(&self, milestone: Milestone) -> ClogResult<Vec<Feature>> {
        if let Some(cached) = self.collections.cached_features(milestone).await? {
            return Ok(cached.into_vec());
        }

        tracing::info!(milestone, "Feature cache miss");
        let queries: Vec<String> = self
            .settings
            .categories
            .iter()
            .map(|category| feature_query(milestone, category))
            .collect();

        let features: Vec<Feature> = self
            .sources
            .search_features(&queries)
            .await?
            .into_iter()
            .map(|detail| detail.into_feature(milestone))
            .filter(|feature| feature.milestone == milestone)
            .collect();

        self.collections
            .put_features(&feature_records(milestone, &features))
            .await?;
        Ok(features)
    }

    /// Counted commits of `milestone`
    pub async fn get_changes(&self, milestone: Milestone) -> ClogResult<Vec<Change>> {
        if let Some(cached) = self.collections.cached_changes(milestone).await? {
            return Ok(cached.into_vec());
        }

        tracing::info!(milestone, "Change cache miss");
        let changes = self
            .sources
            .counted_changes(milestone, &self.settings.log_options)
            .await?;

        self.collections
            .put_changes(&change_records(milestone, &changes))
            .await?;
        Ok(changes)
    }

    /// Attach features and changes, fetching both concurrently
    pub async fn resolve(&self, release: &mut Release) -> ClogResult<()> {
        if release.is_resolved() {
            return Ok(());
        }

        let (features, changes) = tokio::try_join!(
            self.get_features(release.milestone),
            self.get_changes(release.milestone)
        )?;

        release.features = Some(features);
        release.changes = Some(changes);
        Ok(())
    }

    /// Tags of `release`.
    ///
    /// Tags already on the release are returned as is. With `use_cache` the
    /// stored release meta is consulted next. Otherwise the release is
    /// resolved, its tags computed, and both the tag index and the release
    /// meta are written.
    pub async fn get_tags(
        &self,
        release: &mut Release,
        use_cache: bool,
    ) -> ClogResult<BTreeSet<String>> {
        if let Some(tags) = &release.tags {
            return Ok(tags.clone());
        }

        if use_cache {
            let stored = self.collections.release_meta(release.milestone).await?;
            if let Some(tags) = stored.and_then(|meta| meta.tags) {
                release.tags = Some(tags.clone());
                return Ok(tags);
            }
        }

        self.resolve(release).await?;
        let tags = release_tags(
            release.features.as_deref().unwrap_or_default(),
            release.changes.as_deref().unwrap_or_default(),
        );

        let mut update = TagIndexUpdate::new();
        index_tags(&mut update, release.milestone, &tags);
        self.collections.merge_tags(update).await?;

        release.tags = Some(tags.clone());
        self.collections.put_metas(&[release.meta()]).await?;
        Ok(tags)
    }
}

/// Records to persist for the features of `milestone`, or its sentinel
pub fn feature_records(milestone: Milestone, features: &[Feature]) -> Vec<FeatureRecord> {
    records(milestone, features)
}

/// Records to persist for the changes of `milestone`, or its sentinel
pub fn change_records(milestone: Milestone, changes: &[Change]) -> Vec<ChangeRecord> {
    records(milestone, changes)
}

fn records<R>(milestone: Milestone, items: &[R::Item]) -> Vec<R>
where
    R: MilestoneRecord,
    R::Item: Clone,
{
    match Cached::from_fetched(items.to_vec()) {
        Cached::Empty => vec![R::none(milestone)],
        Cached::Populated(items) => items.into_iter().map(R::from_item).collect(),
    }
}
