//! The four collections the pipeline persists to, and typed access to them.

use clog_store::{Database, Document, DocumentCollection};
use futures::TryStreamExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::ClogResult;
use crate::model::{
    milestone_query, Cached, Change, ChangeRecord, Feature, FeatureRecord, MilestoneRecord,
    ReleaseMeta, Tag,
};
use crate::version::{to_version, Milestone};

pub const RELEASES: &str = "v8_releases";
pub const FEATURES: &str = "v8_features";
pub const CHANGES: &str = "v8_changes";
pub const TAGS: &str = "v8_tags";

/// Tag name to the milestones newly carrying it
pub type TagIndexUpdate = BTreeMap<String, BTreeSet<Milestone>>;

/// Handles on the release, feature, change and tag collections
#[derive(Clone)]
pub struct Collections {
    pub releases: Arc<dyn DocumentCollection>,
    pub features: Arc<dyn DocumentCollection>,
    pub changes: Arc<dyn DocumentCollection>,
    pub tags: Arc<dyn DocumentCollection>,
}

impl Collections {
    pub fn open(database: &Database) -> Self {
        Self {
            releases: database.collection(RELEASES),
            features: database.collection(FEATURES),
            changes: database.collection(CHANGES),
            tags: database.collection(TAGS),
        }
    }

    pub async fn release_meta(&self, milestone: Milestone) -> ClogResult<Option<ReleaseMeta>> {
        match self.releases.get_safely(&to_version(milestone)).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Every stored release meta with a milestone in `start..=end`
    pub async fn release_metas(&self, start: Milestone, end: Milestone) -> ClogResult<Vec<ReleaseMeta>> {
        let in_range = move |doc: &Document| {
            doc.get("milestone")
                .and_then(serde_json::Value::as_u64)
                .map_or(false, |m| m >= u64::from(start) && m <= u64::from(end))
        };

        let docs = self.releases.query(&in_range).await?;
        Ok(docs
            .iter()
            .map(Document::decode)
            .collect::<Result<Vec<ReleaseMeta>, _>>()?)
    }

    pub async fn put_metas(&self, metas: &[ReleaseMeta]) -> ClogResult<()> {
        let docs = metas
            .iter()
            .map(|meta| Document::encode(meta.document_id(), meta))
            .collect::<Result<Vec<_>, _>>()?;
        self.releases.put_all(docs).await?;
        Ok(())
    }

    pub async fn cached_features(
        &self,
        milestone: Milestone,
    ) -> ClogResult<Option<Cached<Feature>>> {
        cached::<FeatureRecord>(self.features.as_ref(), milestone).await
    }

    pub async fn cached_changes(
        &self,
        milestone: Milestone,
    ) -> ClogResult<Option<Cached<Change>>> {
        cached::<ChangeRecord>(self.changes.as_ref(), milestone).await
    }

    pub async fn put_features(&self, records: &[FeatureRecord]) -> ClogResult<()> {
        put_records(self.features.as_ref(), records).await
    }

    pub async fn put_changes(&self, records: &[ChangeRecord]) -> ClogResult<()> {
        put_records(self.changes.as_ref(), records).await
    }

    pub async fn tag(&self, name: &str) -> ClogResult<Option<Tag>> {
        match self.tags.get_safely(&name.to_lowercase()).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Every tag in the index, by name
    pub async fn all_tags(&self) -> ClogResult<Vec<Tag>> {
        let docs: Vec<Document> = self.tags.get_all().try_collect().await?;
        let mut tags = docs
            .iter()
            .map(Document::decode)
            .collect::<Result<Vec<Tag>, _>>()?;

        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    /// Merge new milestones into the tag index with one batch write
    pub async fn merge_tags(&self, update: TagIndexUpdate) -> ClogResult<()> {
        if update.is_empty() {
            return Ok(());
        }

        let mut docs = Vec::with_capacity(update.len());
        for (name, milestones) in update {
            let mut tag = self.tag(&name).await?.unwrap_or_else(|| Tag::new(&name));
            tag.add(milestones);
            docs.push(tag.to_document()?);
        }

        tracing::debug!(count = docs.len(), "Updating tag index");
        self.tags.put_all(docs).await?;
        Ok(())
    }

    pub async fn commit(&self) -> ClogResult<()> {
        for collection in [&self.releases, &self.features, &self.changes, &self.tags] {
            collection.commit().await?;
        }
        Ok(())
    }
}

/// Add one milestone's tags to an index update
pub fn index_tags(update: &mut TagIndexUpdate, milestone: Milestone, tags: &BTreeSet<String>) {
    for tag in tags {
        update.entry(tag.clone()).or_default().insert(milestone);
    }
}

async fn cached<R: MilestoneRecord>(
    collection: &dyn DocumentCollection,
    milestone: Milestone,
) -> ClogResult<Option<Cached<R::Item>>> {
    let query = milestone_query(milestone);
    let docs = collection.query(&query).await?;

    let records = docs
        .iter()
        .map(R::from_document)
        .collect::<Result<Vec<R>, _>>()?;

    Ok(Cached::from_records(records))
}

async fn put_records<R: MilestoneRecord>(
    collection: &dyn DocumentCollection,
    records: &[R],
) -> ClogResult<()> {
    if records.is_empty() {
        return Ok(());
    }

    let docs = records
        .iter()
        .map(R::to_document)
        .collect::<Result<Vec<_>, _>>()?;
    collection.put_all(docs).await?;
    Ok(())
}
