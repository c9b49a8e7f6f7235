use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{Change, Feature};
use crate::version::{to_version, Milestone};

/// Persisted projection of a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMeta {
    pub milestone: Milestone,
    #[serde(default)]
    pub stable_date: Option<String>,
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
}

impl ReleaseMeta {
    pub fn document_id(&self) -> String {
        to_version(self.milestone)
    }
}

/// One published version. `None` fields are not yet resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub milestone: Milestone,
    pub version: String,
    pub stable_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<Feature>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<Change>>,
}

impl Release {
    pub fn new(milestone: Milestone, stable_date: Option<String>) -> Self {
        Self {
            milestone,
            version: to_version(milestone),
            stable_date,
            tags: None,
            features: None,
            changes: None,
        }
    }

    pub fn from_meta(meta: ReleaseMeta) -> Self {
        let mut release = Self::new(meta.milestone, meta.stable_date);
        release.tags = meta.tags;
        release
    }

    /// Minimal projection stored in the release collection
    pub fn meta(&self) -> ReleaseMeta {
        ReleaseMeta {
            milestone: self.milestone,
            stable_date: self.stable_date.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Features and changes have both been attached
    pub fn is_resolved(&self) -> bool {
        self.features.is_some() && self.changes.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_derives_version() {
        let release = Release::new(114, Some("2023-05-30T00:00:00".to_string()));
        assert_eq!(release.version, "11.4");
        assert!(!release.is_resolved());
    }

    #[test]
    fn test_meta_round_trip() {
        let mut release = Release::new(120, None);
        release.tags = Some(["v8".to_string()].into_iter().collect());

        let meta = release.meta();
        assert_eq!(meta.document_id(), "12.0");
        assert_eq!(meta.stable_date, None);

        let back = Release::from_meta(meta);
        assert_eq!(back.tags, release.tags);
        assert!(back.features.is_none());
    }

    #[test]
    fn test_unresolved_fields_are_omitted_from_json() {
        let json = serde_json::to_value(Release::new(120, None)).unwrap();
        assert!(json.get("features").is_none());
        assert!(json["stable_date"].is_null());
    }
}
