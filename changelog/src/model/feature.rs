use serde::{Deserialize, Serialize};

use super::MilestoneRecord;
use crate::version::{to_version, Milestone};

/// A capability flag entry shipped in one milestone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub id: u64,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub flag_name: Option<String>,
    #[serde(default)]
    pub summary: String,
    pub milestone: Milestone,
}

/// Stored form of a [`Feature`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureRecord {
    Feature(Feature),
    None { milestone: Milestone },
}

impl MilestoneRecord for FeatureRecord {
    type Item = Feature;

    fn none(milestone: Milestone) -> Self {
        FeatureRecord::None { milestone }
    }

    fn from_item(item: Feature) -> Self {
        FeatureRecord::Feature(item)
    }

    fn into_item(self) -> Option<Feature> {
        match self {
            FeatureRecord::Feature(feature) => Some(feature),
            FeatureRecord::None { .. } => None,
        }
    }

    fn milestone(&self) -> Milestone {
        match self {
            FeatureRecord::Feature(feature) => feature.milestone,
            FeatureRecord::None { milestone } => *milestone,
        }
    }

    fn document_id(&self) -> String {
        match self {
            FeatureRecord::Feature(feature) => feature.id.to_string(),
            FeatureRecord::None { milestone } => to_version(*milestone),
        }
    }
}
