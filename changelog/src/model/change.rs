use serde::{Deserialize, Serialize};

use super::MilestoneRecord;
use crate::version::{to_version, Milestone};

/// Author or committer of a commit
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// ISO-8601 timestamp
    pub date: String,
}

/// A commit counted towards one milestone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub commit: String,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
    pub milestone: Milestone,
}

impl Change {
    /// First line of the message
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }

    /// Everything after the first line
    pub fn body(&self) -> &str {
        self.message
            .split_once('\n')
            .map(|(_, body)| body.trim())
            .unwrap_or("")
    }
}

/// Stored form of a [`Change`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeRecord {
    Change(Change),
    None { milestone: Milestone },
}

impl MilestoneRecord for ChangeRecord {
    type Item = Change;

    fn none(milestone: Milestone) -> Self {
        ChangeRecord::None { milestone }
    }

    fn from_item(item: Change) -> Self {
        ChangeRecord::Change(item)
    }

    fn into_item(self) -> Option<Change> {
        match self {
            ChangeRecord::Change(change) => Some(change),
            ChangeRecord::None { .. } => None,
        }
    }

    fn milestone(&self) -> Milestone {
        match self {
            ChangeRecord::Change(change) => change.milestone,
            ChangeRecord::None { milestone } => *milestone,
        }
    }

    fn document_id(&self) -> String {
        match self {
            ChangeRecord::Change(change) => change.commit.clone(),
            ChangeRecord::None { milestone } => to_version(*milestone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(message: &str) -> Change {
        Change {
            commit: "4f1c2a".to_string(),
            author: Signature::default(),
            committer: Signature::default(),
            message: message.to_string(),
            milestone: 114,
        }
    }

    #[test]
    fn test_subject_and_body() {
        let c = change("[maglev] Inline Array.prototype.at\n\nBug: v8:12345\n");
        assert_eq!(c.subject(), "[maglev] Inline Array.prototype.at");
        assert_eq!(c.body(), "Bug: v8:12345");
    }

    #[test]
    fn test_single_line_message() {
        let c = change("Fix typo");
        assert_eq!(c.subject(), "Fix typo");
        assert_eq!(c.body(), "");
    }

    #[test]
    fn test_record_round_trip_through_document() {
        let record = ChangeRecord::from_item(change("[heap] Shrink new space"));
        let doc = record.to_document().unwrap();
        assert_eq!(doc.id, "4f1c2a");
        assert_eq!(ChangeRecord::from_document(&doc).unwrap(), record);
    }
}
