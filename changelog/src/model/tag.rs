use clog_store::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::version::Milestone;

/// Index entry: every milestone carrying a tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub milestones: BTreeSet<Milestone>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            milestones: BTreeSet::new(),
        }
    }

    pub fn add(&mut self, milestones: impl IntoIterator<Item = Milestone>) {
        self.milestones.extend(milestones);
    }

    pub fn to_document(&self) -> clog_store::Result<Document> {
        Document::encode(self.name.to_lowercase(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_deduplicates() {
        let mut tag = Tag::new("WebAssembly");
        tag.add([114, 113]);
        tag.add([114, 115]);

        assert_eq!(tag.name, "webassembly");
        assert_eq!(tag.milestones.into_iter().collect::<Vec<_>>(), vec![113, 114, 115]);
    }

    #[test]
    fn test_document_id_is_lowercase_name() {
        let tag = Tag::new("Maglev");
        assert_eq!(tag.to_document().unwrap().id, "maglev");
    }
}
