//! Predicates deciding whether a commit counts towards a release.

use crate::model::{Change, Signature};

/// Automation accounts whose commits are never counted
const BLOCKED_AUTHORS: &[&str] = &[
    "v8 autoroll",
    "v8-ci-autoroll-builder",
    "chromium-autoroll",
    "gserviceaccount.com",
];

/// Administrative subject prefixes (lowercase)
const ADMIN_PREFIXES: &[&str] = &[
    "merged",
    "merge r",
    "merge:",
    "port r",
    "revision ",
    "push version",
    "update v8",
    "create v8",
    "changed version",
    "version ",
    "squashed",
    "branch cut",
    "bump",
    "revert",
    "reland",
    "re-land",
    "rollback",
    "rename",
    "[release",
];

/// Substrings that make a subject irrelevant anywhere (lowercase)
const IRRELEVANT_SUBSTRINGS: &[&str] = &[
    "cherry-pick",
    "cherry pick",
    "owners",
    "[docs]",
    "docs:",
];

/// False for commits made by automation accounts
pub fn is_author(author: &Signature) -> bool {
    let name = author.name.to_lowercase();
    let email = author.email.to_lowercase();

    !BLOCKED_AUTHORS
        .iter()
        .any(|blocked| name.contains(blocked) || email.contains(blocked))
}

/// False for administrative subjects. Expects a lowercased subject.
pub fn is_relevant(subject_lower: &str) -> bool {
    let subject = subject_lower.trim_start();

    if subject.starts_with(|c: char| c.is_ascii_digit()) {
        return false;
    }
    if ADMIN_PREFIXES.iter().any(|prefix| subject.starts_with(prefix)) {
        return false;
    }

    !IRRELEVANT_SUBSTRINGS
        .iter()
        .any(|noise| subject.contains(noise))
}

/// Both predicates hold for this change
pub fn is_counted(change: &Change) -> bool {
    is_author(&change.author) && is_relevant(&change.subject().to_lowercase())
}
