//! Topical tag classification for commit subjects and feature categories.
//!
//! Classification runs three stages over the text, all adding to one set:
//!
//! 1. **Prefix**: `heap, api: Do something` yields `heap` and `api`
//! 2. **Brackets**: `[maglev][arm64] Do something` yields `maglev` and `arm64`
//! 3. **Keywords**: a fixed ordered table of substrings in the lowercased text
//!
//! Every extracted piece passes through [`normalize_tag`]. The base tag is
//! always present. Classification is pure.

pub mod rules;

use std::collections::BTreeSet;

use crate::model::{Change, Feature};
use rules::{BASE_TAG, EXCLUDED, EXCLUDED_SUBSTRINGS, KEYWORDS, SYNONYMS};

/// Normalize one candidate tag, or reject it.
///
/// Pieces containing whitespace, excluded words, noise substrings and bare
/// numbers are rejected. Synonyms are rewritten to their canonical form.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let tag = raw.trim().to_lowercase();

    if tag.is_empty() || tag.chars().any(char::is_whitespace) {
        return None;
    }
    if EXCLUDED.contains(&tag.as_str()) {
        return None;
    }
    if EXCLUDED_SUBSTRINGS.iter().any(|noise| tag.contains(noise)) {
        return None;
    }
    if tag.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let canonical = SYNONYMS
        .iter()
        .find(|(alias, _)| *alias == tag)
        .map(|(_, canonical)| canonical.to_string());

    Some(canonical.unwrap_or(tag))
}

/// Tags of a commit subject or any other free text
pub fn classify(text: &str) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();

    if !text.trim_start().starts_with('[') {
        if let Some(end) = prefix_end(text) {
            add_pieces(&mut tags, &text[..end]);
        }
    }

    for group in bracket_groups(text) {
        add_pieces(&mut tags, &group);
    }

    let lower = text.to_lowercase();
    for (keyword, tag) in KEYWORDS {
        if !tags.contains(*tag) && lower.contains(keyword) {
            tags.insert(tag.to_string());
        }
    }

    tags.insert(BASE_TAG.to_string());
    tags
}

/// Tag for a feature category (`"WebAssembly" -> "webassembly"`)
pub fn classify_category(category: &str) -> Option<String> {
    let joined = category.split_whitespace().collect::<Vec<_>>().join("-");
    normalize_tag(&joined)
}

/// Tags of a whole release: feature categories plus every change subject
pub fn release_tags(features: &[Feature], changes: &[Change]) -> BTreeSet<String> {
    let mut tags: BTreeSet<String> = features
        .iter()
        .filter_map(|feature| classify_category(&feature.category))
        .collect();

    for change in changes {
        tags.extend(classify(change.subject()));
    }

    tags.insert(BASE_TAG.to_string());
    tags
}

/// Position of the first colon that ends a tag prefix. Colons that are
/// doubled (`std::vector`) or followed by a slash (`https://`) don't count.
fn prefix_end(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        if b != b':' {
            continue;
        }
        let next = bytes.get(i + 1).copied();
        let prev = i.checked_sub(1).map(|p| bytes[p]);
        if matches!(next, Some(b':') | Some(b'/')) || prev == Some(b':') {
            continue;
        }
        return Some(i);
    }

    None
}

/// Contents of every `[...]` group. An opening bracket inside a group
/// restarts it.
fn bracket_groups(text: &str) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current: Option<String> = None;

    for ch in text.chars() {
        match ch {
            '[' => current = Some(String::new()),
            ']' => {
                if let Some(group) = current.take() {
                    groups.push(group);
                }
            }
            c => {
                if let Some(group) = current.as_mut() {
                    group.push(c);
                }
            }
        }
    }

    groups
}

fn add_pieces(tags: &mut BTreeSet<String>, text: &str) {
    tags.extend(text.split([',', '/']).filter_map(normalize_tag));
}
