//! Search/filter engine
//!
//! Applies free-text and type predicates against the entity index, or
//! describes the remote delegation the store performs when the index is too
//! large to filter client-side. Result ordering is stable with ties broken
//! by identifier so pagination is deterministic across repeated queries.

use crate::index::{EntityIndex, IndexEntry};
use paperscope_common::models::Paper;

/// The two predicates a search carries: free text matched case-insensitively
/// as a substring of the display name, and an exact type tag. Both are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityQuery {
    pub text: String,
    pub entity_type: Option<String>,
}

impl EntityQuery {
    pub fn new(text: impl Into<String>, entity_type: Option<String>) -> Self {
        Self {
            text: text.into(),
            entity_type,
        }
    }

    /// An empty query string with no type filter selects everything.
    pub fn is_unfiltered(&self) -> bool {
        self.text.is_empty() && self.entity_type.is_none()
    }

    fn matches(&self, entry: &IndexEntry) -> bool {
        if let Some(ty) = &self.entity_type {
            if entry.entity_type != *ty {
                return false;
            }
        }
        self.text.is_empty()
            || entry
                .entity_name
                .to_lowercase()
                .contains(&self.text.to_lowercase())
    }
}

/// Where a result set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Filtered client-side against the in-memory index.
    Local,
    /// Returned verbatim by the server-side search endpoint.
    Remote,
}

/// Ordered result set with the total used for pagination. Recomputed per
/// query, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResults {
    pub entries: Vec<IndexEntry>,
    pub total: usize,
    pub mode: SearchMode,
}

impl SearchResults {
    pub fn new(entries: Vec<IndexEntry>, mode: SearchMode) -> Self {
        let total = entries.len();
        Self {
            entries,
            total,
            mode,
        }
    }
}

/// Filter the index client-side. Entries keep the index's ascending-id
/// order, which already makes identical queries return identical sequences.
pub fn filter_entities(index: &EntityIndex, query: &EntityQuery) -> SearchResults {
    let entries: Vec<IndexEntry> = index
        .entries()
        .filter(|entry| query.matches(entry))
        .cloned()
        .collect();
    SearchResults::new(entries, SearchMode::Local)
}

/// Case-insensitive substring filter over paper display names, ordered by
/// paper id.
pub fn filter_papers<'a>(papers: &'a [Paper], text: &str) -> Vec<&'a Paper> {
    let needle = text.to_lowercase();
    let mut matched: Vec<&Paper> = papers
        .iter()
        .filter(|p| needle.is_empty() || p.paper_name.to_lowercase().contains(&needle))
        .collect();
    matched.sort_by_key(|p| p.paper_id);
    matched
}
