//! Entity index builder
//!
//! Reconciles raw per-paper occurrence records into a de-duplicated,
//! entity-centric index. Accepts either wire shape the backend serves
//! (paper-first or entity-first), normalizes to occurrence-link triples,
//! then groups by entity. For a fixed feed the build is deterministic and
//! idempotent: same entities, same per-paper counts, same ordering.

use paperscope_common::{
    models::{Entity, EntityFeed},
    IntegrityWarning,
};
use std::collections::BTreeMap;

/// The atomic unit the backend emits: entity E appeared `count` times in
/// paper P. Never assumed to arrive pre-aggregated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccurrenceLink {
    pub entity_id: i64,
    pub entity_name: String,
    pub entity_type: String,
    pub paper_id: i64,
    pub paper_name: String,
    pub count: u64,
}

/// One row of an entry's per-paper breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperOccurrence {
    pub paper_id: i64,
    pub paper_name: String,
    pub count: u64,
}

/// One distinct entity with every paper it appears in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub entity_id: i64,
    pub entity_name: String,
    pub entity_type: String,
    /// Per-paper breakdown, ordered by paper id.
    pub papers: Vec<PaperOccurrence>,
}

impl IndexEntry {
    /// Total occurrence count across all papers. Derived, never stored.
    pub fn total_count(&self) -> u64 {
        self.papers.iter().map(|p| p.count).sum()
    }

    /// Number of distinct papers this entity appears in.
    pub fn paper_count(&self) -> usize {
        self.papers.len()
    }

    /// Whether any occurrence references the given paper.
    pub fn mentions_paper(&self, paper_id: i64) -> bool {
        self.papers.iter().any(|p| p.paper_id == paper_id)
    }

    /// Map a server-provided entity record verbatim, preserving the order
    /// its paper breakdown arrived in. Used for remote search results,
    /// which are trusted as served.
    pub fn from_entity(entity: &Entity) -> Self {
        Self {
            entity_id: entity.entity_id,
            entity_name: entity.entity_name.clone(),
            entity_type: entity.entity_type.clone(),
            papers: entity
                .papers
                .iter()
                .map(|p| PaperOccurrence {
                    paper_id: p.paper_id,
                    paper_name: p.paper_name.clone(),
                    count: p.count,
                })
                .collect(),
        }
    }
}

/// The in-memory, rebuildable, entity-centric aggregation of occurrence
/// links. Keyed by entity id so iteration order is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityIndex {
    entries: BTreeMap<i64, IndexEntry>,
    warnings: Vec<IntegrityWarning>,
}

/// Flatten either wire shape into occurrence-link triples.
///
/// Entities without any links (possible in the entity-first shape) produce
/// no triples here; [`EntityIndex::build`] seeds them separately so they
/// are not silently dropped.
pub fn normalize(feed: &EntityFeed) -> Vec<OccurrenceLink> {
    match feed {
        EntityFeed::Papers(papers) => papers
            .iter()
            .flat_map(|paper| {
                paper.entities.iter().flatten().map(|occ| OccurrenceLink {
                    entity_id: occ.entity_id,
                    entity_name: occ.entity_name.clone(),
                    entity_type: occ.entity_type.clone(),
                    paper_id: paper.paper_id,
                    paper_name: paper.paper_name.clone(),
                    count: occ.count,
                })
            })
            .collect(),
        EntityFeed::Entities(entities) => entities
            .iter()
            .flat_map(|entity| {
                entity.papers.iter().map(|occ| OccurrenceLink {
                    entity_id: entity.entity_id,
                    entity_name: entity.entity_name.clone(),
                    entity_type: entity.entity_type.clone(),
                    paper_id: occ.paper_id,
                    paper_name: occ.paper_name.clone(),
                    count: occ.count,
                })
            })
            .collect(),
    }
}

impl EntityIndex {
    /// Build the index from a feed in either wire shape.
    ///
    /// Duplicate (entity, paper) links are resolved last-write-wins and
    /// surfaced as warnings; counts are never summed across duplicates.
    /// Entities with zero linked papers are kept and surfaced as warnings.
    pub fn build(feed: &EntityFeed) -> Self {
        let mut entries: BTreeMap<i64, IndexEntry> = BTreeMap::new();
        let mut warnings = Vec::new();

        // Seed from the entity roster when we have one, so zero-paper
        // entities survive normalization.
        if let EntityFeed::Entities(list) = feed {
            for entity in list {
                entries.entry(entity.entity_id).or_insert_with(|| IndexEntry {
                    entity_id: entity.entity_id,
                    entity_name: entity.entity_name.clone(),
                    entity_type: entity.entity_type.clone(),
                    papers: Vec::new(),
                });
            }
        }

        for link in normalize(feed) {
            let entry = entries.entry(link.entity_id).or_insert_with(|| IndexEntry {
                entity_id: link.entity_id,
                entity_name: link.entity_name.clone(),
                entity_type: link.entity_type.clone(),
                papers: Vec::new(),
            });

            if let Some(existing) = entry
                .papers
                .iter_mut()
                .find(|p| p.paper_id == link.paper_id)
            {
                // Duplicate links mean an upstream bug; keep the later one
                // and surface the inconsistency instead of summing.
                let warning = IntegrityWarning::DuplicateOccurrence {
                    entity_id: link.entity_id,
                    paper_id: link.paper_id,
                    kept_count: link.count,
                    discarded_count: existing.count,
                };
                tracing::warn!(warning = %warning, "data integrity issue in feed");
                warnings.push(warning);
                existing.paper_name = link.paper_name;
                existing.count = link.count;
            } else {
                entry.papers.push(PaperOccurrence {
                    paper_id: link.paper_id,
                    paper_name: link.paper_name,
                    count: link.count,
                });
            }
        }

        for entry in entries.values_mut() {
            entry.papers.sort_by_key(|p| p.paper_id);
            if entry.papers.is_empty() {
                let warning = IntegrityWarning::OrphanEntity {
                    entity_id: entry.entity_id,
                    entity_name: entry.entity_name.clone(),
                };
                tracing::warn!(warning = %warning, "data integrity issue in feed");
                warnings.push(warning);
            }
        }

        Self { entries, warnings }
    }

    /// Entries in ascending entity-id order.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn get(&self, entity_id: i64) -> Option<&IndexEntry> {
        self.entries.get(&entity_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Integrity warnings recorded during the build. Non-fatal; the index
    /// above them is still the best-effort aggregation of the feed.
    pub fn warnings(&self) -> &[IntegrityWarning] {
        &self.warnings
    }
}
