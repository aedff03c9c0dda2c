//! Wire models for the paper/entity REST contract
//!
//! Field names match the backend payloads exactly. The entity/paper
//! association arrives in one of two shapes depending on the endpoint:
//! paper-first (papers embedding their entity occurrences) or entity-first
//! (entities embedding their paper occurrences). [`EntityFeed`] is the
//! tagged union the index builder normalizes from.

use serde::{Deserialize, Serialize};

/// A paper record as served by `GET /papers/` and `GET /papers/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub paper_id: i64,
    pub paper_name: String,

    /// Embedded occurrence links (paper-first shape). Not every endpoint
    /// includes them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<PaperEntity>>,
}

/// An entity occurrence embedded in a paper record (paper-first shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperEntity {
    pub entity_id: i64,
    pub entity_name: String,
    pub entity_type: String,
    pub count: u64,
}

/// An entity record as served by `GET /entities/` and `GET /entities/search/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: i64,
    pub entity_name: String,
    pub entity_type: String,

    /// Embedded occurrence links (entity-first shape).
    #[serde(default)]
    pub papers: Vec<EntityPaper>,
}

/// A paper occurrence embedded in an entity record (entity-first shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPaper {
    pub paper_id: i64,
    pub paper_name: String,
    pub count: u64,
}

/// The two wire shapes the backend serves the association in.
///
/// The index builder accepts either and normalizes before aggregating, so
/// no downstream code ever branches on the shape.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityFeed {
    /// Paper-first: papers with embedded entity occurrences.
    Papers(Vec<Paper>),
    /// Entity-first: entities with embedded paper occurrences.
    Entities(Vec<Entity>),
}

/// Acknowledgment body returned by `DELETE /papers/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteAck {
    pub message: String,
}

/// Graph payload served by `GET /graph/`. Passed through to the
/// presentation layer verbatim; layout is not this crate's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPayload {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub value: u64,
}
