//! Edge representation and the relationship catalog

use super::node::NodeId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an edge
///
/// Derived from the edge's (source, type, target) key, so the same
/// relationship always gets the same id across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    /// Create an EdgeId from a string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Deterministic id for an edge key (UUID v5)
    pub fn for_key(key: &EdgeKey) -> Self {
        let name = format!(
            "docgraph:edge:{}:{}:{}",
            key.source,
            key.relationship.as_str(),
            key.target
        );
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed catalog of relationship types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Contains,
    Precedes,
    RelatesTo,
    References,
    Supports,
    Contradicts,
    Defines,
}

/// Static properties of a relationship type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelationshipProperties {
    /// Whether source → target order is meaningful
    pub directional: bool,
    /// Linear per-step decay; 0 means the type never decays
    pub strength_decay: f64,
    /// Confidence assigned to non-semantic edges of this type
    pub default_confidence: f64,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 7] = [
        RelationshipType::Contains,
        RelationshipType::Precedes,
        RelationshipType::RelatesTo,
        RelationshipType::References,
        RelationshipType::Supports,
        RelationshipType::Contradicts,
        RelationshipType::Defines,
    ];

    pub fn properties(&self) -> RelationshipProperties {
        let (directional, strength_decay, default_confidence) = match self {
            Self::Contains => (true, 0.0, 1.0),
            Self::Precedes => (true, 0.0, 1.0),
            Self::Defines => (true, 0.0, 0.8),
            Self::References => (true, 0.02, 0.7),
            Self::Supports => (true, 0.03, 0.6),
            Self::Contradicts => (false, 0.03, 0.6),
            Self::RelatesTo => (false, 0.05, 0.5),
        };
        RelationshipProperties {
            directional,
            strength_decay,
            default_confidence,
        }
    }

    pub fn is_directional(&self) -> bool {
        self.properties().directional
    }

    pub fn strength_decay(&self) -> f64 {
        self.properties().strength_decay
    }

    pub fn default_confidence(&self) -> f64 {
        self.properties().default_confidence
    }

    /// Types that encode document layout rather than meaning
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Contains | Self::Precedes)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Precedes => "precedes",
            Self::RelatesTo => "relates_to",
            Self::References => "references",
            Self::Supports => "supports",
            Self::Contradicts => "contradicts",
            Self::Defines => "defines",
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;

    /// Accepts the catalog names plus a few spellings backends tend to use
    /// ("relates to", "related-to", "REFERENCES").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        let rel = match normalized.as_str() {
            "contains" | "contain" | "part_of_parent" => Self::Contains,
            "precedes" | "precede" | "followed_by" => Self::Precedes,
            "relates_to" | "related_to" | "relates" | "related" => Self::RelatesTo,
            "references" | "reference" | "refers_to" | "cites" => Self::References,
            "supports" | "support" | "supported_by" => Self::Supports,
            "contradicts" | "contradict" | "conflicts_with" => Self::Contradicts,
            "defines" | "define" | "defined_by" => Self::Defines,
            _ => return Err(format!("unknown relationship type '{}'", s)),
        };
        Ok(rel)
    }
}

/// Identity of an edge: (source, target, type)
///
/// Non-directional types are canonicalized so that the smaller node id is
/// always the source; `a relates_to b` and `b relates_to a` share one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub source: NodeId,
    pub target: NodeId,
    pub relationship: RelationshipType,
}

impl EdgeKey {
    pub fn new(source: NodeId, target: NodeId, relationship: RelationshipType) -> Self {
        let (source, target) = if !relationship.is_directional() && target < source {
            (target, source)
        } else {
            (source, target)
        };
        Self {
            source,
            target,
            relationship,
        }
    }
}

/// A typed, weighted relationship between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique identifier
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub relationship_type: RelationshipType,
    /// Pre-weighting score from lexical analysis or backend confidence
    pub base_score: f64,
    /// Proposed by the enhancement phase rather than lexical analysis
    pub is_semantic: bool,
    /// Current effective score; only the scorer writes this
    pub(crate) weight: f64,
    /// Confidence in the relationship (0.0 - 1.0)
    pub confidence: f64,
    /// Logical step at creation
    pub created_at: u64,
}

impl Edge {
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(
            self.source_id.clone(),
            self.target_id.clone(),
            self.relationship_type,
        )
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// A zero-weight edge is kept but ignored by traversal
    pub fn is_retired(&self) -> bool {
        self.weight <= 0.0
    }

    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source_id == node || &self.target_id == node
    }

    /// The node reachable from `from` along this edge, honoring direction
    pub fn neighbor_from(&self, from: &NodeId) -> Option<&NodeId> {
        if &self.source_id == from {
            Some(&self.target_id)
        } else if &self.target_id == from && !self.relationship_type.is_directional() {
            Some(&self.source_id)
        } else {
            None
        }
    }

    /// Steps elapsed since creation
    pub fn age_at(&self, current_step: u64) -> u64 {
        current_step.saturating_sub(self.created_at)
    }
}
