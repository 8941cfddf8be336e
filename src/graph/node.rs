//! Node representation in the document graph

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Unique identifier for a node
///
/// Serializes as a plain string. Structural nodes get sequence-assigned ids
/// (`page-00004`), concepts get content-derived ids (`concept:edge-scoring`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a NodeId from a string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Sequence-assigned id for a node of the given kind
    pub(crate) fn sequenced(kind: NodeKind, seq: u64) -> Self {
        Self(format!("{}-{:05}", kind.as_str(), seq))
    }

    /// Content-derived id for a concept label slug
    pub(crate) fn concept(slug: &str) -> Self {
        Self(format!("concept:{}", slug))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What part of the document a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// The document root; exactly one per graph
    Document,
    /// A TOC entry
    Section,
    /// One document unit (page)
    Page,
    /// A concept discovered lexically or by the intelligence backend
    Concept,
}

impl NodeKind {
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Document,
        NodeKind::Section,
        NodeKind::Page,
        NodeKind::Concept,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Section => "section",
            Self::Page => "page",
            Self::Concept => "concept",
        }
    }

    /// Whether this kind belongs to the document skeleton
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::Concept)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown node kind '{}'", s))
    }
}

/// Node payload: raw text, a generated summary, or both
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl NodeContent {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.summary.is_none()
    }

    /// Summary if present, otherwise the raw text
    pub fn best_text(&self) -> Option<&str> {
        self.summary.as_deref().or(self.text.as_deref())
    }
}

/// A node in the document graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,
    /// Document skeleton role or concept
    pub kind: NodeKind,
    /// Raw text and/or summary
    pub content: NodeContent,
    /// Advisory domain labels; stored and indexed, never interpreted
    pub ontology_tags: BTreeSet<String>,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Logical step at creation
    pub created_at: u64,
    /// Originating unit or section, for traceability only
    pub source_ref: Option<NodeId>,
}

impl Node {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.ontology_tags.contains(tag)
    }

    /// Short human-readable label (first line of the best text, or the id)
    pub fn label(&self) -> &str {
        self.content
            .best_text()
            .and_then(|t| t.lines().map(str::trim).find(|l| !l.is_empty()))
            .unwrap_or(self.id.as_str())
    }
}
