//! JSON serialization of a finished graph
//!
//! ```text
//! {"nodes":    {"<id>": {"type", "content", "ontology_tags", "confidence", ...}},
//!  "edges":    {"<id>": {"source_id", "target_id", "type", "weight", "confidence", ...}},
//!  "metadata": {"created_at", "total_nodes", "total_edges"}}
//! ```

use super::traits::StorageResult;
use crate::graph::{Edge, EdgeId, KnowledgeGraph, Node, NodeContent, NodeId, NodeKind, RelationshipType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// On-disk form of a [`KnowledgeGraph`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: BTreeMap<NodeId, NodeEntry>,
    pub edges: BTreeMap<EdgeId, EdgeEntry>,
    pub metadata: GraphMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub content: NodeContent,
    pub ontology_tags: BTreeSet<String>,
    pub confidence: f64,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeEntry {
    pub source_id: NodeId,
    pub target_id: NodeId,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    pub weight: f64,
    pub confidence: f64,
    pub base_score: f64,
    #[serde(default)]
    pub is_semantic: bool,
    #[serde(default)]
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub created_at: DateTime<Utc>,
    pub total_nodes: usize,
    pub total_edges: usize,
}

impl GraphDocument {
    pub fn from_graph(graph: &KnowledgeGraph) -> Self {
        let nodes = graph
            .nodes()
            .map(|n| {
                let entry = NodeEntry {
                    kind: n.kind,
                    content: n.content.clone(),
                    ontology_tags: n.ontology_tags.clone(),
                    confidence: n.confidence,
                    created_at: n.created_at,
                    source_ref: n.source_ref.clone(),
                };
                (n.id.clone(), entry)
            })
            .collect();
        let edges = graph
            .edges()
            .map(|e| {
                let entry = EdgeEntry {
                    source_id: e.source_id.clone(),
                    target_id: e.target_id.clone(),
                    relationship_type: e.relationship_type,
                    weight: e.weight(),
                    confidence: e.confidence,
                    base_score: e.base_score,
                    is_semantic: e.is_semantic,
                    created_at: e.created_at,
                };
                (e.id.clone(), entry)
            })
            .collect();
        Self {
            nodes,
            edges,
            metadata: GraphMetadata {
                created_at: Utc::now(),
                total_nodes: graph.node_count(),
                total_edges: graph.edge_count(),
            },
        }
    }

    /// Rebuild the graph, checking every invariant
    pub fn into_graph(self) -> StorageResult<KnowledgeGraph> {
        let nodes = self.nodes.into_iter().map(|(id, n)| Node {
            id,
            kind: n.kind,
            content: n.content,
            ontology_tags: n.ontology_tags,
            confidence: n.confidence,
            created_at: n.created_at,
            source_ref: n.source_ref,
        });
        let edges = self.edges.into_iter().map(|(id, e)| Edge {
            id,
            source_id: e.source_id,
            target_id: e.target_id,
            relationship_type: e.relationship_type,
            base_score: e.base_score,
            is_semantic: e.is_semantic,
            weight: e.weight,
            confidence: e.confidence,
            created_at: e.created_at,
        });
        Ok(KnowledgeGraph::from_parts(nodes, edges)?)
    }

    pub fn to_json(graph: &KnowledgeGraph) -> StorageResult<String> {
        Ok(serde_json::to_string_pretty(&Self::from_graph(graph))?)
    }

    pub fn from_json(raw: &str) -> StorageResult<KnowledgeGraph> {
        serde_json::from_str::<Self>(raw)?.into_graph()
    }

    pub fn write_to(graph: &KnowledgeGraph, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, Self::to_json(graph)?)?;
        Ok(())
    }

    pub fn read_from(path: impl AsRef<Path>) -> StorageResult<KnowledgeGraph> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}
