//! Graph invariant violations

use super::edge::EdgeId;
use super::node::{NodeId, NodeKind};
use thiserror::Error;

/// Errors raised when a graph mutation would break an invariant
///
/// These indicate a bug in the caller rather than an external failure, so
/// the pipeline surfaces them immediately instead of recovering.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphBuildingError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Edge {edge} references missing node {node}")]
    DanglingEdge { edge: EdgeId, node: NodeId },

    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("Duplicate edge id: {0}")]
    DuplicateEdge(EdgeId),

    #[error("Cannot create {kind} node: {reason}")]
    IncompatibleKind { kind: NodeKind, reason: String },

    #[error("Confidence {0} outside [0, 1]")]
    InvalidConfidence(f64),

    #[error("Score {0} outside [0, 1]")]
    InvalidScore(f64),

    #[error("Weight {weight} of edge {edge} outside [0, 1]")]
    InvalidWeight { edge: EdgeId, weight: f64 },

    #[error("Concept label '{0}' has no usable characters")]
    EmptyLabel(String),
}

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphBuildingError>;
