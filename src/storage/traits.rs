//! Storage trait definitions

use crate::graph::{GraphBuildingError, KnowledgeGraph};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored rows do not form a valid graph
    #[error("Stored graph is invalid: {0}")]
    InvalidGraph(#[from] GraphBuildingError),

    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    #[error("Store connection lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for graph storage backends
///
/// A store holds one graph. Saving replaces whatever was stored before, and
/// loading rebuilds the graph through [`KnowledgeGraph::from_parts`], so a
/// loaded graph satisfies the same invariants as a freshly built one.
/// Implementations must be thread-safe (Send + Sync).
pub trait GraphStore: Send + Sync {
    /// Replace the stored graph with `graph`
    fn save_graph(&self, graph: &KnowledgeGraph) -> StorageResult<()>;

    /// Load the stored graph; an empty store yields an empty graph
    fn load_graph(&self) -> StorageResult<KnowledgeGraph>;

    fn node_count(&self) -> StorageResult<usize>;

    fn edge_count(&self) -> StorageResult<usize>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
