//! docgraph: document knowledge graphs with recency-scored semantic edges
//!
//! A document is turned into a typed, weighted graph in phases:
//!
//! - **Structure**: a TOC is discovered (native, detected headings, or a
//!   single whole-document entry) and becomes the document/section/page
//!   skeleton joined by `contains` and `precedes` edges.
//! - **Content**: term statistics per unit yield seed concepts and lexical
//!   `relates_to`/`references` edges.
//! - **Enhancement**: each unit is sent, with a bounded context window, to an
//!   intelligence backend whose proposals become semantic concepts and edges.
//!
//! Every edge weight is computed by the [`EdgeScorer`]: base score, semantic
//! multiplier and recency decay, zeroed below the confidence threshold.
//!
//! # Example
//!
//! ```
//! use docgraph::{CancellationToken, InMemoryDocument, MockBackend, PipelineConfig, SemanticOrchestrator};
//! use std::sync::Arc;
//!
//! let orchestrator = SemanticOrchestrator::new(PipelineConfig::default(), Arc::new(MockBackend::new()));
//! let doc = InMemoryDocument::new(["First page about Graphs.", "Second page about Weights."]);
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let outcome = runtime.block_on(orchestrator.run(&doc, &CancellationToken::new())).unwrap();
//! assert_eq!(outcome.report.units_total, 2);
//! ```

pub mod analysis;
pub mod backend;
pub mod config;
mod graph;
pub mod orchestrator;
pub mod scoring;
pub mod source;
pub mod storage;

pub use analysis::{
    ContentAnalysis, ContentAnalyzer, StructureAnalyzer, StructureDiscoveryError, Toc, TocEntry,
    TocOrigin,
};
pub use backend::{
    BackendConfig, BackendKind, CommandBackend, ImageRef, IntelligenceBackend,
    LlmProcessingError, MockBackend,
};
pub use config::{ConfigError, OntologyConfig, PipelineConfig};
pub use graph::{
    Edge, EdgeId, EdgeKey, GraphBuilder, GraphBuildingError, GraphResult, KnowledgeGraph, Node,
    NodeContent, NodeId, NodeKind, RelationshipProperties, RelationshipType, Subgraph,
};
pub use orchestrator::{
    CancellationToken, EnhancementConfig, PipelineError, RunOutcome, RunReport, RunState,
    SemanticOrchestrator, UnitFailure,
};
pub use scoring::{EdgeScorer, ScoreUpdate, ScoringConfig};
pub use source::{InMemoryDocument, StructureSource, TextDocument};
pub use storage::{GraphDocument, GraphStore, OpenStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
