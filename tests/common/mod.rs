//! Shared fixtures for pipeline integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use docgraph::{
    CancellationToken, Edge, ImageRef, InMemoryDocument, IntelligenceBackend, KnowledgeGraph,
    LlmProcessingError, MockBackend, NodeId, NodeKind, PipelineConfig, RunOutcome,
    SemanticOrchestrator, TocEntry,
};
use std::sync::Arc;

/// Three pages under a two-section native TOC; each page has a distinct marker word
pub fn three_unit_document() -> InMemoryDocument {
    InMemoryDocument::new([
        "Alpha introduces Recency and Decay in the graph.",
        "Beta explains Weights for every edge.",
        "Gamma covers Traversal of Subgraphs.",
    ])
    .with_title("Scoring Notes")
    .with_native_toc(vec![
        TocEntry::new("Introduction", 1, 0),
        TocEntry::new("Details", 1, 1),
    ])
}

/// Defaults with `configure` applied on top
pub fn config_with(configure: impl FnOnce(&mut PipelineConfig)) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    configure(&mut config);
    config
}

pub fn orchestrator(
    backend: impl IntelligenceBackend + 'static,
    configure: impl FnOnce(&mut PipelineConfig),
) -> SemanticOrchestrator {
    SemanticOrchestrator::new(config_with(configure), Arc::new(backend))
}

pub async fn run_with(
    backend: MockBackend,
    configure: impl FnOnce(&mut PipelineConfig),
) -> RunOutcome {
    orchestrator(backend, configure)
        .run(&three_unit_document(), &CancellationToken::new())
        .await
        .expect("pipeline run")
}

/// Page ids in document order
pub fn page_ids(graph: &KnowledgeGraph) -> Vec<NodeId> {
    // sequenced ids are zero-padded, so id order is creation order
    graph
        .nodes_of_kind(NodeKind::Page)
        .map(|n| n.id.clone())
        .collect()
}

/// Semantic edges with `node` at either end
pub fn semantic_edges_of<'a>(graph: &'a KnowledgeGraph, node: &NodeId) -> Vec<&'a Edge> {
    graph
        .edges_of(node)
        .filter(|e| e.is_semantic)
        .collect()
}

/// Which units a [`StallingBackend`] never answers
enum Stall {
    AllExcept(String),
    Only(String),
}

/// Answers through a [`MockBackend`] except for stalled units, which never return
pub struct StallingBackend {
    stall: Stall,
    inner: MockBackend,
}

impl StallingBackend {
    /// Answers units containing `fast_marker` and stalls on every other
    pub fn new(fast_marker: impl Into<String>) -> Self {
        Self {
            stall: Stall::AllExcept(fast_marker.into()),
            inner: MockBackend::new(),
        }
    }

    /// Stalls only on units containing `marker`
    pub fn stalling_on(marker: impl Into<String>) -> Self {
        Self {
            stall: Stall::Only(marker.into()),
            inner: MockBackend::new(),
        }
    }
}

#[async_trait]
impl IntelligenceBackend for StallingBackend {
    fn id(&self) -> &str {
        "stalling"
    }

    fn supports_vision(&self) -> bool {
        false
    }

    async fn process(
        &self,
        text: &str,
        image: Option<&ImageRef>,
    ) -> Result<String, LlmProcessingError> {
        let content = text
            .rsplit(docgraph::orchestrator::UNIT_CONTENT_HEADER)
            .next()
            .unwrap_or(text);
        let stalls = match &self.stall {
            Stall::AllExcept(marker) => !content.contains(marker.as_str()),
            Stall::Only(marker) => content.contains(marker.as_str()),
        };
        if stalls {
            std::future::pending::<()>().await;
        }
        self.inner.process(text, image).await
    }
}
