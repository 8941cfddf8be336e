//! End-to-end pipeline runs over small in-memory documents
//!
//! Run with: `cargo test --test pipeline`

mod common;

use common::{page_ids, run_with, semantic_edges_of, three_unit_document};
use docgraph::{
    CancellationToken, InMemoryDocument, LlmProcessingError, MockBackend, NodeId, NodeKind,
    PipelineError, RelationshipType, RunState, SemanticOrchestrator, TocOrigin,
};
use std::sync::Arc;

#[tokio::test]
async fn native_toc_builds_document_sections_and_pages() {
    let outcome = run_with(MockBackend::unavailable(), |_| {}).await;
    let graph = &outcome.graph;

    assert_eq!(graph.nodes_of_kind(NodeKind::Document).count(), 1);
    assert_eq!(graph.nodes_of_kind(NodeKind::Section).count(), 2);
    assert_eq!(graph.nodes_of_kind(NodeKind::Page).count(), 3);
    assert_eq!(graph.nodes_of_kind(NodeKind::Concept).count(), 0);

    let root = graph.root().cloned().unwrap();
    assert_eq!(graph.node(&root).unwrap().label(), "Scoring Notes");

    let contains: Vec<_> = graph
        .edges()
        .filter(|e| e.relationship_type == RelationshipType::Contains)
        .collect();
    assert_eq!(contains.len(), 5);
    assert!(contains.iter().all(|e| e.weight() == 1.0 && !e.is_semantic));

    let precedes = graph
        .edges()
        .filter(|e| e.relationship_type == RelationshipType::Precedes)
        .count();
    assert_eq!(precedes, 2);

    // first page under "Introduction", the rest under "Details"
    let pages = page_ids(graph);
    let parent_label = |page: &NodeId| {
        let parent = graph.node(page).unwrap().source_ref.clone().unwrap();
        graph.node(&parent).unwrap().label().to_string()
    };
    assert_eq!(parent_label(&pages[0]), "Introduction");
    assert_eq!(parent_label(&pages[1]), "Details");
    assert_eq!(parent_label(&pages[2]), "Details");

    assert_eq!(outcome.report.toc_origin, TocOrigin::Native);
    assert_eq!(outcome.report.units_failed, 3);
    assert_eq!(outcome.report.state, RunState::Done);
}

#[tokio::test]
async fn failed_unit_is_skipped_and_counted() {
    let outcome = run_with(MockBackend::new().with_failure("Beta"), |_| {}).await;
    let graph = &outcome.graph;
    let pages = page_ids(graph);

    assert_eq!(outcome.report.units_failed, 1);
    assert_eq!(outcome.report.units_enhanced, 2);
    assert_eq!(outcome.report.failures.len(), 1);
    assert_eq!(outcome.report.failures[0].unit_index, 1);
    assert!(matches!(
        outcome.report.failures[0].error,
        LlmProcessingError::InvocationFailed(_)
    ));

    assert!(!semantic_edges_of(graph, &pages[0]).is_empty());
    assert!(semantic_edges_of(graph, &pages[1]).is_empty());
    assert!(!semantic_edges_of(graph, &pages[2]).is_empty());

    assert!(graph.node(&pages[0]).unwrap().content.summary.is_some());
    assert!(graph.node(&pages[1]).unwrap().content.summary.is_none());
}

#[tokio::test]
async fn finalized_graph_is_referentially_sound() {
    let outcome = run_with(MockBackend::new(), |_| {}).await;
    let graph = &outcome.graph;

    for edge in graph.edges() {
        assert!(graph.contains_node(&edge.source_id), "dangling source {}", edge.id);
        assert!(graph.contains_node(&edge.target_id), "dangling target {}", edge.id);
        assert!((0.0..=1.0).contains(&edge.weight()));
    }
    for node in graph.nodes() {
        if let Some(parent) = &node.source_ref {
            assert!(graph.contains_node(parent));
        }
    }
    assert!(outcome.report.orphaned_nodes.is_empty());
    assert_eq!(outcome.report.node_count, graph.node_count());
    assert_eq!(outcome.report.edge_count, graph.edge_count());
}

#[tokio::test]
async fn backend_concepts_are_merged_across_pages() {
    let backend = MockBackend::new()
        .with_response("Alpha", r#"{"concepts": ["Edge weight"], "relationships": []}"#)
        .with_response(
            "Gamma",
            r#"{"concepts": [{"name": "edge weight", "type": "metric", "confidence": 0.9}],
                "relationships": [{"source": "page", "target": "edge weight", "type": "defines"}]}"#,
        );
    let outcome = run_with(backend, |config| {
        config.ontology.concept_types = vec!["metric".to_string()];
    })
    .await;
    let graph = &outcome.graph;
    let pages = page_ids(graph);

    let concept = NodeId::from_string("concept:edge-weight");
    let node = graph.node(&concept).unwrap();
    assert_eq!(node.confidence, 0.9);
    assert!(node.has_tag("metric"));
    assert!(node.has_tag("semantic"));

    assert!(graph
        .edge_between(&pages[0], &concept, RelationshipType::RelatesTo)
        .is_some());
    let defines = graph
        .edge_between(&pages[2], &concept, RelationshipType::Defines)
        .unwrap();
    assert!(defines.is_semantic);
    assert_eq!(defines.created_at, 3);
}

#[tokio::test]
async fn detected_headings_replace_missing_toc() {
    let doc = InMemoryDocument::new([
        "# Introduction\nGraphs hold documents.",
        "Continued prose without headings.",
        "# Scoring\nWeights decay with age.",
    ]);
    let orchestrator = SemanticOrchestrator::new(
        Default::default(),
        Arc::new(MockBackend::unavailable()),
    );
    let outcome = orchestrator
        .run(&doc, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.report.toc_origin, TocOrigin::Headings);
    let sections: Vec<_> = outcome
        .graph
        .nodes_of_kind(NodeKind::Section)
        .map(|n| (n.label().to_string(), n.confidence))
        .collect();
    assert_eq!(
        sections,
        vec![
            ("Introduction".to_string(), TocOrigin::Headings.confidence()),
            ("Scoring".to_string(), TocOrigin::Headings.confidence()),
        ]
    );
}

#[tokio::test]
async fn plain_text_falls_back_to_whole_document() {
    let doc = InMemoryDocument::new(["just some words", "and a few more"]);
    let orchestrator = SemanticOrchestrator::new(
        Default::default(),
        Arc::new(MockBackend::unavailable()),
    );
    let outcome = orchestrator
        .run(&doc, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.report.toc_origin, TocOrigin::Minimal);
    assert_eq!(outcome.graph.nodes_of_kind(NodeKind::Section).count(), 1);
    assert_eq!(
        outcome.graph.root().and_then(|id| outcome.graph.node(id)).unwrap().label(),
        "Untitled document"
    );
}

#[tokio::test]
async fn invalid_config_fails_before_any_backend_call() {
    let backend = MockBackend::new();
    let orchestrator = common::orchestrator(backend.clone(), |config| {
        config.scoring.confidence_threshold = 2.0;
    });
    let err = orchestrator
        .run(&three_unit_document(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Config(_)));
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn lexical_analysis_links_pages_sharing_terms() {
    let text = "decay recency ".repeat(10);
    let other = "graph nodes ".repeat(10);
    let doc = InMemoryDocument::new([text.clone(), other.clone(), text, other]);
    let orchestrator = SemanticOrchestrator::new(
        Default::default(),
        Arc::new(MockBackend::unavailable()),
    );
    let outcome = orchestrator
        .run(&doc, &CancellationToken::new())
        .await
        .unwrap();
    let graph = &outcome.graph;
    let pages = page_ids(graph);

    let lexical = graph
        .edge_between(&pages[0], &pages[2], RelationshipType::RelatesTo)
        .unwrap();
    assert!(!lexical.is_semantic);
    assert!(graph
        .edge_between(&pages[0], &pages[1], RelationshipType::RelatesTo)
        .is_none());

    // seed concepts are tagged lexical and anchored to their page
    let seeds: Vec<_> = graph.nodes_with_tag("lexical").collect();
    assert!(!seeds.is_empty());
    assert!(seeds.iter().all(|n| n.kind == NodeKind::Concept));
}
