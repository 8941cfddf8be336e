//! Worker pool behaviour: timeouts, cancellation, unit caps, vision gating
//! and deterministic application order
//!
//! Run with: `cargo test --test concurrency`

mod common;

use common::{orchestrator, page_ids, run_with, semantic_edges_of, three_unit_document, StallingBackend};
use docgraph::{
    CancellationToken, ImageRef, LlmProcessingError, MockBackend, NodeKind, RunState,
};
use std::time::Duration;

#[tokio::test]
async fn slow_backend_times_out_per_unit() {
    let backend = MockBackend::new().with_delay(Duration::from_secs(30));
    let run = run_with(backend, |config| {
        config.enhancement.unit_timeout_secs = 1;
    });
    let outcome = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("timeouts bound the run");

    assert_eq!(outcome.report.units_failed, 3);
    assert!(outcome
        .report
        .failures
        .iter()
        .all(|f| f.error == LlmProcessingError::Timeout(Duration::from_secs(1))));
    // structure survives
    assert_eq!(outcome.graph.nodes_of_kind(NodeKind::Page).count(), 3);
    assert_eq!(outcome.report.state, RunState::Done);
}

#[tokio::test]
async fn cancellation_finalizes_partial_graph() {
    let orchestrator = orchestrator(StallingBackend::new("Alpha"), |config| {
        config.enhancement.worker_count = 1;
    });
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });
    }

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        orchestrator.run(&three_unit_document(), &cancel),
    )
    .await
    .expect("cancellation ends the run")
    .unwrap();

    let report = &outcome.report;
    assert!(report.cancelled);
    assert_eq!(report.units_enhanced, 1);
    assert_eq!(report.units_skipped, 2);
    assert_eq!(report.units_failed, 0);
    assert_eq!(report.state, RunState::Done);

    let pages = page_ids(&outcome.graph);
    assert!(!semantic_edges_of(&outcome.graph, &pages[0]).is_empty());
    assert!(semantic_edges_of(&outcome.graph, &pages[1]).is_empty());
}

#[tokio::test]
async fn stalled_unit_does_not_hold_back_later_units() {
    // two workers: Alpha never answers, Beta frees its worker for Gamma
    let orchestrator = orchestrator(StallingBackend::stalling_on("Alpha"), |config| {
        config.enhancement.worker_count = 2;
    });
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cancel.cancel();
        });
    }

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        orchestrator.run(&three_unit_document(), &cancel),
    )
    .await
    .expect("cancellation ends the run")
    .unwrap();

    let report = &outcome.report;
    assert!(report.cancelled);
    assert_eq!(report.units_enhanced, 2);
    assert_eq!(report.units_skipped, 1);

    let pages = page_ids(&outcome.graph);
    assert!(semantic_edges_of(&outcome.graph, &pages[0]).is_empty());
    assert!(!semantic_edges_of(&outcome.graph, &pages[1]).is_empty());
    // finished results are stamped with their own unit step
    for edge in semantic_edges_of(&outcome.graph, &pages[2]) {
        assert_eq!(edge.created_at, 3);
    }
    assert!(!semantic_edges_of(&outcome.graph, &pages[2]).is_empty());
}

#[tokio::test]
async fn cancelled_before_start_still_builds_structure() {
    let backend = MockBackend::new();
    let orchestrator = orchestrator(backend.clone(), |_| {});
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = orchestrator
        .run(&three_unit_document(), &cancel)
        .await
        .unwrap();
    assert!(outcome.report.cancelled);
    assert_eq!(outcome.report.units_skipped, 3);
    assert_eq!(backend.call_count(), 0);
    assert_eq!(outcome.graph.nodes_of_kind(NodeKind::Section).count(), 2);
}

#[tokio::test]
async fn unit_cap_limits_backend_calls() {
    let backend = MockBackend::new();
    let outcome = run_with(backend.clone(), |config| {
        config.enhancement.max_units = Some(2);
    })
    .await;

    assert_eq!(backend.call_count(), 2);
    assert_eq!(outcome.report.units_enhanced, 2);
    assert_eq!(outcome.report.units_skipped, 1);
    let pages = page_ids(&outcome.graph);
    assert!(semantic_edges_of(&outcome.graph, &pages[2]).is_empty());
}

fn illustrated_document() -> docgraph::InMemoryDocument {
    three_unit_document().with_image(1, ImageRef::new("scans/page-2.png"))
}

#[tokio::test]
async fn images_only_reach_vision_backends() {
    let blind = MockBackend::new();
    orchestrator(blind.clone(), |_| {})
        .run(&illustrated_document(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(blind.calls().iter().all(|c| c.image.is_none()));

    let sighted = MockBackend::new().with_vision(true);
    orchestrator(sighted.clone(), |_| {})
        .run(&illustrated_document(), &CancellationToken::new())
        .await
        .unwrap();
    let with_images: Vec<_> = sighted
        .calls()
        .into_iter()
        .filter_map(|c| c.image)
        .collect();
    assert_eq!(with_images, vec![ImageRef::new("scans/page-2.png")]);

    let disabled = MockBackend::new().with_vision(true);
    orchestrator(disabled.clone(), |config| {
        config.enhancement.use_images = false;
    })
    .run(&illustrated_document(), &CancellationToken::new())
    .await
    .unwrap();
    assert!(disabled.calls().iter().all(|c| c.image.is_none()));
}

#[tokio::test]
async fn worker_count_does_not_change_the_graph() {
    let backend = || MockBackend::new().with_delay(Duration::from_millis(5));
    let serial = run_with(backend(), |config| config.enhancement.worker_count = 1).await;
    let parallel = run_with(backend(), |config| config.enhancement.worker_count = 3).await;

    let stamps = |outcome: &docgraph::RunOutcome| {
        outcome
            .graph
            .edges()
            .map(|e| (e.id.clone(), e.created_at, e.weight()))
            .collect::<Vec<_>>()
    };
    assert_eq!(stamps(&serial), stamps(&parallel));
    assert_eq!(
        serial.graph.nodes().collect::<Vec<_>>(),
        parallel.graph.nodes().collect::<Vec<_>>()
    );

    // every semantic edge is stamped with its unit's step
    let pages = page_ids(&parallel.graph);
    for (index, page) in pages.iter().enumerate() {
        for edge in semantic_edges_of(&parallel.graph, page) {
            assert_eq!(edge.created_at, index as u64 + 1);
        }
    }
}

#[tokio::test]
async fn rolling_summary_follows_previous_unit() {
    let backend = MockBackend::new()
        .with_response("Alpha", r#"{"summary": "Unit one recap."}"#)
        .with_response("Beta", r#"{"summary": "Unit two recap."}"#);
    run_with(backend.clone(), |config| config.enhancement.worker_count = 1).await;

    let calls = backend.calls();
    assert_eq!(calls.len(), 3);
    assert!(!calls[0].text.contains(docgraph::orchestrator::SUMMARY_HEADER));
    assert!(calls[1].text.contains("Unit one recap."));
    assert!(calls[2].text.contains("Unit two recap."));
    assert!(!calls[2].text.contains("Unit one recap."));
}
