//! SemanticOrchestrator: drives a document through the enhancement pipeline
//!
//! `Discovering → Analyzing → Enhancing → Finalizing → Done`, or `Failed` when
//! the configuration is unusable. Backend calls run on a bounded worker pool;
//! the orchestrator alone mutates the graph, applying finished units in
//! document order so `created_at` steps do not depend on scheduling.

mod cancel;
mod context;
mod parse;

pub use cancel::CancellationToken;
pub use context::{
    truncate_chars, ContextAssembler, ContextParts, ContextWindow, RELATED_HEADER,
    STRUCTURE_HEADER, SUMMARY_HEADER, TRUNCATION_MARKER, UNIT_CONTENT_HEADER,
};
pub use parse::{
    parse_response, Endpoint, ParsedEnhancement, ProposedConcept, ProposedRelationship,
};

use crate::analysis::{
    ContentAnalyzer, Discovery, StructureAnalyzer, StructureDiscoveryError, TocOrigin, UnitRef,
};
use crate::backend::{IntelligenceBackend, LlmProcessingError};
use crate::config::{ConfigError, PipelineConfig};
use crate::graph::{
    GraphBuilder, GraphBuildingError, KnowledgeGraph, NodeContent, NodeId, NodeKind,
    RelationshipType,
};
use crate::scoring::EdgeScorer;
use crate::source::StructureSource;
use crate::storage::{GraphStore, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Tag applied to nodes unreachable from the document root
pub const ORPHAN_TAG: &str = "orphan";
/// Tag for concepts seeded by lexical analysis
pub const LEXICAL_TAG: &str = "lexical";
/// Tag for concepts proposed by the backend
pub const SEMANTIC_TAG: &str = "semantic";

const UNTITLED_DOCUMENT: &str = "Untitled document";

/// Most neighbours listed under "Related concepts"
const RELATED_CONCEPTS_LIMIT: usize = 24;

/// Errors that end a run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Structure(#[from] StructureDiscoveryError),

    #[error("graph invariant violated: {0}")]
    Graph(#[from] GraphBuildingError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("worker task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Discovering,
    Analyzing,
    Enhancing,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Discovering => "discovering",
            RunState::Analyzing => "analyzing",
            RunState::Enhancing => "enhancing",
            RunState::Finalizing => "finalizing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// `enhancement:` section of the pipeline config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// Concurrent backend calls
    pub worker_count: usize,
    pub unit_timeout_secs: u64,
    /// Upper bound on context window size, in chars
    pub context_budget_chars: usize,
    /// Cap on the carried previous-unit summary, in chars
    pub summary_carry_chars: usize,
    /// Enhance at most this many units
    pub max_units: Option<usize>,
    /// Confidence for backend proposals that report none
    pub default_semantic_confidence: f64,
    /// Send unit images to vision-capable backends
    pub use_images: bool,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            unit_timeout_secs: 120,
            context_budget_chars: 12_000,
            summary_carry_chars: 1_000,
            max_units: None,
            default_semantic_confidence: 0.5,
            use_images: true,
        }
    }
}

/// Smallest context budget that still fits headers and some content
const MIN_CONTEXT_BUDGET: usize = 256;

impl EnhancementConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid(
                "enhancement.worker_count must be at least 1".to_string(),
            ));
        }
        if self.unit_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "enhancement.unit_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.context_budget_chars < MIN_CONTEXT_BUDGET {
            return Err(ConfigError::Invalid(format!(
                "enhancement.context_budget_chars must be at least {}",
                MIN_CONTEXT_BUDGET
            )));
        }
        if self.summary_carry_chars > self.context_budget_chars / 2 {
            return Err(ConfigError::Invalid(
                "enhancement.summary_carry_chars must not exceed half the context budget"
                    .to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.default_semantic_confidence) {
            return Err(ConfigError::Invalid(format!(
                "enhancement.default_semantic_confidence must be in [0, 1], got {}",
                self.default_semantic_confidence
            )));
        }
        Ok(())
    }

    pub fn unit_timeout(&self) -> Duration {
        Duration::from_secs(self.unit_timeout_secs)
    }
}

/// A unit whose enhancement failed
#[derive(Debug, Clone, PartialEq)]
pub struct UnitFailure {
    pub unit_index: usize,
    pub error: LlmProcessingError,
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub state: RunState,
    pub toc_origin: TocOrigin,
    pub units_total: usize,
    pub units_enhanced: usize,
    pub units_failed: usize,
    /// Not attempted: beyond the unit cap or cut off by cancellation
    pub units_skipped: usize,
    pub failures: Vec<UnitFailure>,
    pub orphaned_nodes: Vec<NodeId>,
    pub cancelled: bool,
    pub node_count: usize,
    pub edge_count: usize,
}

impl RunReport {
    fn new(toc_origin: TocOrigin, units_total: usize) -> Self {
        Self {
            state: RunState::Enhancing,
            toc_origin,
            units_total,
            units_enhanced: 0,
            units_failed: 0,
            units_skipped: 0,
            failures: Vec::new(),
            orphaned_nodes: Vec::new(),
            cancelled: false,
            node_count: 0,
            edge_count: 0,
        }
    }
}

/// The finished graph with its report
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub graph: KnowledgeGraph,
    pub report: RunReport,
}

/// Node ids of the structural skeleton
#[derive(Debug, Clone)]
struct Skeleton {
    root: NodeId,
    sections: Vec<NodeId>,
    pages: Vec<NodeId>,
}

impl Skeleton {
    fn resolve(&self, unit_ref: UnitRef) -> Option<&NodeId> {
        match unit_ref {
            UnitRef::Unit(i) => self.pages.get(i),
            UnitRef::Section(i) => self.sections.get(i),
        }
    }
}

type UnitResult = Result<ParsedEnhancement, LlmProcessingError>;

pub struct SemanticOrchestrator {
    config: PipelineConfig,
    backend: Arc<dyn IntelligenceBackend>,
    store: Option<Arc<dyn GraphStore>>,
    state: watch::Sender<RunState>,
}

impl SemanticOrchestrator {
    pub fn new(config: PipelineConfig, backend: Arc<dyn IntelligenceBackend>) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            config,
            backend,
            store: None,
            state,
        }
    }

    /// Persist the finished graph to `store` during Finalizing
    pub fn with_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Follow state transitions
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: RunState) {
        info!(%state, "pipeline state");
        self.state.send_replace(state);
    }

    /// Run the whole pipeline over `source`
    ///
    /// Per-unit backend failures are recorded in the report and never end
    /// the run. Cancellation skips the remaining units and still finalizes,
    /// so the outcome holds a consistent partial graph.
    #[instrument(skip_all, fields(backend = self.backend.id()))]
    pub async fn run(
        &self,
        source: &dyn StructureSource,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let scorer = match self
            .config
            .validate()
            .and_then(|_| EdgeScorer::new(self.config.scoring.clone()))
        {
            Ok(scorer) => scorer,
            Err(err) => {
                error!(error = %err, "unusable configuration");
                self.set_state(RunState::Failed);
                return Err(err.into());
            }
        };

        self.set_state(RunState::Discovering);
        let discovery = StructureAnalyzer::new().discover(source)?;
        let mut builder = GraphBuilder::new(scorer);
        let skeleton = self.build_skeleton(&mut builder, source, &discovery)?;
        builder.update_edge_scores();

        self.set_state(RunState::Analyzing);
        self.apply_content_analysis(&mut builder, &discovery, &skeleton)?;

        let mut report = RunReport::new(discovery.toc.origin, discovery.unit_count());
        self.set_state(RunState::Enhancing);
        self.enhance(&mut builder, source, &discovery, &skeleton, cancel, &mut report)
            .await?;

        self.set_state(RunState::Finalizing);
        let graph = self.finalize(builder, &skeleton, &mut report)?;
        if let Some(store) = self.store.clone() {
            let snapshot = graph.clone();
            tokio::task::spawn_blocking(move || store.save_graph(&snapshot))
                .await
                .map_err(|e| PipelineError::Task(e.to_string()))??;
        }

        self.set_state(RunState::Done);
        report.state = RunState::Done;
        info!(
            units = report.units_total,
            enhanced = report.units_enhanced,
            failed = report.units_failed,
            skipped = report.units_skipped,
            orphans = report.orphaned_nodes.len(),
            nodes = report.node_count,
            edges = report.edge_count,
            cancelled = report.cancelled,
            "run complete"
        );
        Ok(RunOutcome { graph, report })
    }

    /// Document, section and page nodes with `contains`/`precedes` edges
    fn build_skeleton(
        &self,
        builder: &mut GraphBuilder,
        source: &dyn StructureSource,
        discovery: &Discovery,
    ) -> Result<Skeleton, GraphBuildingError> {
        let ontology = &self.config.ontology;
        let toc = &discovery.toc;
        let title = source
            .title()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNTITLED_DOCUMENT.to_string());

        let root = builder
            .create_node(
                NodeKind::Document,
                NodeContent::text(title),
                ontology.tags_for(NodeKind::Document).iter().cloned(),
                1.0,
                None,
            )?
            .id;

        let mut sections: Vec<NodeId> = Vec::with_capacity(toc.len());
        for (index, entry) in toc.entries.iter().enumerate() {
            let parent = toc
                .parent_of(index)
                .map(|p| sections[p].clone())
                .unwrap_or_else(|| root.clone());
            let section = builder
                .create_node(
                    NodeKind::Section,
                    NodeContent::text(entry.title.clone()),
                    ontology.tags_for(NodeKind::Section).iter().cloned(),
                    toc.confidence(),
                    Some(parent.clone()),
                )?
                .id;
            builder.create_edge(&parent, &section, RelationshipType::Contains, 1.0, false)?;
            sections.push(section);
        }

        let mut pages: Vec<NodeId> = Vec::with_capacity(discovery.unit_count());
        for (unit_index, text) in discovery.units.iter().enumerate() {
            let parent = toc
                .section_for_unit(unit_index)
                .map(|s| sections[s].clone())
                .unwrap_or_else(|| root.clone());
            let page = builder
                .create_node(
                    NodeKind::Page,
                    NodeContent::text(text.clone()),
                    ontology.tags_for(NodeKind::Page).iter().cloned(),
                    1.0,
                    Some(parent.clone()),
                )?
                .id;
            builder.create_edge(&parent, &page, RelationshipType::Contains, 1.0, false)?;
            if let Some(previous) = pages.last() {
                builder.create_edge(previous, &page, RelationshipType::Precedes, 1.0, false)?;
            }
            pages.push(page);
        }

        debug!(sections = sections.len(), pages = pages.len(), "skeleton built");
        Ok(Skeleton {
            root,
            sections,
            pages,
        })
    }

    /// Seed concepts and lexical edges from term statistics
    #[instrument(skip_all, fields(units = discovery.unit_count()))]
    fn apply_content_analysis(
        &self,
        builder: &mut GraphBuilder,
        discovery: &Discovery,
        skeleton: &Skeleton,
    ) -> Result<(), GraphBuildingError> {
        let analyzer = ContentAnalyzer::new(self.config.analysis.clone());
        let analysis = analyzer.analyze(&discovery.units, &discovery.toc);
        let seed_confidence = analyzer.config().seed_confidence;

        let concept_tags: Vec<String> = self
            .config
            .ontology
            .tags_for(NodeKind::Concept)
            .iter()
            .cloned()
            .chain(std::iter::once(LEXICAL_TAG.to_string()))
            .collect();

        for seed in &analysis.seeds {
            let Some(page) = skeleton.pages.get(seed.unit_index) else {
                continue;
            };
            let concept = match builder.ensure_concept(
                &seed.label,
                concept_tags.iter().cloned(),
                seed_confidence,
                page,
            ) {
                Ok(node) => node.id,
                Err(GraphBuildingError::EmptyLabel(_)) => continue,
                Err(err) => return Err(err),
            };
            builder.create_edge(
                page,
                &concept,
                RelationshipType::RelatesTo,
                seed.significance.clamp(0.0, 1.0),
                false,
            )?;
        }

        for candidate in &analysis.candidates {
            let (Some(source), Some(target)) = (
                skeleton.resolve(candidate.source),
                skeleton.resolve(candidate.target),
            ) else {
                continue;
            };
            builder.create_edge(
                source,
                target,
                candidate.relationship,
                candidate.base_score,
                false,
            )?;
        }

        let update = builder.update_edge_scores();
        info!(
            seeds = analysis.seeds.len(),
            candidates = analysis.candidates.len(),
            retired = update.edges_retired,
            "lexical analysis merged"
        );
        Ok(())
    }

    /// Dispatch units to a pool of `worker_count` backend calls
    ///
    /// A unit is dispatched as soon as a worker is free, with the context
    /// available at that moment. Results are buffered and applied in
    /// document order; on cancellation every finished result is applied.
    #[instrument(skip_all, fields(units = discovery.unit_count()))]
    async fn enhance(
        &self,
        builder: &mut GraphBuilder,
        source: &dyn StructureSource,
        discovery: &Discovery,
        skeleton: &Skeleton,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        let settings = &self.config.enhancement;
        let unit_count = discovery.unit_count();
        let limit = settings.max_units.unwrap_or(unit_count).min(unit_count);
        if limit < unit_count {
            info!(limit, total = unit_count, "unit cap reached; remaining units skipped");
        }

        let assembler =
            ContextAssembler::new(settings.context_budget_chars, settings.summary_carry_chars);
        let outline = discovery.toc.to_outline();
        let semaphore = Arc::new(Semaphore::new(settings.worker_count));
        let timeout = settings.unit_timeout();
        let send_images = settings.use_images && self.backend.supports_vision();
        let mut carried_summary: Option<String> = None;

        let mut in_flight: JoinSet<(usize, UnitResult)> = JoinSet::new();
        let mut finished: BTreeMap<usize, UnitResult> = BTreeMap::new();
        let mut next_dispatch = 0;
        let mut next_apply = 0;

        while next_apply < limit {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            while next_dispatch < limit {
                let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                    break;
                };
                let unit_index = next_dispatch;
                let related = related_concepts(builder, &skeleton.pages[unit_index]);
                let window = assembler.assemble(ContextParts {
                    outline: &outline,
                    related: &related,
                    previous_summary: carried_summary.as_deref(),
                    unit_text: &discovery.units[unit_index],
                    image: if send_images {
                        source.unit_image(unit_index)
                    } else {
                        None
                    },
                });
                if !window.trimmed.is_empty() {
                    debug!(unit = unit_index, trimmed = ?window.trimmed, "context window trimmed");
                }

                let backend = Arc::clone(&self.backend);
                let default_confidence = settings.default_semantic_confidence;
                in_flight.spawn(async move {
                    let _permit = permit;
                    let call = backend.process(&window.text, window.image.as_ref());
                    let outcome = match tokio::time::timeout(timeout, call).await {
                        Ok(Ok(raw)) => Ok(parse_response(&raw, default_confidence)),
                        Ok(Err(err)) => Err(err),
                        Err(_) => Err(LlmProcessingError::Timeout(timeout)),
                    };
                    (unit_index, outcome)
                });
                debug!(unit = unit_index, in_flight = in_flight.len(), "unit dispatched");
                next_dispatch += 1;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                next = in_flight.join_next() => match next {
                    Some(Ok((unit_index, outcome))) => {
                        finished.insert(unit_index, outcome);
                    }
                    Some(Err(join_err)) if join_err.is_cancelled() => {}
                    Some(Err(join_err)) => return Err(PipelineError::Task(join_err.to_string())),
                    None => break,
                },
            }

            while let Some(outcome) = finished.remove(&next_apply) {
                self.apply_unit(builder, skeleton, next_apply, outcome, &mut carried_summary, report)?;
                next_apply += 1;
            }
        }

        in_flight.abort_all();
        // results past a unit that never finished
        for (unit_index, outcome) in std::mem::take(&mut finished) {
            self.apply_unit(builder, skeleton, unit_index, outcome, &mut carried_summary, report)?;
        }

        report.units_skipped = unit_count - report.units_enhanced - report.units_failed;
        if report.cancelled {
            warn!(skipped = report.units_skipped, "run cancelled; finalizing partial graph");
        }
        Ok(())
    }

    /// Apply one finished unit at its own step and rescore
    fn apply_unit(
        &self,
        builder: &mut GraphBuilder,
        skeleton: &Skeleton,
        unit_index: usize,
        outcome: UnitResult,
        carried_summary: &mut Option<String>,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        builder.set_step(unit_index as u64 + 1);
        match outcome {
            Ok(parsed) => {
                if let Some(summary) = &parsed.summary {
                    *carried_summary = Some(summary.clone());
                }
                self.apply_enhancement(builder, &skeleton.pages[unit_index], parsed)?;
                report.units_enhanced += 1;
                debug!(unit = unit_index, "unit enhanced");
            }
            Err(err) => {
                warn!(unit = unit_index, error = %err, "unit enhancement failed; continuing");
                report.units_failed += 1;
                report.failures.push(UnitFailure {
                    unit_index,
                    error: err,
                });
            }
        }
        builder.update_edge_scores();
        Ok(())
    }

    /// Merge one unit's parsed response into the graph
    fn apply_enhancement(
        &self,
        builder: &mut GraphBuilder,
        page: &NodeId,
        parsed: ParsedEnhancement,
    ) -> Result<(), GraphBuildingError> {
        if let Some(summary) = &parsed.summary {
            let content = builder
                .graph()
                .node(page)
                .map(|n| n.content.clone())
                .unwrap_or_default()
                .with_summary(summary.clone());
            builder.set_node_content(page, content)?;
        }

        let ontology = &self.config.ontology;
        let mut resolved: BTreeMap<String, NodeId> = BTreeMap::new();
        for concept in parsed.mentioned_concepts() {
            let mut tags: Vec<String> = ontology.tags_for(NodeKind::Concept).to_vec();
            tags.push(SEMANTIC_TAG.to_string());
            if let Some(type_tag) = concept
                .concept_type
                .as_deref()
                .and_then(|t| ontology.concept_type_tag(t))
            {
                tags.push(type_tag);
            }
            let node = match builder.ensure_concept(&concept.name, tags, concept.confidence, page) {
                Ok(node) => node,
                Err(GraphBuildingError::EmptyLabel(label)) => {
                    debug!(%label, "ignoring concept without a usable name");
                    continue;
                }
                Err(err) => return Err(err),
            };
            builder.create_edge(
                page,
                &node.id,
                RelationshipType::RelatesTo,
                concept.confidence,
                true,
            )?;
            resolved.insert(concept.name.to_lowercase(), node.id);
        }

        for rel in &parsed.relationships {
            let endpoint = |e: &Endpoint| match e {
                Endpoint::Unit => Some(page.clone()),
                Endpoint::Concept(name) => resolved.get(&name.to_lowercase()).cloned(),
            };
            let (Some(source), Some(target)) = (endpoint(&rel.source), endpoint(&rel.target))
            else {
                continue;
            };
            if source == target {
                continue;
            }
            builder.create_edge(&source, &target, rel.relationship, rel.confidence, true)?;
        }
        Ok(())
    }

    /// Flag nodes unreachable from the root and hand the graph over
    fn finalize(
        &self,
        mut builder: GraphBuilder,
        skeleton: &Skeleton,
        report: &mut RunReport,
    ) -> Result<KnowledgeGraph, GraphBuildingError> {
        let reachable = builder.get_subgraph(&skeleton.root, usize::MAX)?;
        let orphans: Vec<NodeId> = builder
            .graph()
            .nodes()
            .filter(|n| !reachable.contains(&n.id))
            .map(|n| n.id.clone())
            .collect();
        for orphan in &orphans {
            builder.tag_node(orphan, [ORPHAN_TAG])?;
        }
        if !orphans.is_empty() {
            warn!(count = orphans.len(), "nodes unreachable from the document root");
        }

        let graph = builder.into_graph();
        report.orphaned_nodes = orphans;
        report.node_count = graph.node_count();
        report.edge_count = graph.edge_count();
        Ok(graph)
    }
}

/// Labels of concepts one hop from `page`
fn related_concepts(builder: &GraphBuilder, page: &NodeId) -> Vec<String> {
    builder
        .get_subgraph(page, 1)
        .map(|sub| {
            sub.nodes
                .iter()
                .filter(|n| n.kind == NodeKind::Concept)
                .take(RELATED_CONCEPTS_LIMIT)
                .map(|n| n.label().to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::TocEntry;
    use crate::backend::MockBackend;
    use crate::source::InMemoryDocument;

    fn orchestrator(backend: MockBackend) -> SemanticOrchestrator {
        SemanticOrchestrator::new(PipelineConfig::default(), Arc::new(backend))
    }

    fn three_pages() -> InMemoryDocument {
        InMemoryDocument::new([
            "Alpha page about Recency decay.",
            "Beta page about Edge weight.",
            "Gamma page about Graph traversal.",
        ])
        .with_title("Sample")
        .with_native_toc(vec![TocEntry::new("Intro", 1, 0), TocEntry::new("Body", 1, 1)])
    }

    #[tokio::test]
    async fn skeleton_has_expected_shape() {
        let outcome = orchestrator(MockBackend::unavailable())
            .run(&three_pages(), &CancellationToken::new())
            .await
            .unwrap();
        let graph = &outcome.graph;
        assert_eq!(graph.nodes_of_kind(NodeKind::Document).count(), 1);
        assert_eq!(graph.nodes_of_kind(NodeKind::Section).count(), 2);
        assert_eq!(graph.nodes_of_kind(NodeKind::Page).count(), 3);
        // doc→2 sections, intro→page 1, body→pages 2 and 3
        let contains: Vec<_> = graph
            .edges()
            .filter(|e| e.relationship_type == RelationshipType::Contains)
            .collect();
        assert_eq!(contains.len(), 5);
        assert!(contains.iter().all(|e| e.weight() == 1.0));
        assert_eq!(outcome.report.units_failed, 3);
        assert_eq!(outcome.report.toc_origin, TocOrigin::Native);
    }

    #[tokio::test]
    async fn summaries_land_on_pages() {
        let backend = MockBackend::new().with_response(
            "Beta",
            r#"{"summary": "About weights.", "concepts": [{"name": "Edge weight", "confidence": 0.9}]}"#,
        );
        let outcome = orchestrator(backend)
            .run(&three_pages(), &CancellationToken::new())
            .await
            .unwrap();
        let graph = &outcome.graph;
        let page = graph
            .nodes_of_kind(NodeKind::Page)
            .find(|n| n.content.summary.as_deref() == Some("About weights."))
            .unwrap();
        let concept = NodeId::from_string("concept:edge-weight");
        let edge = graph
            .edge_between(&page.id, &concept, RelationshipType::RelatesTo)
            .unwrap();
        assert!(edge.is_semantic);
        assert_eq!(edge.created_at, 2);
        assert_eq!(edge.confidence, 0.9);
        assert!(graph.node(&concept).unwrap().has_tag(SEMANTIC_TAG));
    }

    #[tokio::test]
    async fn invalid_config_fails_the_run() {
        let mut config = PipelineConfig::default();
        config.enhancement.worker_count = 0;
        let orchestrator = SemanticOrchestrator::new(config, Arc::new(MockBackend::new()));
        let err = orchestrator
            .run(&three_pages(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert_eq!(orchestrator.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn state_reaches_done() {
        let orchestrator = orchestrator(MockBackend::new());
        let states = orchestrator.subscribe();
        assert_eq!(*states.borrow(), RunState::Idle);
        let outcome = orchestrator
            .run(&three_pages(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(orchestrator.state(), RunState::Done);
        assert_eq!(outcome.report.state, RunState::Done);
        assert_eq!(outcome.report.units_enhanced, 3);
    }

    #[test]
    fn enhancement_config_validation() {
        assert!(EnhancementConfig::default().validate().is_ok());
        let tiny = EnhancementConfig {
            context_budget_chars: 10,
            ..Default::default()
        };
        assert!(tiny.validate().is_err());
        let greedy_summary = EnhancementConfig {
            summary_carry_chars: 9_000,
            ..Default::default()
        };
        assert!(greedy_summary.validate().is_err());
    }
}
