//! GraphBuilder: the single writer of the document graph

use super::edge::{Edge, EdgeId, EdgeKey, RelationshipType};
use super::error::{GraphBuildingError, GraphResult};
use super::knowledge::{KnowledgeGraph, Subgraph};
use super::node::{Node, NodeContent, NodeId, NodeKind};
use crate::scoring::{EdgeScorer, ScoreUpdate};
use std::collections::BTreeSet;

/// Creates and updates nodes and edges while enforcing graph invariants
///
/// Every edge is scored through the builder's [`EdgeScorer`] the moment it
/// is created or updated, so no edge is ever observed with a stale weight.
/// Newly created nodes and edges are stamped with the current logical step.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    graph: KnowledgeGraph,
    scorer: EdgeScorer,
    next_seq: u64,
    step: u64,
}

impl GraphBuilder {
    pub fn new(scorer: EdgeScorer) -> Self {
        Self {
            graph: KnowledgeGraph::new(),
            scorer,
            next_seq: 0,
            step: 0,
        }
    }

    /// Continue building on top of an existing graph
    pub fn from_graph(graph: KnowledgeGraph, scorer: EdgeScorer) -> Self {
        let step = graph
            .nodes()
            .map(|n| n.created_at)
            .chain(graph.edges().map(|e| e.created_at))
            .max()
            .unwrap_or(0);
        Self {
            next_seq: graph.node_count() as u64,
            graph,
            scorer,
            step,
        }
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    /// Hand the finished graph over
    pub fn into_graph(self) -> KnowledgeGraph {
        self.graph
    }

    pub fn scorer(&self) -> &EdgeScorer {
        &self.scorer
    }

    pub fn current_step(&self) -> u64 {
        self.step
    }

    pub fn set_step(&mut self, step: u64) {
        self.step = step;
    }

    /// Create a node with a freshly allocated id
    ///
    /// Fails when `kind` does not fit the current structure: a second
    /// document root, a section or page before the root exists, or a concept
    /// whose `source_ref` is not an existing section or page.
    pub fn create_node(
        &mut self,
        kind: NodeKind,
        content: NodeContent,
        ontology_tags: impl IntoIterator<Item = impl Into<String>>,
        confidence: f64,
        source_ref: Option<NodeId>,
    ) -> GraphResult<Node> {
        self.check_structural_context(kind, source_ref.as_ref())?;
        let id = self.allocate_id(kind);
        self.insert(id, kind, content, ontology_tags, confidence, source_ref)
    }

    /// Return the concept node for `label`, creating it if needed
    ///
    /// Concept ids derive from the label slug, so the same concept mentioned
    /// on several pages resolves to one node. An existing node gains the new
    /// tags and keeps the higher confidence.
    pub fn ensure_concept(
        &mut self,
        label: &str,
        ontology_tags: impl IntoIterator<Item = impl Into<String>>,
        confidence: f64,
        source_ref: &NodeId,
    ) -> GraphResult<Node> {
        let slug = slugify(label);
        if slug.is_empty() {
            return Err(GraphBuildingError::EmptyLabel(label.to_string()));
        }
        check_confidence(confidence)?;
        let id = NodeId::concept(&slug);
        let tags: Vec<String> = ontology_tags.into_iter().map(Into::into).collect();

        if self.graph.contains_node(&id) {
            self.graph.add_tags(&id, tags)?;
            let node = self.graph.node_mut(&id)?;
            node.confidence = node.confidence.max(confidence);
            return Ok(node.clone());
        }

        self.check_structural_context(NodeKind::Concept, Some(source_ref))?;
        let content = NodeContent::text(label.trim());
        self.insert(
            id,
            NodeKind::Concept,
            content,
            tags,
            confidence,
            Some(source_ref.clone()),
        )
    }

    pub fn set_node_content(&mut self, id: &NodeId, content: NodeContent) -> GraphResult<()> {
        self.graph.node_mut(id)?.content = content;
        Ok(())
    }

    pub fn tag_node(
        &mut self,
        id: &NodeId,
        tags: impl IntoIterator<Item = impl Into<String>>,
    ) -> GraphResult<()> {
        self.graph.add_tags(id, tags.into_iter().map(Into::into))
    }

    /// Create an edge, or update the existing one with the same identity
    ///
    /// Identity is the (source, target, type) triple, canonicalized for
    /// non-directional types. An update replaces `base_score` and
    /// `is_semantic`, restamps `created_at` with the current step and
    /// rescores the edge; it never adds a second edge.
    pub fn create_edge(
        &mut self,
        source_id: &NodeId,
        target_id: &NodeId,
        relationship_type: RelationshipType,
        base_score: f64,
        is_semantic: bool,
    ) -> GraphResult<Edge> {
        if !(0.0..=1.0).contains(&base_score) {
            return Err(GraphBuildingError::InvalidScore(base_score));
        }
        let key = EdgeKey::new(source_id.clone(), target_id.clone(), relationship_type);
        let id = EdgeId::for_key(&key);
        for endpoint in [&key.source, &key.target] {
            if !self.graph.contains_node(endpoint) {
                return Err(GraphBuildingError::DanglingEdge {
                    edge: id,
                    node: endpoint.clone(),
                });
            }
        }
        let confidence = edge_confidence(relationship_type, base_score, is_semantic);

        if let Some(existing_id) = self.graph.edge_by_key(&key).map(|e| e.id.clone()) {
            let step = self.step;
            let scorer = &self.scorer;
            let edge = self
                .graph
                .edge_mut(&existing_id)
                .ok_or_else(|| GraphBuildingError::DuplicateEdge(existing_id.clone()))?;
            edge.base_score = base_score;
            edge.is_semantic = is_semantic;
            edge.confidence = confidence;
            edge.created_at = step;
            edge.weight = scorer.score_edge(edge, step);
            return Ok(edge.clone());
        }

        let mut edge = Edge {
            id,
            source_id: key.source,
            target_id: key.target,
            relationship_type,
            base_score,
            is_semantic,
            weight: 0.0,
            confidence,
            created_at: self.step,
        };
        edge.weight = self.scorer.score_edge(&edge, self.step);
        self.graph.insert_edge(edge.clone())?;
        Ok(edge)
    }

    /// Breadth-first slice of the graph around `node_id`
    pub fn get_subgraph(&self, node_id: &NodeId, depth: usize) -> GraphResult<Subgraph> {
        self.graph.get_subgraph(node_id, depth)
    }

    /// Rescore every edge as of the current step
    pub fn update_edge_scores(&mut self) -> ScoreUpdate {
        self.scorer.update_edge_scores(&mut self.graph, self.step)
    }

    fn allocate_id(&mut self, kind: NodeKind) -> NodeId {
        loop {
            let id = NodeId::sequenced(kind, self.next_seq);
            self.next_seq += 1;
            if !self.graph.contains_node(&id) {
                return id;
            }
        }
    }

    fn insert(
        &mut self,
        id: NodeId,
        kind: NodeKind,
        content: NodeContent,
        ontology_tags: impl IntoIterator<Item = impl Into<String>>,
        confidence: f64,
        source_ref: Option<NodeId>,
    ) -> GraphResult<Node> {
        check_confidence(confidence)?;
        let node = Node {
            id,
            kind,
            content,
            ontology_tags: ontology_tags.into_iter().map(Into::into).collect::<BTreeSet<_>>(),
            confidence,
            created_at: self.step,
            source_ref,
        };
        self.graph.insert_node(node.clone())?;
        Ok(node)
    }

    fn check_structural_context(
        &self,
        kind: NodeKind,
        source_ref: Option<&NodeId>,
    ) -> GraphResult<()> {
        let incompatible = |reason: &str| GraphBuildingError::IncompatibleKind {
            kind,
            reason: reason.to_string(),
        };

        match kind {
            NodeKind::Document => {
                if self.graph.root().is_some() {
                    return Err(incompatible("graph already has a document root"));
                }
            }
            NodeKind::Section | NodeKind::Page => {
                if self.graph.root().is_none() {
                    return Err(incompatible("no document root exists yet"));
                }
                if let Some(parent) = source_ref {
                    if !self.graph.contains_node(parent) {
                        return Err(GraphBuildingError::NodeNotFound(parent.clone()));
                    }
                }
            }
            NodeKind::Concept => {
                let Some(parent) = source_ref else {
                    return Err(incompatible("concepts need an enclosing section or page"));
                };
                let parent_kind = self
                    .graph
                    .node(parent)
                    .map(|n| n.kind)
                    .ok_or_else(|| GraphBuildingError::NodeNotFound(parent.clone()))?;
                if !matches!(parent_kind, NodeKind::Section | NodeKind::Page) {
                    return Err(incompatible("source_ref must be a section or page"));
                }
            }
        }
        Ok(())
    }
}

fn check_confidence(confidence: f64) -> GraphResult<()> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(GraphBuildingError::InvalidConfidence(confidence))
    }
}

/// Semantic edges carry the backend's confidence; others the catalog default
fn edge_confidence(relationship: RelationshipType, base_score: f64, is_semantic: bool) -> f64 {
    if is_semantic {
        base_score
    } else {
        relationship.default_confidence()
    }
}

/// Lowercase, alphanumeric runs joined by '-'
pub(crate) fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    for word in label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.extend(word.chars().flat_map(char::to_lowercase));
    }
    slug
}
