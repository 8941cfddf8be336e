//! KnowledgeGraph: the id-indexed arena holding every node and edge of a run

use super::edge::{Edge, EdgeId, EdgeKey, RelationshipType};
use super::error::{GraphBuildingError, GraphResult};
use super::node::{Node, NodeId, NodeKind};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// The document graph
///
/// Nodes and edges reference each other only by id. Besides the two owning
/// maps the graph keeps derived indexes (edge key, adjacency, tag) that are
/// rebuilt by [`KnowledgeGraph::from_parts`] and kept in sync by the
/// crate-internal mutators.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    by_key: HashMap<EdgeKey, EdgeId>,
    /// Edges touching each node, in insertion order
    adjacency: HashMap<NodeId, Vec<EdgeId>>,
    tags: HashMap<String, BTreeSet<NodeId>>,
    root: Option<NodeId>,
}

/// A bounded slice of the graph produced by breadth-first traversal
#[derive(Debug, Clone, Default)]
pub struct Subgraph {
    /// Traversal origin
    pub origin: Option<NodeId>,
    /// Nodes in discovery order, origin first
    pub nodes: Vec<Node>,
    /// Edges followed during traversal
    pub edges: Vec<Edge>,
    /// Hop distance of each node from the origin
    pub distances: HashMap<NodeId, usize>,
}

impl Subgraph {
    pub fn contains(&self, id: &NodeId) -> bool {
        self.distances.contains_key(id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().map(|n| &n.id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from raw node and edge sets, validating every invariant
    pub fn from_parts(
        nodes: impl IntoIterator<Item = Node>,
        edges: impl IntoIterator<Item = Edge>,
    ) -> GraphResult<Self> {
        let mut graph = Self::new();
        for node in nodes {
            if node.kind == NodeKind::Document && graph.root.is_some() {
                return Err(GraphBuildingError::IncompatibleKind {
                    kind: NodeKind::Document,
                    reason: "graph already has a document root".to_string(),
                });
            }
            if !(0.0..=1.0).contains(&node.confidence) {
                return Err(GraphBuildingError::InvalidConfidence(node.confidence));
            }
            graph.insert_node(node)?;
        }
        for edge in edges {
            if !(0.0..=1.0).contains(&edge.weight) {
                return Err(GraphBuildingError::InvalidWeight {
                    edge: edge.id.clone(),
                    weight: edge.weight,
                });
            }
            graph.insert_edge(edge)?;
        }
        Ok(graph)
    }

    // === Read access ===

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// All nodes, ordered by id
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All edges, ordered by id
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// The document root, once created
    pub fn root(&self) -> Option<&NodeId> {
        self.root.as_ref()
    }

    /// Look up an edge by its (source, target, type) identity
    pub fn edge_by_key(&self, key: &EdgeKey) -> Option<&Edge> {
        self.by_key.get(key).and_then(|id| self.edges.get(id))
    }

    /// The edge of `relationship` type joining two nodes, if any
    ///
    /// Non-directional types match regardless of argument order.
    pub fn edge_between(
        &self,
        source: &NodeId,
        target: &NodeId,
        relationship: RelationshipType,
    ) -> Option<&Edge> {
        self.edge_by_key(&EdgeKey::new(source.clone(), target.clone(), relationship))
    }

    /// Edges touching `node` from either end, in insertion order
    pub fn edges_of<'a>(&'a self, node: &NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.adjacency
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.edges.get(id))
    }

    pub fn nodes_with_tag<'a>(&'a self, tag: &str) -> impl Iterator<Item = &'a Node> + 'a {
        self.tags
            .get(tag)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.nodes.get(id))
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(move |n| n.kind == kind)
    }

    /// Breadth-first traversal from `origin`, bounded by `depth` hops
    ///
    /// Directional edges are followed forward only; non-directional edges
    /// from either endpoint. Retired (zero-weight) edges are not followed.
    pub fn get_subgraph(&self, origin: &NodeId, depth: usize) -> GraphResult<Subgraph> {
        let origin_node = self
            .nodes
            .get(origin)
            .ok_or_else(|| GraphBuildingError::NodeNotFound(origin.clone()))?;

        let mut subgraph = Subgraph {
            origin: Some(origin.clone()),
            ..Default::default()
        };
        subgraph.nodes.push(origin_node.clone());
        subgraph.distances.insert(origin.clone(), 0);

        let mut followed: HashSet<EdgeId> = HashSet::new();
        let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();
        queue.push_back((origin.clone(), 0));

        while let Some((current, distance)) = queue.pop_front() {
            if distance >= depth {
                continue;
            }
            for edge in self.edges_of(&current) {
                if edge.is_retired() {
                    continue;
                }
                let Some(neighbor) = edge.neighbor_from(&current) else {
                    continue;
                };
                if followed.insert(edge.id.clone()) {
                    subgraph.edges.push(edge.clone());
                }
                if subgraph.distances.contains_key(neighbor) {
                    continue;
                }
                if let Some(node) = self.nodes.get(neighbor) {
                    subgraph.distances.insert(neighbor.clone(), distance + 1);
                    subgraph.nodes.push(node.clone());
                    queue.push_back((neighbor.clone(), distance + 1));
                }
            }
        }

        Ok(subgraph)
    }

    // === Crate-internal mutation (GraphBuilder and EdgeScorer only) ===

    pub(crate) fn insert_node(&mut self, node: Node) -> GraphResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphBuildingError::DuplicateNode(node.id));
        }
        if node.kind == NodeKind::Document {
            self.root = Some(node.id.clone());
        }
        for tag in &node.ontology_tags {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub(crate) fn insert_edge(&mut self, edge: Edge) -> GraphResult<()> {
        for endpoint in [&edge.source_id, &edge.target_id] {
            if !self.nodes.contains_key(endpoint) {
                return Err(GraphBuildingError::DanglingEdge {
                    edge: edge.id.clone(),
                    node: endpoint.clone(),
                });
            }
        }
        let key = edge.key();
        if self.edges.contains_key(&edge.id) || self.by_key.contains_key(&key) {
            return Err(GraphBuildingError::DuplicateEdge(edge.id));
        }

        self.by_key.insert(key, edge.id.clone());
        self.adjacency
            .entry(edge.source_id.clone())
            .or_default()
            .push(edge.id.clone());
        if edge.target_id != edge.source_id {
            self.adjacency
                .entry(edge.target_id.clone())
                .or_default()
                .push(edge.id.clone());
        }
        self.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    pub(crate) fn node_mut(&mut self, id: &NodeId) -> GraphResult<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| GraphBuildingError::NodeNotFound(id.clone()))
    }

    pub(crate) fn edge_mut(&mut self, id: &EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(id)
    }

    pub(crate) fn edges_mut(&mut self) -> impl Iterator<Item = &mut Edge> {
        self.edges.values_mut()
    }

    /// Add tags to a node, keeping the tag index in sync
    pub(crate) fn add_tags(
        &mut self,
        id: &NodeId,
        tags: impl IntoIterator<Item = String>,
    ) -> GraphResult<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphBuildingError::NodeNotFound(id.clone()))?;
        for tag in tags {
            if node.ontology_tags.insert(tag.clone()) {
                self.tags.entry(tag).or_default().insert(id.clone());
            }
        }
        Ok(())
    }
}
