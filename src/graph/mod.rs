//! Core graph data structures

mod builder;
mod edge;
mod error;
mod knowledge;
mod node;


pub use builder::GraphBuilder;
pub use edge::{Edge, EdgeId, EdgeKey, RelationshipProperties, RelationshipType};
pub use error::{GraphBuildingError, GraphResult};
pub use knowledge::{KnowledgeGraph, Subgraph};
pub use node::{Node, NodeContent, NodeId, NodeKind};
