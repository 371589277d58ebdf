//! Entity handles: lightweight references to graph vertices and edges.
//!
//! A `GraphObject` never caches field state. Every read goes through a
//! `PropertyKey` against the storage backend.

use serde::{Deserialize, Serialize};
use super::{Node, NodeId, RelId, Relationship};

/// Identifies a node or a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityId {
    Node(NodeId),
    Relationship(RelId),
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::Node(id) => write!(f, "node {id}"),
            EntityId::Relationship(id) => write!(f, "relationship {id}"),
        }
    }
}

/// A typed reference to a graph entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphObject {
    pub id: EntityId,
    pub type_name: String,
}

impl GraphObject {
    pub fn node(id: NodeId, type_name: impl Into<String>) -> Self {
        Self { id: EntityId::Node(id), type_name: type_name.into() }
    }

    pub fn relationship(id: RelId, type_name: impl Into<String>) -> Self {
        Self { id: EntityId::Relationship(id), type_name: type_name.into() }
    }

    /// Handle for a loaded node. Untyped nodes get an empty type name.
    pub fn from_node(node: &Node) -> Self {
        Self::node(node.id, node.type_name().unwrap_or_default())
    }

    pub fn from_relationship(rel: &Relationship) -> Self {
        Self::relationship(rel.id, rel.rel_type.clone())
    }

    pub fn node_id(&self) -> Option<NodeId> {
        match self.id {
            EntityId::Node(id) => Some(id),
            EntityId::Relationship(_) => None,
        }
    }
}
