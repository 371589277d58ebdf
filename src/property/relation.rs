//! # Relation engine
//!
//! Creates and removes relationships so that the declared cardinality of a
//! relation type always holds. Cardinality is read over the stored edge,
//! start → end:
//!
//! | Cardinality | at the start node | at the end node |
//! |-------------|-------------------|-----------------|
//! | `OneToOne`  | one outgoing edge | one incoming edge |
//! | `ManyToOne` | one outgoing edge | any |
//! | `OneToMany` | any | one incoming edge |
//! | `ManyToMany`| any | any |
//!
//! Creating an edge that would break the rule deletes ("displaces") the edges
//! it conflicts with, in the same transaction.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::model::*;
use crate::notion::{EntityLookup, Notion};
use crate::storage::StorageBackend;
use crate::tx::{self, TxMode};
use crate::{Error, Graph, Result};
use super::PropertyKey;

/// Edge field carrying the cascade policy of the relation that created it.
pub const CASCADE_FIELD: &str = "cascadeDelete";

/// Multiplicity of a relation type, over edge start → end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl Cardinality {
    /// A start node may have at most one such edge.
    pub fn single_outgoing(self) -> bool {
        matches!(self, Cardinality::OneToOne | Cardinality::ManyToOne)
    }

    /// An end node may have at most one such edge.
    pub fn single_incoming(self) -> bool {
        matches!(self, Cardinality::OneToOne | Cardinality::OneToMany)
    }
}

/// Which endpoint goes away when the other one is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cascade {
    #[default]
    None,
    /// Deleting the edge's start node deletes its end node.
    SourceToTarget,
    /// Deleting the edge's end node deletes its start node.
    TargetToSource,
    Both,
}

impl Cascade {
    pub fn marker(self) -> i64 {
        match self {
            Cascade::None => 0,
            Cascade::SourceToTarget => 1,
            Cascade::TargetToSource => 2,
            Cascade::Both => 3,
        }
    }

    pub fn from_marker(marker: i64) -> Self {
        match marker {
            1 => Cascade::SourceToTarget,
            2 => Cascade::TargetToSource,
            3 => Cascade::Both,
            _ => Cascade::None,
        }
    }

    pub fn deletes_target(self) -> bool {
        matches!(self, Cascade::SourceToTarget | Cascade::Both)
    }

    pub fn deletes_source(self) -> bool {
        matches!(self, Cascade::TargetToSource | Cascade::Both)
    }
}

/// Side of a relationship assignment, from the property's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endpoint {
    /// The entity owning the property.
    Source,
    /// The related entity.
    Target,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Source => f.write_str("Source"),
            Endpoint::Target => f.write_str("Target"),
        }
    }
}

/// Declaration of a relation type as seen from one side.
///
/// `source_type` is the type owning the property, `dest_type` the type of the
/// related entities. With `Direction::Outgoing` the owner is the start of the
/// stored edge; with `Direction::Incoming` it is the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    pub source_type: String,
    pub dest_type: String,
    pub label: String,
    pub direction: Direction,
    pub cardinality: Cardinality,
    pub cascade: Cascade,
}

impl RelationDescriptor {
    pub fn new(
        source_type: impl Into<String>,
        label: impl Into<String>,
        dest_type: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            dest_type: dest_type.into(),
            label: label.into(),
            direction: Direction::Outgoing,
            cardinality,
            cascade: Cascade::None,
        }
    }

    /// The owner is the end of the stored edge.
    pub fn incoming(mut self) -> Self {
        self.direction = Direction::Incoming;
        self
    }

    pub fn with_cascade(mut self, cascade: Cascade) -> Self {
        self.cascade = cascade;
        self
    }

    /// Declared type of the stored edge's start node.
    pub fn start_type(&self) -> &str {
        match self.direction {
            Direction::Incoming => &self.dest_type,
            _ => &self.source_type,
        }
    }

    /// Declared type of the stored edge's end node.
    pub fn end_type(&self) -> &str {
        match self.direction {
            Direction::Incoming => &self.source_type,
            _ => &self.dest_type,
        }
    }

    /// Whether the owner side may hold at most one such edge.
    pub fn owner_is_single(&self) -> bool {
        match self.direction {
            Direction::Incoming => self.cardinality.single_incoming(),
            _ => self.cardinality.single_outgoing(),
        }
    }

    /// Map (owner, related) to (start, end).
    pub fn orient<T>(&self, owner: T, related: T) -> (T, T) {
        match self.direction {
            Direction::Incoming => (related, owner),
            _ => (owner, related),
        }
    }
}

/// The shared core of entity- and collection-valued properties.
#[derive(Debug, Clone)]
pub struct RelationProperty {
    descriptor: Arc<RelationDescriptor>,
    notion: Arc<dyn Notion>,
}

impl RelationProperty {
    pub fn new(descriptor: Arc<RelationDescriptor>, notion: Arc<dyn Notion>) -> Self {
        Self { descriptor, notion }
    }

    pub fn descriptor(&self) -> &Arc<RelationDescriptor> {
        &self.descriptor
    }

    pub fn notion(&self) -> &dyn Notion {
        self.notion.as_ref()
    }

    fn owner_node(&self, key: &PropertyKey, owner: &GraphObject) -> Result<NodeId> {
        owner.node_id().ok_or_else(|| {
            Error::Unsupported(format!(
                "relation property '{}' on {} requires a node owner",
                key.json_name(),
                owner.id
            ))
        })
    }

    fn missing(key: &PropertyKey, side: Endpoint) -> Error {
        Error::MissingEndpoint {
            key: key.json_name().to_string(),
            owner: key.declaring_type().to_string(),
            side,
        }
    }

    /// Whether the node exists and its type is assignable to `declared`.
    async fn node_is<B: StorageBackend>(
        graph: &Graph<B>,
        tx: &B::Tx,
        id: NodeId,
        declared: &str,
    ) -> Result<bool> {
        let node = graph.backend().get_node(tx, id).await?;
        Ok(node.is_some_and(|n| graph.schema().is_assignable(declared, n.type_name().unwrap_or_default())))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Related nodes in storage iteration order, skipping any whose type is
    /// not assignable to the destination type.
    pub async fn related_nodes<B: StorageBackend>(
        &self,
        graph: &Graph<B>,
        key: &PropertyKey,
        owner: &GraphObject,
    ) -> Result<Vec<Node>> {
        let owner_id = self.owner_node(key, owner)?;
        let backend = graph.backend();
        let tx = backend.begin_tx(TxMode::ReadOnly).await?;
        let outcome = self.related_in(graph, &tx, owner_id).await;
        tx::finish(backend, tx, outcome).await
    }

    async fn related_in<B: StorageBackend>(
        &self,
        graph: &Graph<B>,
        tx: &B::Tx,
        owner: NodeId,
    ) -> Result<Vec<Node>> {
        let desc = &self.descriptor;
        let backend = graph.backend();
        let rels = backend
            .get_relationships(tx, owner, desc.direction, Some(&desc.label))
            .await?;

        let mut related = Vec::with_capacity(rels.len());
        for rel in rels {
            let other = match desc.direction {
                Direction::Incoming => rel.src,
                _ => rel.dst,
            };
            let Some(node) = backend.get_node(tx, other).await? else { continue };
            let actual = node.type_name().unwrap_or_default();
            if graph.schema().is_assignable(&desc.dest_type, actual) {
                related.push(node);
            } else {
                trace!(
                    label = %desc.label,
                    expected = %desc.dest_type,
                    actual,
                    "skipping related node of foreign type"
                );
            }
        }
        Ok(related)
    }

    /// Find the node an expanded notion value refers to.
    pub async fn resolve<B: StorageBackend>(
        &self,
        graph: &Graph<B>,
        key: &PropertyKey,
        lookup: EntityLookup,
    ) -> Result<Option<Node>> {
        let backend = graph.backend();
        let tx = backend.begin_tx(TxMode::ReadOnly).await?;
        let outcome = self.resolve_in(graph, key, &tx, lookup).await;
        tx::finish(backend, tx, outcome).await
    }

    async fn resolve_in<B: StorageBackend>(
        &self,
        graph: &Graph<B>,
        key: &PropertyKey,
        tx: &B::Tx,
        lookup: EntityLookup,
    ) -> Result<Option<Node>> {
        let dest = &self.descriptor.dest_type;
        match lookup {
            EntityLookup::Id(id) => {
                let Some(node) = graph.backend().get_node(tx, id).await? else {
                    return Ok(None);
                };
                let actual = node.type_name().unwrap_or_default();
                if graph.schema().is_assignable(dest, actual) {
                    Ok(Some(node))
                } else {
                    Err(Error::TypeMismatch {
                        key: key.json_name().to_string(),
                        owner: key.declaring_type().to_string(),
                        expected: dest.clone(),
                        got: actual.to_string(),
                    })
                }
            }
            EntityLookup::Field { key: field, value } => {
                let mut found = graph.backend().nodes_by_field(tx, dest, &field, &value).await?;
                Ok(if found.is_empty() { None } else { Some(found.swap_remove(0)) })
            }
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Link `owner` to `related`, displacing conflicting edges.
    ///
    /// Runs in one transaction: either the new edge exists and every
    /// conflicting edge is gone, or nothing changed.
    pub async fn create_relationship<B: StorageBackend>(
        &self,
        graph: &Graph<B>,
        key: &PropertyKey,
        owner: Option<&GraphObject>,
        related: Option<&GraphObject>,
        extra: FieldMap,
    ) -> Result<RelId> {
        let owner = owner.ok_or_else(|| Self::missing(key, Endpoint::Source))?;
        let related = related.ok_or_else(|| Self::missing(key, Endpoint::Target))?;
        let owner_id = self.owner_node(key, owner)?;
        let related_id = related.node_id().ok_or_else(|| Self::missing(key, Endpoint::Target))?;

        let backend = graph.backend();
        let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
        let outcome = self.create_in(graph, key, &mut tx, owner_id, related_id, extra).await;
        tx::finish(backend, tx, outcome).await
    }

    async fn create_in<B: StorageBackend>(
        &self,
        graph: &Graph<B>,
        key: &PropertyKey,
        tx: &mut B::Tx,
        owner: NodeId,
        related: NodeId,
        mut extra: FieldMap,
    ) -> Result<RelId> {
        let desc = &self.descriptor;
        let backend = graph.backend();
        if backend.get_node(tx, owner).await?.is_none() {
            return Err(Self::missing(key, Endpoint::Source));
        }
        if backend.get_node(tx, related).await?.is_none() {
            return Err(Self::missing(key, Endpoint::Target));
        }

        let (start, end) = desc.orient(owner, related);
        if desc.cascade != Cascade::None {
            extra.insert(CASCADE_FIELD.to_string(), Value::Int(desc.cascade.marker()));
        }
        let created = backend.create_relationship(tx, start, end, &desc.label, extra).await?;

        let mut displaced: SmallVec<[RelId; 4]> = SmallVec::new();
        if desc.cardinality.single_outgoing() {
            for rel in backend.get_relationships(tx, start, Direction::Outgoing, Some(&desc.label)).await? {
                if rel.id != created && Self::node_is(graph, tx, rel.dst, desc.end_type()).await? {
                    displaced.push(rel.id);
                }
            }
        }
        if desc.cardinality.single_incoming() {
            for rel in backend.get_relationships(tx, end, Direction::Incoming, Some(&desc.label)).await? {
                if rel.id != created
                    && !displaced.contains(&rel.id)
                    && Self::node_is(graph, tx, rel.src, desc.start_type()).await?
                {
                    displaced.push(rel.id);
                }
            }
        }

        for id in &displaced {
            debug!(rel = %id, label = %desc.label, cardinality = ?desc.cardinality, "displacing relationship");
            backend.delete_relationship(tx, *id).await?;
        }
        debug!(rel = %created, %start, %end, label = %desc.label, "created relationship");
        Ok(created)
    }

    /// Unlink `owner` from `related` according to the cardinality, returning
    /// how many edges were deleted.
    ///
    /// Single-valued sides lose every edge of the relation, not just the one
    /// to `related`; many-to-many removes exactly the edges between the pair.
    pub async fn remove_relationship<B: StorageBackend>(
        &self,
        graph: &Graph<B>,
        key: &PropertyKey,
        owner: Option<&GraphObject>,
        related: Option<&GraphObject>,
    ) -> Result<usize> {
        let owner = owner.ok_or_else(|| Self::missing(key, Endpoint::Source))?;
        let related = related.ok_or_else(|| Self::missing(key, Endpoint::Target))?;
        let owner_id = self.owner_node(key, owner)?;
        let related_id = related.node_id().ok_or_else(|| Self::missing(key, Endpoint::Target))?;

        let backend = graph.backend();
        let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
        let outcome = self.remove_in(graph, &mut tx, owner_id, related_id).await;
        tx::finish(backend, tx, outcome).await
    }

    async fn remove_in<B: StorageBackend>(
        &self,
        graph: &Graph<B>,
        tx: &mut B::Tx,
        owner: NodeId,
        related: NodeId,
    ) -> Result<usize> {
        let desc = &self.descriptor;
        let backend = graph.backend();
        let (start, end) = desc.orient(owner, related);

        let mut doomed: SmallVec<[RelId; 4]> = SmallVec::new();
        match desc.cardinality {
            Cardinality::ManyToOne | Cardinality::OneToOne => {
                for rel in backend.get_relationships(tx, start, Direction::Outgoing, Some(&desc.label)).await? {
                    if Self::node_is(graph, tx, rel.dst, desc.end_type()).await? {
                        doomed.push(rel.id);
                    }
                }
            }
            Cardinality::OneToMany => {
                for rel in backend.get_relationships(tx, end, Direction::Incoming, Some(&desc.label)).await? {
                    if Self::node_is(graph, tx, rel.src, desc.start_type()).await? {
                        doomed.push(rel.id);
                    }
                }
            }
            Cardinality::ManyToMany => {
                for rel in backend.get_relationships(tx, start, Direction::Outgoing, Some(&desc.label)).await? {
                    if rel.dst == end {
                        doomed.push(rel.id);
                    }
                }
            }
        }

        for id in &doomed {
            backend.delete_relationship(tx, *id).await?;
        }
        debug!(removed = doomed.len(), %start, %end, label = %desc.label, "removed relationships");
        Ok(doomed.len())
    }
}
