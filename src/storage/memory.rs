//! In-memory storage backend.
//!
//! This is the reference implementation of `StorageBackend`.
//! It uses simple HashMaps protected by RwLock.
//!
//! ## Transactions
//!
//! Writes are applied immediately and each `MemoryTx` records an undo log.
//! `rollback_tx()` replays the log in reverse, so a rolled-back transaction
//! leaves no trace. There is no isolation: concurrent readers see
//! uncommitted writes. Safe for single-writer use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use async_trait::async_trait;
use tracing::debug;

use crate::model::*;
use crate::tx::{Transaction, TxMode, TxId};
use crate::{Error, Result};
use super::StorageBackend;

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory property graph storage.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    nodes: RwLock<HashMap<NodeId, Node>>,
    relationships: RwLock<HashMap<RelId, Relationship>>,
    /// node_id → list of relationship IDs, in creation order
    adjacency: RwLock<HashMap<NodeId, Vec<RelId>>>,
    /// label → node IDs
    label_index: RwLock<HashMap<String, Vec<NodeId>>>,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
    next_tx_id: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                nodes: RwLock::new(HashMap::new()),
                relationships: RwLock::new(HashMap::new()),
                adjacency: RwLock::new(HashMap::new()),
                label_index: RwLock::new(HashMap::new()),
                next_node_id: AtomicU64::new(1),
                next_rel_id: AtomicU64::new(1),
                next_tx_id: AtomicU64::new(1),
            }),
        }
    }

    fn insert_node(&self, node: Node) {
        let id = node.id;
        {
            let mut idx = self.inner.label_index.write();
            for label in &node.labels {
                idx.entry(label.clone()).or_default().push(id);
            }
        }
        self.inner.nodes.write().insert(id, node);
        self.inner.adjacency.write().entry(id).or_default();
    }

    fn take_node(&self, id: NodeId) -> Option<Node> {
        let removed = self.inner.nodes.write().remove(&id);
        self.inner.adjacency.write().remove(&id);
        if let Some(node) = &removed {
            let mut idx = self.inner.label_index.write();
            for label in &node.labels {
                if let Some(ids) = idx.get_mut(label) {
                    ids.retain(|nid| *nid != id);
                }
            }
        }
        removed
    }

    fn insert_relationship(&self, rel: Relationship) {
        let (id, src, dst) = (rel.id, rel.src, rel.dst);
        self.inner.relationships.write().insert(id, rel);
        let mut adj = self.inner.adjacency.write();
        adj.entry(src).or_default().push(id);
        if src != dst {
            adj.entry(dst).or_default().push(id);
        }
    }

    fn take_relationship(&self, id: RelId) -> Option<Relationship> {
        let removed = self.inner.relationships.write().remove(&id);
        if let Some(rel) = &removed {
            let mut adj = self.inner.adjacency.write();
            if let Some(rels) = adj.get_mut(&rel.src) {
                rels.retain(|rid| *rid != id);
            }
            if rel.src != rel.dst {
                if let Some(rels) = adj.get_mut(&rel.dst) {
                    rels.retain(|rid| *rid != id);
                }
            }
        }
        removed
    }

    fn restore_node_field(&self, id: NodeId, key: String, previous: Option<Value>) {
        if let Some(node) = self.inner.nodes.write().get_mut(&id) {
            match previous {
                Some(val) => { node.fields.insert(key, val); }
                None => { node.fields.remove(&key); }
            }
        }
    }

    fn restore_relationship_field(&self, id: RelId, key: String, previous: Option<Value>) {
        if let Some(rel) = self.inner.relationships.write().get_mut(&id) {
            match previous {
                Some(val) => { rel.fields.insert(key, val); }
                None => { rel.fields.remove(&key); }
            }
        }
    }

    fn undo(&self, op: Undo) {
        match op {
            Undo::CreatedNode(id) => { self.take_node(id); }
            Undo::DeletedNode(node) => self.insert_node(node),
            Undo::NodeField { id, key, previous } => self.restore_node_field(id, key, previous),
            Undo::CreatedRelationship(id) => { self.take_relationship(id); }
            Undo::DeletedRelationship(rel) => self.insert_relationship(rel),
            Undo::RelationshipField { id, key, previous } => {
                self.restore_relationship_field(id, key, previous)
            }
        }
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

/// Inverse of one applied mutation.
#[derive(Debug)]
enum Undo {
    CreatedNode(NodeId),
    DeletedNode(Node),
    NodeField { id: NodeId, key: String, previous: Option<Value> },
    CreatedRelationship(RelId),
    DeletedRelationship(Relationship),
    RelationshipField { id: RelId, key: String, previous: Option<Value> },
}

/// In-memory transaction: an id, a mode and the undo log of its writes.
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
    undo: Vec<Undo>,
}

impl MemoryTx {
    fn check_writable(&self) -> Result<()> {
        match self.mode {
            TxMode::ReadWrite => Ok(()),
            TxMode::ReadOnly => Err(Error::TxError(format!(
                "transaction {} is read-only",
                self.id.0
            ))),
        }
    }
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
}

// ============================================================================
// StorageBackend impl
// ============================================================================

#[async_trait]
impl StorageBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn shutdown(&self) -> Result<()> { Ok(()) }

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        Ok(MemoryTx { id, mode, undo: Vec::new() })
    }

    /// Writes are already applied; committing just drops the undo log.
    async fn commit_tx(&self, _tx: MemoryTx) -> Result<()> { Ok(()) }

    async fn rollback_tx(&self, mut tx: MemoryTx) -> Result<()> {
        debug!(tx = tx.id.0, ops = tx.undo.len(), "rolling back memory transaction");
        while let Some(op) = tx.undo.pop() {
            self.undo(op);
        }
        Ok(())
    }

    // ========================================================================
    // Node CRUD
    // ========================================================================

    async fn create_node(
        &self,
        tx: &mut MemoryTx,
        labels: &[&str],
        fields: FieldMap,
    ) -> Result<NodeId> {
        tx.check_writable()?;
        let id = NodeId(self.inner.next_node_id.fetch_add(1, Ordering::Relaxed));
        let node = Node {
            id,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            fields,
        };
        self.insert_node(node);
        tx.undo.push(Undo::CreatedNode(id));
        Ok(id)
    }

    async fn get_node(&self, _tx: &MemoryTx, id: NodeId) -> Result<Option<Node>> {
        Ok(self.inner.nodes.read().get(&id).cloned())
    }

    async fn delete_node(&self, tx: &mut MemoryTx, id: NodeId) -> Result<bool> {
        tx.check_writable()?;
        {
            let adj = self.inner.adjacency.read();
            if let Some(rels) = adj.get(&id) {
                if !rels.is_empty() {
                    return Err(Error::ConstraintViolation(
                        format!("Cannot delete node {id} with {} relationships. Delete relationships first.", rels.len())
                    ));
                }
            }
        }

        let removed = self.take_node(id);
        let existed = removed.is_some();
        if let Some(node) = removed {
            tx.undo.push(Undo::DeletedNode(node));
        }
        Ok(existed)
    }

    async fn set_node_field(
        &self,
        tx: &mut MemoryTx,
        id: NodeId,
        key: &str,
        val: Value,
    ) -> Result<()> {
        tx.check_writable()?;
        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
        let previous = node.fields.insert(key.to_string(), val);
        tx.undo.push(Undo::NodeField { id, key: key.to_string(), previous });
        Ok(())
    }

    async fn remove_node_field(
        &self,
        tx: &mut MemoryTx,
        id: NodeId,
        key: &str,
    ) -> Result<()> {
        tx.check_writable()?;
        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
        if let Some(previous) = node.fields.remove(key) {
            tx.undo.push(Undo::NodeField { id, key: key.to_string(), previous: Some(previous) });
        }
        Ok(())
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    async fn create_relationship(
        &self,
        tx: &mut MemoryTx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        fields: FieldMap,
    ) -> Result<RelId> {
        tx.check_writable()?;
        {
            let nodes = self.inner.nodes.read();
            if !nodes.contains_key(&src) {
                return Err(Error::NotFound(format!("Source node {src}")));
            }
            if !nodes.contains_key(&dst) {
                return Err(Error::NotFound(format!("Target node {dst}")));
            }
        }

        let id = RelId(self.inner.next_rel_id.fetch_add(1, Ordering::Relaxed));
        self.insert_relationship(Relationship {
            id,
            src,
            dst,
            rel_type: rel_type.to_string(),
            fields,
        });
        tx.undo.push(Undo::CreatedRelationship(id));
        Ok(id)
    }

    async fn get_relationship(&self, _tx: &MemoryTx, id: RelId) -> Result<Option<Relationship>> {
        Ok(self.inner.relationships.read().get(&id).cloned())
    }

    async fn delete_relationship(&self, tx: &mut MemoryTx, id: RelId) -> Result<bool> {
        tx.check_writable()?;
        let removed = self.take_relationship(id);
        let existed = removed.is_some();
        if let Some(rel) = removed {
            tx.undo.push(Undo::DeletedRelationship(rel));
        }
        Ok(existed)
    }

    async fn set_relationship_field(
        &self,
        tx: &mut MemoryTx,
        id: RelId,
        key: &str,
        val: Value,
    ) -> Result<()> {
        tx.check_writable()?;
        let mut rels = self.inner.relationships.write();
        let rel = rels.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Relationship {id}")))?;
        let previous = rel.fields.insert(key.to_string(), val);
        tx.undo.push(Undo::RelationshipField { id, key: key.to_string(), previous });
        Ok(())
    }

    async fn remove_relationship_field(
        &self,
        tx: &mut MemoryTx,
        id: RelId,
        key: &str,
    ) -> Result<()> {
        tx.check_writable()?;
        let mut rels = self.inner.relationships.write();
        let rel = rels.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Relationship {id}")))?;
        if let Some(previous) = rel.fields.remove(key) {
            tx.undo.push(Undo::RelationshipField { id, key: key.to_string(), previous: Some(previous) });
        }
        Ok(())
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    async fn get_relationships(
        &self,
        _tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        let adj = self.inner.adjacency.read();
        let rels = self.inner.relationships.read();

        let rel_ids = adj.get(&node).cloned().unwrap_or_default();
        let mut result = Vec::new();

        for rid in rel_ids {
            if let Some(rel) = rels.get(&rid) {
                let matches_dir = match dir {
                    Direction::Outgoing => rel.src == node,
                    Direction::Incoming => rel.dst == node,
                    Direction::Both => true,
                };
                let matches_type = rel_type.is_none_or(|t| rel.rel_type == t);

                if matches_dir && matches_type {
                    result.push(rel.clone());
                }
            }
        }

        Ok(result)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    async fn node_count(&self, _tx: &MemoryTx) -> Result<u64> {
        Ok(self.inner.nodes.read().len() as u64)
    }

    async fn relationship_count(&self, _tx: &MemoryTx) -> Result<u64> {
        Ok(self.inner.relationships.read().len() as u64)
    }

    // ========================================================================
    // Scan
    // ========================================================================

    async fn nodes_by_label(&self, _tx: &MemoryTx, label: &str) -> Result<Vec<Node>> {
        let idx = self.inner.label_index.read();
        let nodes = self.inner.nodes.read();

        let ids = idx.get(label).cloned().unwrap_or_default();
        Ok(ids.iter().filter_map(|id| nodes.get(id).cloned()).collect())
    }

    async fn nodes_by_field(
        &self,
        _tx: &MemoryTx,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>> {
        let idx = self.inner.label_index.read();
        let nodes = self.inner.nodes.read();

        let ids = idx.get(label).cloned().unwrap_or_default();
        Ok(ids.iter()
            .filter_map(|id| nodes.get(id))
            .filter(|n| n.get(key) == Some(value))
            .cloned()
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
