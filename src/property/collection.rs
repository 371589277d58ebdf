//! Multi-entity relation properties.

use std::cmp::Ordering;

use tracing::trace;

use crate::model::*;
use crate::storage::StorageBackend;
use crate::{Error, Graph, Result};
use super::{PropertyKey, RelationProperty};

/// Reads and writes every entity related to the owner.
///
/// Assigning a list links each listed entity but never unlinks entities that
/// are missing from it; assigning null unlinks everything. Every list element
/// is resolved before the first link is made, so an unknown element fails the
/// whole assignment without touching the graph. Each link still commits on its
/// own, so a storage failure midway leaves the earlier links in place.
#[derive(Debug, Clone)]
pub struct CollectionProperty {
    relation: RelationProperty,
}

impl CollectionProperty {
    pub fn new(relation: RelationProperty) -> Self {
        Self { relation }
    }

    pub fn relation(&self) -> &RelationProperty {
        &self.relation
    }

    /// Related nodes in storage order.
    pub async fn related<B: StorageBackend>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        owner: &GraphObject,
    ) -> Result<Vec<Node>> {
        self.relation.related_nodes(graph, key, owner).await
    }

    fn reduce_all<B: StorageBackend>(&self, key: &PropertyKey, graph: &Graph<B>, nodes: &[Node]) -> Result<Vec<Value>> {
        let ctx = graph.context(key);
        nodes
            .iter()
            .map(|node| {
                let reduced = self.relation.notion().reduce(&ctx, node)?;
                match key.database_converter() {
                    Some(conv) => conv.revert(&ctx, reduced),
                    None => Ok(reduced),
                }
            })
            .collect()
    }

    pub async fn get<B: StorageBackend>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        owner: &GraphObject,
    ) -> Result<Value> {
        let nodes = self.related(key, graph, owner).await?;
        Ok(Value::List(self.reduce_all(key, graph, &nodes)?))
    }

    /// Reduced values ordered by `compare`.
    pub async fn get_sorted<B, F>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        owner: &GraphObject,
        compare: F,
    ) -> Result<Vec<Value>>
    where
        B: StorageBackend,
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let nodes = self.related(key, graph, owner).await?;
        let mut values = self.reduce_all(key, graph, &nodes)?;
        values.sort_by(compare);
        Ok(values)
    }

    pub async fn set<B: StorageBackend>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        owner: &GraphObject,
        value: Value,
    ) -> Result<()> {
        match value {
            Value::Null => {
                for node in self.related(key, graph, owner).await? {
                    let related = GraphObject::from_node(&node);
                    self.relation.remove_relationship(graph, key, Some(owner), Some(&related)).await?;
                }
                Ok(())
            }
            Value::List(items) => {
                let mut targets = Vec::with_capacity(items.len());
                for item in items {
                    targets.push(self.resolve_target(key, graph, item).await?);
                }
                for target in &targets {
                    self.link(key, graph, owner, target).await?;
                }
                Ok(())
            }
            other => Err(graph.context(key).type_mismatch("LIST", &other)),
        }
    }

    async fn resolve<B: StorageBackend>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        item: Value,
    ) -> Result<Option<Node>> {
        let ctx = graph.context(key);
        let item = match key.database_converter() {
            Some(conv) => conv.convert(&ctx, item)?,
            None => item,
        };
        let lookup = self.relation.notion().expand(&ctx, item)?;
        self.relation.resolve(graph, key, lookup).await
    }

    async fn resolve_target<B: StorageBackend>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        item: Value,
    ) -> Result<Node> {
        self.resolve(key, graph, item).await?.ok_or_else(|| {
            Error::NotFound(format!(
                "{} for '{}' of {}",
                self.relation.descriptor().dest_type,
                key.json_name(),
                key.declaring_type()
            ))
        })
    }

    /// Link one more entity. Returns false if it was already linked.
    pub async fn add<B: StorageBackend>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        owner: &GraphObject,
        item: Value,
    ) -> Result<bool> {
        let target = self.resolve_target(key, graph, item).await?;
        self.link(key, graph, owner, &target).await
    }

    async fn link<B: StorageBackend>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        owner: &GraphObject,
        target: &Node,
    ) -> Result<bool> {
        let present = self.related(key, graph, owner).await?;
        if present.iter().any(|n| n.id == target.id) {
            trace!(owner = %owner.id, related = %target.id, "already linked");
            return Ok(false);
        }
        let related = GraphObject::from_node(target);
        self.relation
            .create_relationship(graph, key, Some(owner), Some(&related), FieldMap::new())
            .await?;
        Ok(true)
    }

    /// Unlink one entity. Returns false if it was not linked.
    pub async fn remove_item<B: StorageBackend>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        owner: &GraphObject,
        item: Value,
    ) -> Result<bool> {
        let Some(target) = self.resolve(key, graph, item).await? else {
            return Ok(false);
        };
        let present = self.related(key, graph, owner).await?;
        if !present.iter().any(|n| n.id == target.id) {
            return Ok(false);
        }
        let related = GraphObject::from_node(&target);
        let removed = self.relation.remove_relationship(graph, key, Some(owner), Some(&related)).await?;
        Ok(removed > 0)
    }
}
