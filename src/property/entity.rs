//! Single-entity relation properties.

use tracing::trace;

use crate::model::*;
use crate::storage::StorageBackend;
use crate::{Error, Graph, Result};
use super::{PropertyKey, RelationProperty};

/// Reads and writes the one entity related to the owner.
///
/// Assigning a new entity replaces the previous one. With a cardinality that
/// already allows only one edge on the owner side the relation engine does
/// the replacing; otherwise the old edge is removed explicitly first.
#[derive(Debug, Clone)]
pub struct EntityProperty {
    relation: RelationProperty,
}

impl EntityProperty {
    pub fn new(relation: RelationProperty) -> Self {
        Self { relation }
    }

    pub fn relation(&self) -> &RelationProperty {
        &self.relation
    }

    /// The first related node, in storage order.
    pub async fn related<B: StorageBackend>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        owner: &GraphObject,
    ) -> Result<Option<Node>> {
        let nodes = self.relation.related_nodes(graph, key, owner).await?;
        Ok(nodes.into_iter().next())
    }

    pub async fn get<B: StorageBackend>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        owner: &GraphObject,
    ) -> Result<Value> {
        let Some(node) = self.related(key, graph, owner).await? else {
            return Ok(key.default_value().clone());
        };
        let ctx = graph.context(key);
        let reduced = self.relation.notion().reduce(&ctx, &node)?;
        match key.database_converter() {
            Some(conv) => conv.revert(&ctx, reduced),
            None => Ok(reduced),
        }
    }

    pub async fn set<B: StorageBackend>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        owner: &GraphObject,
        value: Value,
    ) -> Result<()> {
        let current = self.related(key, graph, owner).await?;

        if value.is_null() {
            if let Some(node) = current {
                let related = GraphObject::from_node(&node);
                self.relation.remove_relationship(graph, key, Some(owner), Some(&related)).await?;
            }
            return Ok(());
        }

        let ctx = graph.context(key);
        let value = match key.database_converter() {
            Some(conv) => conv.convert(&ctx, value)?,
            None => value,
        };
        let lookup = self.relation.notion().expand(&ctx, value)?;
        let target = self.relation.resolve(graph, key, lookup).await?.ok_or_else(|| {
            Error::NotFound(format!(
                "{} for '{}' of {}",
                self.relation.descriptor().dest_type,
                key.json_name(),
                key.declaring_type()
            ))
        })?;

        if let Some(node) = current {
            if node.id == target.id {
                trace!(owner = %owner.id, key = key.json_name(), "already related, nothing to do");
                return Ok(());
            }
            if !self.relation.descriptor().owner_is_single() {
                let old = GraphObject::from_node(&node);
                self.relation.remove_relationship(graph, key, Some(owner), Some(&old)).await?;
            }
        }

        let related = GraphObject::from_node(&target);
        self.relation
            .create_relationship(graph, key, Some(owner), Some(&related), FieldMap::new())
            .await?;
        Ok(())
    }
}
