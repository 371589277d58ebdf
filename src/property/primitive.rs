//! Field-backed reads and writes.

use tracing::{debug, trace};

use crate::model::*;
use crate::storage::StorageBackend;
use crate::tx::{self, TxMode};
use crate::{Error, Graph, Result};
use super::PropertyKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    /// Caller-facing write: write-once is enforced.
    Checked,
    /// Layer-internal write, e.g. the group flag.
    Internal,
}

pub(super) async fn read_field<B: StorageBackend>(
    backend: &B,
    tx: &B::Tx,
    id: EntityId,
    field: &str,
) -> Result<Value> {
    let value = match id {
        EntityId::Node(id) => backend
            .get_node(tx, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Node {id}")))?
            .fields
            .remove(field),
        EntityId::Relationship(id) => backend
            .get_relationship(tx, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Relationship {id}")))?
            .fields
            .remove(field),
    };
    Ok(value.unwrap_or(Value::Null))
}

async fn write_field<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    id: EntityId,
    field: &str,
    value: Value,
) -> Result<()> {
    match (id, value) {
        (EntityId::Node(id), Value::Null) => backend.remove_node_field(tx, id, field).await,
        (EntityId::Node(id), value) => backend.set_node_field(tx, id, field, value).await,
        (EntityId::Relationship(id), Value::Null) => backend.remove_relationship_field(tx, id, field).await,
        (EntityId::Relationship(id), value) => backend.set_relationship_field(tx, id, field, value).await,
    }
}

pub(super) async fn read<B: StorageBackend>(
    key: &PropertyKey,
    graph: &Graph<B>,
    entity: &GraphObject,
) -> Result<Value> {
    let backend = graph.backend();
    let tx = backend.begin_tx(TxMode::ReadOnly).await?;
    let outcome = read_field(backend, &tx, entity.id, key.db_name()).await;
    let stored = tx::finish(backend, tx, outcome).await?;
    trace!(entity = %entity.id, field = key.db_name(), "read field");
    key.stored_to_canonical(graph, stored)
}

pub(super) async fn write<B: StorageBackend>(
    key: &PropertyKey,
    graph: &Graph<B>,
    entity: &GraphObject,
    value: Value,
    mode: WriteMode,
) -> Result<()> {
    let stored = key.canonical_to_stored(graph, value)?;
    let backend = graph.backend();
    let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
    let outcome = write_in(key, graph, &mut tx, entity, stored, mode).await;
    tx::finish(backend, tx, outcome).await
}

async fn write_in<B: StorageBackend>(
    key: &PropertyKey,
    graph: &Graph<B>,
    tx: &mut B::Tx,
    entity: &GraphObject,
    stored: Value,
    mode: WriteMode,
) -> Result<()> {
    let backend = graph.backend();
    let current = read_field(backend, tx, entity.id, key.db_name()).await?;
    if current == stored {
        trace!(entity = %entity.id, field = key.db_name(), "value unchanged, skipping write");
        return Ok(());
    }
    if mode == WriteMode::Checked && key.is_write_once() && !current.is_empty() {
        return Err(key.read_only_violation());
    }

    write_field(backend, tx, entity.id, key.db_name(), stored).await?;

    let stamp = &graph.config().timestamps;
    if stamp.enabled {
        let now = Value::Int(graph.now().timestamp_millis());
        write_field(backend, tx, entity.id, &stamp.last_modified_field, now).await?;
    }
    debug!(entity = %entity.id, field = key.db_name(), "wrote field");
    Ok(())
}
