//! The top-level handle tying a storage backend to a schema.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::LayerConfig;
use crate::convert::ConversionContext;
use crate::model::*;
use crate::property::{Cascade, Converted, PropertyKey, PropertyMap, CASCADE_FIELD};
use crate::schema::SchemaRegistry;
use crate::security::SecurityContext;
use crate::storage::StorageBackend;
use crate::tx::{self, TxMode};
use crate::{Error, Result};

/// Source of the current time for modification stamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The primary entry point. A `Graph` wraps a storage backend together with
/// the schema, configuration and identity every property operation needs.
///
/// Nothing in here is global: build one per backend (or per request when the
/// security context differs) and pass it down.
pub struct Graph<B: StorageBackend> {
    backend: B,
    schema: Arc<SchemaRegistry>,
    config: LayerConfig,
    security: SecurityContext,
    clock: Clock,
}

impl<B: StorageBackend> Graph<B> {
    pub fn new(backend: B, schema: Arc<SchemaRegistry>) -> Self {
        Self {
            backend,
            schema,
            config: LayerConfig::default(),
            security: SecurityContext::anonymous(),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_config(mut self, config: LayerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_security(mut self, security: SecurityContext) -> Self {
        self.security = security;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Access the underlying backend (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn security(&self) -> &SecurityContext {
        &self.security
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn context<'a>(&'a self, key: &'a PropertyKey) -> ConversionContext<'a> {
        ConversionContext {
            key: key.json_name(),
            owner: key.declaring_type(),
            config: &self.config,
            security: &self.security,
        }
    }

    /// Resolve a key by external name on the entity's type.
    pub fn key(&self, entity: &GraphObject, name: &str) -> Result<Arc<PropertyKey>> {
        self.schema.key(&entity.type_name, name).ok_or_else(|| Error::UnknownProperty {
            key: name.to_string(),
            owner: entity.type_name.clone(),
        })
    }

    // ========================================================================
    // String-addressable access
    // ========================================================================

    pub async fn get(&self, entity: &GraphObject, name: &str) -> Result<Value> {
        self.key(entity, name)?.get(self, entity).await
    }

    pub async fn set(&self, entity: &GraphObject, name: &str, value: Value) -> Result<()> {
        self.key(entity, name)?.set(self, entity, value).await
    }

    /// Apply externally supplied data: every known name is converted through
    /// its key's input converter and then set. Unknown names are skipped.
    pub async fn set_input<I>(&self, entity: &GraphObject, input: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        match PropertyMap::input_to_canonical(self, Some(&entity.type_name), input)? {
            Converted::Typed(map) => {
                for (key, value) in map {
                    key.set(self, entity, value).await?;
                }
                Ok(())
            }
            Converted::Untyped(_) => Err(Error::UnknownType(entity.type_name.clone())),
        }
    }

    /// Render a named view as ordered (external name, external value) pairs.
    pub async fn view(&self, entity: &GraphObject, view: &str) -> Result<Vec<(String, Value)>> {
        let keys = self.schema.view(&entity.type_name, view).ok_or_else(|| {
            Error::NotFound(format!("view '{view}' on {}", entity.type_name))
        })?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let canonical = key.get(self, entity).await?;
            let external = key.canonical_to_input(self, canonical)?;
            out.push((key.json_name().to_string(), external));
        }
        Ok(out)
    }

    // ========================================================================
    // Entity lifecycle
    // ========================================================================

    /// Load a node handle by id.
    pub async fn load(&self, id: NodeId) -> Result<Option<GraphObject>> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let outcome = self.backend.get_node(&tx, id).await;
        let node = tx::finish(&self.backend, tx, outcome).await?;
        Ok(node.as_ref().map(GraphObject::from_node))
    }

    /// Create a node of a registered type.
    ///
    /// Stored-field keys in `props` are written together with the type and
    /// the modification stamp in one transaction; relation-backed keys are
    /// assigned afterwards, each in its own transaction.
    pub async fn create_node(&self, type_name: &str, props: PropertyMap) -> Result<GraphObject> {
        if !self.schema.contains_type(type_name) {
            return Err(Error::UnknownType(type_name.to_string()));
        }

        let (stored, related): (Vec<_>, Vec<_>) = props
            .into_iter()
            .partition(|(key, _)| !key.is_relation());
        let mut fields = PropertyMap::canonical_to_stored(self, stored)?;
        fields.insert(TYPE_FIELD.to_string(), Value::from(type_name));
        if self.config.timestamps.enabled {
            fields.insert(
                self.config.timestamps.last_modified_field.clone(),
                Value::Int(self.now().timestamp_millis()),
            );
        }
        let labels = self.schema.ancestry(type_name);
        let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();

        let mut tx = self.backend.begin_tx(TxMode::ReadWrite).await?;
        let outcome = self.backend.create_node(&mut tx, &label_refs, fields).await;
        let id = tx::finish(&self.backend, tx, outcome).await?;
        debug!(node = %id, type_name, "created node");

        let entity = GraphObject::node(id, type_name);
        for (key, value) in related {
            key.set(self, &entity, value).await?;
        }
        Ok(entity)
    }

    /// Delete an entity. Nodes are detach-deleted; relationships carrying a
    /// cascade marker that points away from a deleted node take their far
    /// endpoint with them. Everything happens in one transaction.
    pub async fn delete_entity(&self, entity: &GraphObject) -> Result<()> {
        let mut tx = self.backend.begin_tx(TxMode::ReadWrite).await?;
        let outcome = match entity.id {
            EntityId::Relationship(id) => self.backend.delete_relationship(&mut tx, id).await.map(|_| ()),
            EntityId::Node(id) => self.cascade_delete(&mut tx, id).await,
        };
        tx::finish(&self.backend, tx, outcome).await
    }

    async fn cascade_delete(&self, tx: &mut B::Tx, root: NodeId) -> Result<()> {
        if self.backend.get_node(tx, root).await?.is_none() {
            return Err(Error::NotFound(format!("Node {root}")));
        }
        let mut queue = VecDeque::from([root]);
        let mut seen = HashSet::from([root]);
        while let Some(id) = queue.pop_front() {
            let rels = self.backend.get_relationships(tx, id, Direction::Both, None).await?;
            for rel in &rels {
                let cascade = rel
                    .get(CASCADE_FIELD)
                    .and_then(Value::as_int)
                    .map(Cascade::from_marker)
                    .unwrap_or(Cascade::None);
                let far = if rel.src == id && cascade.deletes_target() {
                    Some(rel.dst)
                } else if rel.dst == id && cascade.deletes_source() {
                    Some(rel.src)
                } else {
                    None
                };
                if let Some(far) = far.filter(|far| seen.insert(*far)) {
                    debug!(from = %id, to = %far, rel_type = %rel.rel_type, "cascading delete");
                    queue.push_back(far);
                }
            }
            if !self.backend.detach_delete_node(tx, id).await? {
                warn!(node = %id, "node vanished during cascade delete");
            }
        }
        Ok(())
    }
}
