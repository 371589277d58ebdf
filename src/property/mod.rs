//! # Property keys
//!
//! A `PropertyKey` is the shared, immutable descriptor of one named attribute
//! of an entity type. Keys are built once (see [`KeyBuilder`]), registered in
//! a [`SchemaRegistry`](crate::schema::SchemaRegistry) and then handed out as
//! `Arc<PropertyKey>`; every read and write goes through one.
//!
//! ```text
//! external ──input convert──▶ canonical ──db convert──▶ stored
//!          ◀─input revert────           ◀─db revert────
//! ```
//!
//! The [`PropertyKind`] decides what "stored" means: a field on the entity
//! itself, the entity on the far side of a relationship, a list of such
//! entities, or a bundle of prefixed fields.

pub mod builder;
pub mod map;
pub mod relation;
pub mod entity;
pub mod collection;
pub mod group;
pub mod typed;

mod primitive;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::convert::{ConversionContext, Converter};
use crate::model::*;
use crate::storage::StorageBackend;
use crate::{Error, Graph, Result};

pub use builder::KeyBuilder;
pub use map::{Converted, PropertyMap};
pub use relation::{
    Cardinality, Cascade, Endpoint, RelationDescriptor, RelationProperty, CASCADE_FIELD,
};
pub use entity::EntityProperty;
pub use collection::CollectionProperty;
pub use group::GroupProperty;
pub use typed::TypedKey;

pub(crate) use primitive::WriteMode;

/// Boxed future for calls that recurse through group members.
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Behavior switches of a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFlags {
    /// Managed by the layer itself, hidden from default views.
    pub system: bool,
    /// Rejects every write through `set`.
    pub read_only: bool,
    /// Accepts a write only while the current value is empty.
    pub write_once: bool,
    /// Included when building search predicates.
    pub indexed: bool,
}

/// Where a key's value lives.
#[derive(Debug)]
pub enum PropertyKind {
    /// A field on the entity itself.
    Primitive,
    /// The single entity on the far side of a relationship.
    Entity(EntityProperty),
    /// All entities on the far side of a relationship.
    Collection(CollectionProperty),
    /// A bundle of member keys stored under a common prefix.
    Group(GroupProperty),
}

/// A named, typed attribute of an entity type.
#[derive(Debug)]
pub struct PropertyKey {
    pub(crate) json_name: String,
    pub(crate) db_name: String,
    pub(crate) value_type: ValueType,
    pub(crate) default_value: Value,
    pub(crate) flags: KeyFlags,
    pub(crate) declaring_type: String,
    pub(crate) database_converter: Option<Arc<dyn Converter>>,
    pub(crate) input_converter: Option<Arc<dyn Converter>>,
    pub(crate) kind: PropertyKind,
}

impl PropertyKey {
    /// Name used in external input and output.
    pub fn json_name(&self) -> &str {
        &self.json_name
    }

    /// Name of the stored field.
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    pub fn flags(&self) -> KeyFlags {
        self.flags
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.read_only
    }

    pub fn is_write_once(&self) -> bool {
        self.flags.write_once
    }

    pub fn is_system(&self) -> bool {
        self.flags.system
    }

    pub fn is_indexed(&self) -> bool {
        self.flags.indexed
    }

    /// The entity type this key was declared on.
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn database_converter(&self) -> Option<&dyn Converter> {
        self.database_converter.as_deref()
    }

    pub fn input_converter(&self) -> Option<&dyn Converter> {
        self.input_converter.as_deref()
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    /// Whether the value is derived from relationships rather than fields.
    pub fn is_relation(&self) -> bool {
        matches!(self.kind, PropertyKind::Entity(_) | PropertyKind::Collection(_))
    }

    pub fn relation(&self) -> Option<&RelationProperty> {
        match &self.kind {
            PropertyKind::Entity(p) => Some(p.relation()),
            PropertyKind::Collection(p) => Some(p.relation()),
            _ => None,
        }
    }

    pub fn group_property(&self) -> Option<&GroupProperty> {
        match &self.kind {
            PropertyKind::Group(g) => Some(g),
            _ => None,
        }
    }

    pub(crate) fn read_only_violation(&self) -> Error {
        Error::ReadOnlyViolation {
            key: self.json_name.clone(),
            owner: self.declaring_type.clone(),
        }
    }

    fn check_writable<B: StorageBackend>(&self, graph: &Graph<B>) -> Result<()> {
        let stamp = &graph.config().timestamps;
        if self.flags.read_only || (stamp.enabled && self.db_name == stamp.last_modified_field) {
            return Err(self.read_only_violation());
        }
        Ok(())
    }

    pub(crate) fn check_canonical(&self, ctx: &ConversionContext<'_>, value: &Value) -> Result<()> {
        if self.value_type.admits(value) {
            Ok(())
        } else {
            Err(ctx.type_mismatch(self.value_type.name(), value))
        }
    }

    // ========================================================================
    // Reads and writes
    // ========================================================================

    /// Read the canonical value of this key on `entity`.
    pub async fn get<B: StorageBackend>(&self, graph: &Graph<B>, entity: &GraphObject) -> Result<Value> {
        match &self.kind {
            PropertyKind::Primitive => primitive::read(self, graph, entity).await,
            PropertyKind::Entity(p) => p.get(self, graph, entity).await,
            PropertyKind::Collection(p) => p.get(self, graph, entity).await,
            PropertyKind::Group(g) => g.get(self, graph, entity).await,
        }
    }

    /// Write a canonical value. `Value::Null` clears the property.
    pub async fn set<B: StorageBackend>(
        &self,
        graph: &Graph<B>,
        entity: &GraphObject,
        value: Value,
    ) -> Result<()> {
        self.check_writable(graph)?;
        match &self.kind {
            PropertyKind::Primitive => primitive::write(self, graph, entity, value, WriteMode::Checked).await,
            PropertyKind::Entity(p) => {
                self.check_write_once(graph, entity).await?;
                p.set(self, graph, entity, value).await
            }
            PropertyKind::Collection(p) => {
                self.check_write_once(graph, entity).await?;
                p.set(self, graph, entity, value).await
            }
            PropertyKind::Group(g) => {
                self.check_write_once(graph, entity).await?;
                g.set(self, graph, entity, value).await
            }
        }
    }

    /// Relation and group keys compare against their current canonical value;
    /// primitive keys check the stored field inside the write transaction.
    async fn check_write_once<B: StorageBackend>(&self, graph: &Graph<B>, entity: &GraphObject) -> Result<()> {
        if self.flags.write_once && !self.get(graph, entity).await?.is_empty() {
            return Err(self.read_only_violation());
        }
        Ok(())
    }

    /// Clear the property.
    pub async fn remove<B: StorageBackend>(&self, graph: &Graph<B>, entity: &GraphObject) -> Result<()> {
        self.set(graph, entity, Value::Null).await
    }

    /// Write bypassing the read-only and write-once checks.
    pub(crate) async fn write_internal<B: StorageBackend>(
        &self,
        graph: &Graph<B>,
        entity: &GraphObject,
        value: Value,
    ) -> Result<()> {
        primitive::write(self, graph, entity, value, WriteMode::Internal).await
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// External → canonical through the input converter.
    pub fn input_to_canonical<B: StorageBackend>(&self, graph: &Graph<B>, value: Value) -> Result<Value> {
        if let PropertyKind::Group(g) = &self.kind {
            return g.input_to_canonical(self, graph, value);
        }
        match &self.input_converter {
            Some(conv) => conv.convert(&graph.context(self), value),
            None => Ok(value),
        }
    }

    /// Canonical → external through the input converter.
    pub fn canonical_to_input<B: StorageBackend>(&self, graph: &Graph<B>, value: Value) -> Result<Value> {
        if let PropertyKind::Group(g) = &self.kind {
            return g.canonical_to_input(self, graph, value);
        }
        match &self.input_converter {
            Some(conv) => conv.revert(&graph.context(self), value),
            None => Ok(value),
        }
    }

    /// Canonical → stored field value. Only primitive keys have one.
    pub fn canonical_to_stored<B: StorageBackend>(&self, graph: &Graph<B>, value: Value) -> Result<Value> {
        if !matches!(self.kind, PropertyKind::Primitive) {
            return Err(Error::Unsupported(format!(
                "'{}' of {} has no single stored field",
                self.json_name, self.declaring_type
            )));
        }
        let ctx = graph.context(self);
        match &self.database_converter {
            Some(conv) => conv.convert(&ctx, value),
            None => {
                self.check_canonical(&ctx, &value)?;
                Ok(value)
            }
        }
    }

    /// Stored field value → canonical. A missing value yields the default.
    pub fn stored_to_canonical<B: StorageBackend>(&self, graph: &Graph<B>, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(self.default_value.clone());
        }
        match &self.database_converter {
            Some(conv) => conv.revert(&graph.context(self), value),
            None => Ok(value),
        }
    }
}
