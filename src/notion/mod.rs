//! # Notions
//!
//! A notion decides how a related entity looks from the outside. `reduce`
//! turns a loaded node into the external value of a relation-backed property
//! (often just its id); `expand` turns such a value back into a lookup that
//! the relation engine resolves against storage.
//!
//! Notions are pure: they never touch storage themselves.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::convert::ConversionContext;
use crate::model::{Node, NodeId, Value};
use crate::Result;

/// How to find the entity an external value refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityLookup {
    Id(NodeId),
    /// First node of the destination type whose stored field equals `value`.
    Field { key: String, value: Value },
}

/// Reduces related entities for output and expands values for lookup.
pub trait Notion: Send + Sync + fmt::Debug {
    fn reduce(&self, ctx: &ConversionContext<'_>, node: &Node) -> Result<Value>;

    fn expand(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<EntityLookup>;

    /// Stored fields of the related type that this notion exposes.
    fn fields(&self) -> Vec<&str> {
        Vec::new()
    }
}

/// Node ids accepted as integers or numeric strings.
fn id_from(ctx: &ConversionContext<'_>, value: &Value) -> Result<NodeId> {
    match value {
        Value::Int(i) if *i >= 0 => Ok(NodeId(*i as u64)),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map(NodeId)
            .map_err(|_| ctx.type_mismatch("node id", value)),
        other => Err(ctx.type_mismatch("node id", other)),
    }
}

/// Reduces to the node id.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdNotion;

impl Notion for IdNotion {
    fn reduce(&self, _ctx: &ConversionContext<'_>, node: &Node) -> Result<Value> {
        Ok(Value::Int(node.id.0 as i64))
    }

    fn expand(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<EntityLookup> {
        match &value {
            Value::Map(m) => match m.get("id") {
                Some(id) => id_from(ctx, id).map(EntityLookup::Id),
                None => Err(ctx.type_mismatch("node id", &value)),
            },
            other => id_from(ctx, other).map(EntityLookup::Id),
        }
    }
}

/// Reduces to a single stored field and looks entities up by it.
#[derive(Debug, Clone)]
pub struct PropertyNotion {
    field: String,
}

impl PropertyNotion {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl Notion for PropertyNotion {
    fn reduce(&self, _ctx: &ConversionContext<'_>, node: &Node) -> Result<Value> {
        Ok(node.get(&self.field).cloned().unwrap_or(Value::Null))
    }

    fn expand(&self, _ctx: &ConversionContext<'_>, value: Value) -> Result<EntityLookup> {
        let value = match value {
            Value::Map(mut m) => m.remove(&self.field).unwrap_or(Value::Null),
            other => other,
        };
        Ok(EntityLookup::Field { key: self.field.clone(), value })
    }

    fn fields(&self) -> Vec<&str> {
        vec![self.field.as_str()]
    }
}

/// Reduces to a map of the id plus selected stored fields. Expands by id when
/// present, otherwise by the first selected field found in the input.
#[derive(Debug, Clone)]
pub struct ObjectNotion {
    fields: Vec<String>,
}

impl ObjectNotion {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { fields: fields.into_iter().map(Into::into).collect() }
    }
}

impl Notion for ObjectNotion {
    fn reduce(&self, _ctx: &ConversionContext<'_>, node: &Node) -> Result<Value> {
        let mut out = std::collections::HashMap::with_capacity(self.fields.len() + 1);
        out.insert("id".to_string(), Value::Int(node.id.0 as i64));
        for field in &self.fields {
            out.insert(field.clone(), node.get(field).cloned().unwrap_or(Value::Null));
        }
        Ok(Value::Map(out))
    }

    fn expand(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<EntityLookup> {
        let Value::Map(mut m) = value else {
            return IdNotion.expand(ctx, value);
        };
        if let Some(id) = m.get("id") {
            return id_from(ctx, id).map(EntityLookup::Id);
        }
        for field in &self.fields {
            if let Some(v) = m.remove(field) {
                return Ok(EntityLookup::Field { key: field.clone(), value: v });
            }
        }
        Err(ctx.type_mismatch("object with id or lookup field", &Value::Map(m)))
    }

    fn fields(&self) -> Vec<&str> {
        self.fields.iter().map(String::as_str).collect()
    }
}
