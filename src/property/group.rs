//! Grouped keys.
//!
//! A group bundles member keys under a common stored prefix, so an `address`
//! group with `city` and `zip` members is stored as `address.city` and
//! `address.zip`. A hidden boolean field `address.null` records that the
//! group was explicitly cleared; readers short-circuit on it.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::model::*;
use crate::storage::StorageBackend;
use crate::{Graph, Result};
use super::{BoxFuture, PropertyKey, PropertyMap};

/// Suffix of the hidden "explicitly empty" flag.
pub const NULL_FLAG: &str = "null";

#[derive(Debug)]
pub struct GroupProperty {
    members: Vec<Arc<PropertyKey>>,
    null_flag: Arc<PropertyKey>,
}

impl GroupProperty {
    pub(crate) fn new(members: Vec<Arc<PropertyKey>>, null_flag: Arc<PropertyKey>) -> Self {
        Self { members, null_flag }
    }

    pub fn members(&self) -> &[Arc<PropertyKey>] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&Arc<PropertyKey>> {
        self.members.iter().find(|m| m.json_name() == name)
    }

    pub fn null_flag(&self) -> &Arc<PropertyKey> {
        &self.null_flag
    }

    /// Canonical group value: a map of the non-null members, or null when
    /// every member is null.
    pub async fn get<B: StorageBackend>(
        &self,
        _key: &PropertyKey,
        graph: &Graph<B>,
        entity: &GraphObject,
    ) -> Result<Value> {
        Ok(match self.get_map(graph, entity).await? {
            Some(map) => to_value(map),
            None => Value::Null,
        })
    }

    /// Every member with its value, or `None` when the group is empty.
    pub async fn get_map<B: StorageBackend>(
        &self,
        graph: &Graph<B>,
        entity: &GraphObject,
    ) -> Result<Option<PropertyMap>> {
        let flag = member_get(&self.null_flag, graph, entity).await?;
        if flag.as_bool() == Some(true) {
            trace!(entity = %entity.id, group = self.null_flag.db_name(), "group flagged empty");
            return Ok(None);
        }

        let mut all_null = true;
        let mut map = PropertyMap::new();
        for member in &self.members {
            let value = member_get(member, graph, entity).await?;
            all_null &= value.is_null();
            map.insert(member.clone(), value);
        }
        Ok(if all_null { None } else { Some(map) })
    }

    /// Null or an empty map sets the flag; anything else clears it and
    /// writes every member, missing ones as null.
    ///
    /// Member failures are logged and skipped so one bad member does not
    /// prevent the others from being written.
    pub async fn set<B: StorageBackend>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        entity: &GraphObject,
        value: Value,
    ) -> Result<()> {
        let mut values = match value {
            Value::Null => HashMap::new(),
            Value::Map(m) => m,
            other => return Err(graph.context(key).type_mismatch("MAP", &other)),
        };
        if values.is_empty() {
            return self.null_flag.write_internal(graph, entity, Value::Bool(true)).await;
        }

        self.null_flag.write_internal(graph, entity, Value::Bool(false)).await?;
        for member in &self.members {
            let value = values.remove(member.json_name()).unwrap_or(Value::Null);
            if let Err(e) = member_set(member, graph, entity, value).await {
                warn!(
                    entity = %entity.id,
                    group = key.json_name(),
                    member = member.json_name(),
                    error = %e,
                    "skipping group member"
                );
            }
        }
        for name in values.keys() {
            trace!(group = key.json_name(), member = %name, "ignoring unknown group member");
        }
        Ok(())
    }

    pub(crate) fn input_to_canonical<B: StorageBackend>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        value: Value,
    ) -> Result<Value> {
        self.map_members(key, graph, value, |member, v| member.input_to_canonical(graph, v))
    }

    pub(crate) fn canonical_to_input<B: StorageBackend>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        value: Value,
    ) -> Result<Value> {
        self.map_members(key, graph, value, |member, v| member.canonical_to_input(graph, v))
    }

    fn map_members<B, F>(&self, key: &PropertyKey, graph: &Graph<B>, value: Value, mut f: F) -> Result<Value>
    where
        B: StorageBackend,
        F: FnMut(&PropertyKey, Value) -> Result<Value>,
    {
        let mut values = match value {
            Value::Null => return Ok(Value::Null),
            Value::Map(m) => m,
            other => return Err(graph.context(key).type_mismatch("MAP", &other)),
        };
        let mut out = HashMap::with_capacity(values.len());
        for member in &self.members {
            if let Some(v) = values.remove(member.json_name()) {
                out.insert(member.json_name().to_string(), f(member, v)?);
            }
        }
        Ok(Value::Map(out))
    }

    /// Flatten a canonical group value into stored fields.
    pub(crate) fn to_stored<B: StorageBackend>(
        &self,
        key: &PropertyKey,
        graph: &Graph<B>,
        value: Value,
    ) -> Result<Vec<(String, Value)>> {
        let mut values = match value {
            Value::Null => HashMap::new(),
            Value::Map(m) => m,
            other => return Err(graph.context(key).type_mismatch("MAP", &other)),
        };
        let flag = self.null_flag.db_name().to_string();
        if values.is_empty() {
            return Ok(vec![(flag, Value::Bool(true))]);
        }

        let mut fields = Vec::with_capacity(self.members.len() + 1);
        fields.push((flag, Value::Bool(false)));
        for member in &self.members {
            if let Some(v) = values.remove(member.json_name()) {
                let stored = member.canonical_to_stored(graph, v)?;
                if !stored.is_null() {
                    fields.push((member.db_name().to_string(), stored));
                }
            }
        }
        Ok(fields)
    }

    /// Rebuild the canonical group value from stored fields.
    pub(crate) fn from_stored<B: StorageBackend>(&self, graph: &Graph<B>, fields: &FieldMap) -> Result<Value> {
        if fields.get(self.null_flag.db_name()).and_then(Value::as_bool) == Some(true) {
            return Ok(Value::Null);
        }
        let mut out = HashMap::new();
        for member in &self.members {
            let stored = fields.get(member.db_name()).cloned().unwrap_or(Value::Null);
            let value = member.stored_to_canonical(graph, stored)?;
            if !value.is_null() {
                out.insert(member.json_name().to_string(), value);
            }
        }
        Ok(if out.is_empty() { Value::Null } else { Value::Map(out) })
    }
}

fn to_value(map: PropertyMap) -> Value {
    Value::Map(
        map.into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.json_name().to_string(), v))
            .collect(),
    )
}

fn member_get<'a, B: StorageBackend>(
    member: &'a PropertyKey,
    graph: &'a Graph<B>,
    entity: &'a GraphObject,
) -> BoxFuture<'a, Value> {
    Box::pin(member.get(graph, entity))
}

fn member_set<'a, B: StorageBackend>(
    member: &'a PropertyKey,
    graph: &'a Graph<B>,
    entity: &'a GraphObject,
    value: Value,
) -> BoxFuture<'a, ()> {
    Box::pin(member.set(graph, entity, value))
}
