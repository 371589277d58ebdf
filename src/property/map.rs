//! Key-addressed property bags and whole-map conversion.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::*;
use crate::storage::StorageBackend;
use crate::{Graph, Result};
use super::{PropertyKey, PropertyKind};

/// Ordered map from property keys to canonical values.
///
/// Keys compare by identity: two keys with the same name declared on
/// different types are different entries.
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    entries: Vec<(Arc<PropertyKey>, Value)>,
}

/// Result of converting external or stored data without a known type.
#[derive(Debug, Clone)]
pub enum Converted {
    Typed(PropertyMap),
    /// No registered type applied, values are passed through unconverted.
    Untyped(FieldMap),
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite, keeping the original position on overwrite.
    pub fn insert(&mut self, key: Arc<PropertyKey>, value: impl Into<Value>) -> Option<Value> {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| Arc::ptr_eq(k, &key)) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn with(mut self, key: &Arc<PropertyKey>, value: impl Into<Value>) -> Self {
        self.insert(key.clone(), value);
        self
    }

    pub fn get(&self, key: &PropertyKey) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| std::ptr::eq(k.as_ref(), key))
            .map(|(_, v)| v)
    }

    /// First entry whose key has the given external name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k.json_name() == name).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &PropertyKey) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| std::ptr::eq(k.as_ref(), key))?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains_key(&self, key: &PropertyKey) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<PropertyKey>, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Arc<PropertyKey>> {
        self.entries.iter().map(|(k, _)| k)
    }

    // ========================================================================
    // Conversion
    // ========================================================================

    /// External data → canonical map.
    ///
    /// The type comes from `type_hint` or the input's own `type` entry. When
    /// neither names a registered type, the input is returned untouched as
    /// `Converted::Untyped`. Names that are not keys of the type are dropped.
    pub fn input_to_canonical<B, I>(graph: &Graph<B>, type_hint: Option<&str>, source: I) -> Result<Converted>
    where
        B: StorageBackend,
        I: IntoIterator<Item = (String, Value)>,
    {
        let source: Vec<(String, Value)> = source.into_iter().collect();
        let type_name = type_hint.map(str::to_string).or_else(|| {
            source
                .iter()
                .find(|(name, _)| name == TYPE_FIELD)
                .and_then(|(_, v)| v.as_str().map(str::to_string))
        });

        let schema = graph.schema();
        let type_name = match type_name {
            Some(t) if schema.contains_type(&t) => t,
            other => {
                warn!(type_name = ?other, "no registered type for input, passing values through");
                return Ok(Converted::Untyped(source.into_iter().collect()));
            }
        };

        let mut map = PropertyMap::new();
        for (name, value) in source {
            match schema.key(&type_name, &name) {
                Some(key) => {
                    let canonical = key.input_to_canonical(graph, value)?;
                    map.insert(key, canonical);
                }
                None if name == TYPE_FIELD => {}
                None => debug!(type_name = %type_name, name = %name, "dropping unknown input"),
            }
        }
        Ok(Converted::Typed(map))
    }

    /// Canonical map → external data keyed by external name.
    pub fn canonical_to_input<B: StorageBackend>(graph: &Graph<B>, map: &PropertyMap) -> Result<FieldMap> {
        let mut out = FieldMap::with_capacity(map.len());
        for (key, value) in map.iter() {
            out.insert(key.json_name().to_string(), key.canonical_to_input(graph, value.clone())?);
        }
        Ok(out)
    }

    /// Canonical entries → stored fields. Groups are flattened into their
    /// prefixed member fields; relation-backed keys have no fields and are
    /// skipped; null values are left out.
    pub fn canonical_to_stored<B, I>(graph: &Graph<B>, entries: I) -> Result<FieldMap>
    where
        B: StorageBackend,
        I: IntoIterator<Item = (Arc<PropertyKey>, Value)>,
    {
        let mut fields = FieldMap::new();
        for (key, value) in entries {
            match key.kind() {
                PropertyKind::Primitive => {
                    let stored = key.canonical_to_stored(graph, value)?;
                    if !stored.is_null() {
                        fields.insert(key.db_name().to_string(), stored);
                    }
                }
                PropertyKind::Group(g) => fields.extend(g.to_stored(&key, graph, value)?),
                PropertyKind::Entity(_) | PropertyKind::Collection(_) => {
                    debug!(key = key.json_name(), "relation-backed key has no stored field");
                }
            }
        }
        Ok(fields)
    }

    /// Stored fields of an entity of `type_name` → canonical map holding every
    /// field-backed key of the type, defaults filled in.
    pub fn stored_to_canonical<B: StorageBackend>(
        graph: &Graph<B>,
        type_name: &str,
        fields: &FieldMap,
    ) -> Result<Converted> {
        let schema = graph.schema();
        if !schema.contains_type(type_name) {
            warn!(type_name, "unregistered type for stored fields, passing values through");
            return Ok(Converted::Untyped(fields.clone()));
        }

        let mut map = PropertyMap::new();
        for key in schema.keys(type_name) {
            let value = match key.kind() {
                PropertyKind::Primitive => {
                    let stored = fields.get(key.db_name()).cloned().unwrap_or(Value::Null);
                    key.stored_to_canonical(graph, stored)?
                }
                PropertyKind::Group(g) => g.from_stored(graph, fields)?,
                PropertyKind::Entity(_) | PropertyKind::Collection(_) => continue,
            };
            map.insert(key, value);
        }
        Ok(Converted::Typed(map))
    }
}

impl IntoIterator for PropertyMap {
    type Item = (Arc<PropertyKey>, Value);
    type IntoIter = std::vec::IntoIter<(Arc<PropertyKey>, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(Arc<PropertyKey>, Value)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (Arc<PropertyKey>, Value)>>(iter: I) -> Self {
        let mut map = PropertyMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}
