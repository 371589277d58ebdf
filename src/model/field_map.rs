//! FieldMap: the raw stored fields on nodes and relationships.

use std::collections::HashMap;
use super::Value;

/// A map of stored field names to stored values.
pub type FieldMap = HashMap<String, Value>;

/// Stored field holding an entity's concrete type name.
pub const TYPE_FIELD: &str = "type";

impl Value {
    /// Build a map value from (key, value) pairs.
    pub fn map<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
