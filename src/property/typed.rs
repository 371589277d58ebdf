//! Statically typed handles over property keys.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::model::*;
use crate::storage::StorageBackend;
use crate::{Graph, Result};
use super::PropertyKey;

/// A `PropertyKey` whose canonical values are read as `T`.
///
/// ```rust,no_run
/// # use graph_props::*;
/// # async fn example(graph: &Graph<MemoryBackend>, ada: &GraphObject) -> Result<()> {
/// let age: TypedKey<i64> = graph.schema().typed("Person", "age")?;
/// age.set(graph, ada, 36).await?;
/// assert_eq!(age.get(graph, ada).await?, 36);
/// # Ok(())
/// # }
/// ```
pub struct TypedKey<T> {
    key: Arc<PropertyKey>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedKey<T> {
    fn clone(&self) -> Self {
        Self { key: self.key.clone(), _marker: PhantomData }
    }
}

impl<T> fmt::Debug for TypedKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedKey").field(&self.key.json_name()).finish()
    }
}

impl<T: FromValue + Into<Value>> TypedKey<T> {
    pub fn new(key: Arc<PropertyKey>) -> Self {
        Self { key, _marker: PhantomData }
    }

    pub fn key(&self) -> &Arc<PropertyKey> {
        &self.key
    }

    pub async fn get<B: StorageBackend>(&self, graph: &Graph<B>, entity: &GraphObject) -> Result<T> {
        T::from_value(&self.key.get(graph, entity).await?)
    }

    pub async fn set<B: StorageBackend>(&self, graph: &Graph<B>, entity: &GraphObject, value: T) -> Result<()> {
        self.key.set(graph, entity, value.into()).await
    }
}
