//! # graph-props: Typed Properties over a Property Graph
//!
//! A property and relationship-mapping layer between application code and a
//! graph store. Callers read and write named, typed attributes on nodes and
//! relationships through shared [`PropertyKey`] handles. Some attributes are
//! plain stored fields; others are derived from relationships, and assigning
//! them keeps the declared cardinality of the relationship intact.
//!
//! ## Design Principles
//!
//! 1. **Trait-first storage**: `StorageBackend` is the only way to reach the graph
//! 2. **Keys are shared and immutable**: built once in a `SchemaRegistry`, used everywhere
//! 3. **Three representations**: external ⇄ canonical ⇄ stored, via `Converter`s
//! 4. **No globals**: the registry and the `Graph` handle are passed explicitly
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use graph_props::{Graph, PropertyKey, PropertyMap, SchemaRegistry, TypeDef, Value};
//! use graph_props::storage::MemoryBackend;
//!
//! # async fn example() -> graph_props::Result<()> {
//! let schema = SchemaRegistry::builder()
//!     .entity(TypeDef::new("Person").key(PropertyKey::string("name")))
//!     .build()?;
//! let graph = Graph::new(MemoryBackend::new(), Arc::new(schema));
//!
//! let ada = graph.create_node("Person", PropertyMap::new()).await?;
//! graph.set(&ada, "name", Value::from("Ada")).await?;
//! assert_eq!(graph.get(&ada, "name").await?, Value::from("Ada"));
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod storage;
pub mod tx;
pub mod config;
pub mod security;
pub mod convert;
pub mod notion;
pub mod property;
pub mod schema;
pub mod search;

mod graph;

// ============================================================================
// Re-exports
// ============================================================================

pub use model::{
    Node, Relationship, Value, ValueType, FromValue, FieldMap,
    NodeId, RelId, Direction, EntityId, GraphObject,
};
pub use storage::{StorageBackend, MemoryBackend};
pub use tx::{Transaction, TxMode, TxId};
pub use config::LayerConfig;
pub use security::SecurityContext;
pub use convert::{Converter, ConversionContext};
pub use notion::{Notion, EntityLookup};
pub use property::{
    PropertyKey, KeyBuilder, PropertyKind, PropertyMap, Converted, TypedKey,
    Cardinality, Cascade, RelationDescriptor, Endpoint,
};
pub use schema::{SchemaRegistry, SchemaBuilder, TypeDef, VariantDef};
pub use search::{SearchPredicate, Occur, searchable_keys};
pub use graph::{Graph, Clock};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Property '{key}' of {owner} is read-only")]
    ReadOnlyViolation { key: String, owner: String },

    #[error("Type mismatch for '{key}' of {owner}: expected {expected}, got {got}")]
    TypeMismatch { key: String, owner: String, expected: String, got: String },

    #[error("Value {value} not allowed for '{key}' of {owner}, expected one of [{allowed}]")]
    ValueNotAllowed { key: String, owner: String, value: String, allowed: String },

    #[error("Cannot parse {value} as a date for '{key}' of {owner} using pattern '{pattern}'")]
    FormatInvalid { key: String, owner: String, value: String, pattern: String },

    #[error("Value for '{key}' of {owner} is too short, minimum length is {min_length}")]
    TooShort { key: String, owner: String, min_length: usize },

    #[error("{side} id not found for relationship '{key}' of {owner}")]
    MissingEndpoint { key: String, owner: String, side: Endpoint },

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Unknown property '{key}' on {owner}")]
    UnknownProperty { key: String, owner: String },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Transaction error: {0}")]
    TxError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
