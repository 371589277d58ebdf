//! # Property Graph Model
//!
//! Plain DTOs shared by storage, the property layer and callers.
//! This module is pure data with no I/O or async.

pub mod node;
pub mod relationship;
pub mod value;
pub mod field_map;
pub mod entity;

pub use node::{Node, NodeId};
pub use relationship::{Relationship, RelId, Direction};
pub use value::{Value, ValueType, FromValue};
pub use field_map::{FieldMap, TYPE_FIELD};
pub use entity::{EntityId, GraphObject};
