//! Fluent construction of property keys.
//!
//! ```rust
//! use graph_props::{Cardinality, PropertyKey, RelationDescriptor};
//!
//! let name = PropertyKey::string("name").indexed();
//! let born = PropertyKey::date("born", Some("%Y-%m-%d")).write_once();
//! let employer = PropertyKey::entity(
//!     "employer",
//!     RelationDescriptor::new("Person", "WORKS_AT", "Company", Cardinality::ManyToOne),
//! );
//! ```
//!
//! A builder becomes a shared key when its type is registered with a
//! [`SchemaBuilder`](crate::schema::SchemaBuilder).

use std::collections::HashSet;
use std::sync::Arc;

use crate::convert::*;
use crate::model::{Value, ValueType};
use crate::notion::{IdNotion, Notion};
use crate::{Error, Result};
use super::*;

#[derive(Debug, Clone)]
enum Shape {
    Primitive,
    Entity(RelationDescriptor),
    Collection(RelationDescriptor),
    Group(Vec<KeyBuilder>),
}

/// Unbuilt property key.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    json_name: String,
    db_name: Option<String>,
    value_type: ValueType,
    default_value: Value,
    flags: KeyFlags,
    database_converter: Option<Arc<dyn Converter>>,
    input_converter: Option<Arc<dyn Converter>>,
    notion: Option<Arc<dyn Notion>>,
    /// Date format declared by `PropertyKey::date`, checked on build.
    date_pattern: Option<String>,
    shape: Shape,
}

fn scalar_input(value_type: ValueType) -> Option<Arc<dyn Converter>> {
    match value_type {
        ValueType::String => Some(Arc::new(StringConverter)),
        ValueType::Int => Some(Arc::new(IntConverter)),
        ValueType::Float => Some(Arc::new(FloatConverter)),
        ValueType::Bool => Some(Arc::new(BoolConverter)),
        ValueType::DateTime => Some(Arc::new(DateConverter::input(None))),
        _ => None,
    }
}

impl PropertyKey {
    /// A plain field of the given type with no converters.
    pub fn builder(name: impl Into<String>, value_type: ValueType) -> KeyBuilder {
        KeyBuilder::new(name.into(), value_type, Shape::Primitive)
    }

    pub fn string(name: impl Into<String>) -> KeyBuilder {
        Self::builder(name, ValueType::String).input_converter(StringConverter)
    }

    pub fn int(name: impl Into<String>) -> KeyBuilder {
        Self::builder(name, ValueType::Int).input_converter(IntConverter)
    }

    pub fn float(name: impl Into<String>) -> KeyBuilder {
        Self::builder(name, ValueType::Float).input_converter(FloatConverter)
    }

    pub fn bool(name: impl Into<String>) -> KeyBuilder {
        Self::builder(name, ValueType::Bool).input_converter(BoolConverter)
    }

    /// Stored as epoch milliseconds, rendered with `pattern` (or the
    /// configured default).
    pub fn date(name: impl Into<String>, pattern: Option<&str>) -> KeyBuilder {
        let pattern = pattern.map(str::to_string);
        let mut builder = Self::builder(name, ValueType::DateTime)
            .database_converter(DateConverter::storage(pattern.clone()))
            .input_converter(DateConverter::input(pattern.clone()));
        builder.date_pattern = pattern;
        builder
    }

    /// A string restricted to `constants`, checked on both boundaries.
    pub fn enumeration<I, S>(name: impl Into<String>, constants: I) -> KeyBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let conv = EnumConverter::new(constants);
        Self::builder(name, ValueType::String)
            .database_converter(conv.clone())
            .input_converter(conv)
    }

    /// Hashed on write, masked on output.
    pub fn password(name: impl Into<String>) -> KeyBuilder {
        Self::builder(name, ValueType::String)
            .database_converter(PasswordConverter::storage())
            .input_converter(PasswordConverter::input())
    }

    /// A list whose elements are parsed like a scalar key of `element` type.
    pub fn array(name: impl Into<String>, element: ValueType) -> KeyBuilder {
        let builder = Self::builder(name, ValueType::List);
        match scalar_input(element) {
            Some(conv) => builder.input_converter(ArrayConverter::new(conv)),
            None => builder,
        }
    }

    /// The single entity related through `relation`.
    pub fn entity(name: impl Into<String>, relation: RelationDescriptor) -> KeyBuilder {
        KeyBuilder::new(name.into(), ValueType::Any, Shape::Entity(relation))
    }

    /// Every entity related through `relation`.
    pub fn collection(name: impl Into<String>, relation: RelationDescriptor) -> KeyBuilder {
        KeyBuilder::new(name.into(), ValueType::List, Shape::Collection(relation))
    }

    /// Member keys stored as `<name>.<member>` fields.
    pub fn group(name: impl Into<String>, members: impl IntoIterator<Item = KeyBuilder>) -> KeyBuilder {
        KeyBuilder::new(name.into(), ValueType::Map, Shape::Group(members.into_iter().collect()))
    }
}

impl KeyBuilder {
    fn new(json_name: String, value_type: ValueType, shape: Shape) -> Self {
        Self {
            json_name,
            db_name: None,
            value_type,
            default_value: Value::Null,
            flags: KeyFlags::default(),
            database_converter: None,
            input_converter: None,
            notion: None,
            date_pattern: None,
            shape,
        }
    }

    pub fn json_name(&self) -> &str {
        &self.json_name
    }

    /// Store under a different field name than the external one.
    pub fn db_name(mut self, name: impl Into<String>) -> Self {
        self.db_name = Some(name.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = value.into();
        self
    }

    pub fn read_only(mut self) -> Self {
        self.flags.read_only = true;
        self
    }

    pub fn write_once(mut self) -> Self {
        self.flags.write_once = true;
        self
    }

    pub fn system(mut self) -> Self {
        self.flags.system = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.flags.indexed = true;
        self
    }

    /// How related entities are reduced and looked up. Defaults to the id.
    pub fn notion(mut self, notion: impl Notion + 'static) -> Self {
        self.notion = Some(Arc::new(notion));
        self
    }

    pub fn database_converter(mut self, conv: impl Converter + 'static) -> Self {
        self.database_converter = Some(Arc::new(conv));
        self
    }

    pub fn input_converter(mut self, conv: impl Converter + 'static) -> Self {
        self.input_converter = Some(Arc::new(conv));
        self
    }

    pub(crate) fn build(self, owner: &str) -> Result<Arc<PropertyKey>> {
        self.build_with_prefix(owner, None)
    }

    fn build_with_prefix(self, owner: &str, prefix: Option<&str>) -> Result<Arc<PropertyKey>> {
        let schema_err = |msg: &str| Error::Schema(format!("'{}' on {owner}: {msg}", self.json_name));

        if !self.value_type.admits(&self.default_value) {
            return Err(schema_err(&format!(
                "default {} is not a {}",
                self.default_value.type_name(),
                self.value_type.name()
            )));
        }

        if let Some(pattern) = &self.date_pattern {
            if !is_valid_pattern(pattern) {
                return Err(schema_err(&format!("invalid date pattern '{pattern}'")));
            }
        }

        let base = self.db_name.clone().unwrap_or_else(|| self.json_name.clone());
        let db_name = match prefix {
            Some(prefix) => format!("{prefix}.{base}"),
            None => base,
        };

        let kind = match self.shape {
            Shape::Primitive => PropertyKind::Primitive,
            Shape::Entity(_) | Shape::Collection(_) if prefix.is_some() => {
                return Err(schema_err("relation-backed keys cannot be group members"));
            }
            Shape::Entity(desc) | Shape::Collection(desc) if desc.direction == Direction::Both => {
                return Err(Error::Schema(format!(
                    "relation '{}' from {} must be outgoing or incoming",
                    desc.label, desc.source_type
                )));
            }
            Shape::Entity(desc) => {
                let notion = self.notion.clone().unwrap_or_else(|| Arc::new(IdNotion));
                PropertyKind::Entity(EntityProperty::new(RelationProperty::new(Arc::new(desc), notion)))
            }
            Shape::Collection(desc) => {
                let notion = self.notion.clone().unwrap_or_else(|| Arc::new(IdNotion));
                PropertyKind::Collection(CollectionProperty::new(RelationProperty::new(Arc::new(desc), notion)))
            }
            Shape::Group(_) if prefix.is_some() => {
                return Err(schema_err("groups cannot be nested"));
            }
            Shape::Group(members) => {
                let mut seen = HashSet::new();
                let mut built = Vec::with_capacity(members.len());
                for member in members {
                    if !seen.insert(member.json_name.clone()) {
                        return Err(schema_err(&format!("duplicate member '{}'", member.json_name)));
                    }
                    built.push(member.build_with_prefix(owner, Some(&db_name))?);
                }
                let flag = PropertyKey::bool(format!("{}.{}", self.json_name, group::NULL_FLAG))
                    .db_name(format!("{db_name}.{}", group::NULL_FLAG))
                    .read_only()
                    .system()
                    .build(owner)?;
                PropertyKind::Group(GroupProperty::new(built, flag))
            }
        };

        Ok(Arc::new(PropertyKey {
            json_name: self.json_name,
            db_name,
            value_type: self.value_type,
            default_value: self.default_value,
            flags: self.flags,
            declaring_type: owner.to_string(),
            database_converter: self.database_converter,
            input_converter: self.input_converter,
            kind,
        }))
    }
}
