//! # Search predicates
//!
//! Keys translate a caller's search value into predicates over stored
//! representations. Executing them is up to an external query layer; this
//! module only builds the tree.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::*;
use crate::notion::EntityLookup;
use crate::property::{PropertyKey, PropertyKind};
use crate::schema::SchemaRegistry;
use crate::storage::StorageBackend;
use crate::{Error, Graph, Result};

/// How a predicate combines with its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SearchPredicate {
    /// Stored field equals `value`.
    Exact { owner: String, field: String, value: Value, occur: Occur },
    /// Stored string field contains `text`, case-insensitively.
    Fuzzy { owner: String, field: String, text: String, occur: Occur },
    /// Stored field within `[from, to]`; a null bound is open.
    Range { owner: String, field: String, from: Value, to: Value, occur: Occur },
    /// Owner is related through `label` to the entity `lookup` finds.
    Related {
        owner: String,
        label: String,
        direction: Direction,
        dest_type: String,
        lookup: EntityLookup,
        occur: Occur,
    },
    /// All children apply together, combined by their own `occur`.
    Group { occur: Occur, children: Vec<SearchPredicate> },
}

impl SearchPredicate {
    pub fn occur(&self) -> Occur {
        match self {
            SearchPredicate::Exact { occur, .. }
            | SearchPredicate::Fuzzy { occur, .. }
            | SearchPredicate::Range { occur, .. }
            | SearchPredicate::Related { occur, .. }
            | SearchPredicate::Group { occur, .. } => *occur,
        }
    }
}

impl PropertyKey {
    /// Predicate matching `value` given in external form.
    ///
    /// Strings become substring matches unless `exact` is set. Relation keys
    /// expand the value through their notion; groups produce one child per
    /// member present in the value.
    pub fn build_search_predicate<B: StorageBackend>(
        &self,
        graph: &Graph<B>,
        occur: Occur,
        value: Value,
        exact: bool,
    ) -> Result<SearchPredicate> {
        let owner = self.declaring_type().to_string();
        match self.kind() {
            PropertyKind::Primitive => {
                let canonical = self.input_to_canonical(graph, value)?;
                let field = self.db_name().to_string();
                match self.canonical_to_stored(graph, canonical)? {
                    Value::String(text) if !exact => Ok(SearchPredicate::Fuzzy { owner, field, text, occur }),
                    value => Ok(SearchPredicate::Exact { owner, field, value, occur }),
                }
            }
            PropertyKind::Entity(_) | PropertyKind::Collection(_) => {
                let Some(relation) = self.relation() else {
                    return Err(Error::Unsupported(format!("'{}' has no relation", self.json_name())));
                };
                let ctx = graph.context(self);
                let canonical = self.input_to_canonical(graph, value)?;
                let lookup = relation.notion().expand(&ctx, canonical)?;
                let desc = relation.descriptor();
                Ok(SearchPredicate::Related {
                    owner,
                    label: desc.label.clone(),
                    direction: desc.direction,
                    dest_type: desc.dest_type.clone(),
                    lookup,
                    occur,
                })
            }
            PropertyKind::Group(group) => {
                let mut values = match value {
                    Value::Map(m) => m,
                    other => return Err(graph.context(self).type_mismatch("MAP", &other)),
                };
                let mut children = Vec::with_capacity(values.len());
                for member in group.members() {
                    if let Some(v) = values.remove(member.json_name()) {
                        children.push(member.build_search_predicate(graph, Occur::Must, v, exact)?);
                    }
                }
                Ok(SearchPredicate::Group { occur, children })
            }
        }
    }

    /// Predicate for a value range. Only field-backed keys support ranges.
    pub fn build_range_predicate<B: StorageBackend>(
        &self,
        graph: &Graph<B>,
        occur: Occur,
        from: Value,
        to: Value,
    ) -> Result<SearchPredicate> {
        if !matches!(self.kind(), PropertyKind::Primitive) {
            return Err(Error::Unsupported(format!(
                "range search on '{}' of {}",
                self.json_name(),
                self.declaring_type()
            )));
        }
        let bound = |v: Value| -> Result<Value> {
            let canonical = self.input_to_canonical(graph, v)?;
            self.canonical_to_stored(graph, canonical)
        };
        Ok(SearchPredicate::Range {
            owner: self.declaring_type().to_string(),
            field: self.db_name().to_string(),
            from: bound(from)?,
            to: bound(to)?,
            occur,
        })
    }

    /// Add the nested keys a query layer may search on directly: group
    /// members, and the keys of the destination type that a relation's
    /// notion exposes.
    pub fn register_searchable_keys(&self, schema: &SchemaRegistry, keys: &mut Vec<Arc<PropertyKey>>) {
        let mut push = |key: &Arc<PropertyKey>| {
            if !keys.iter().any(|k| Arc::ptr_eq(k, key)) {
                keys.push(key.clone());
            }
        };
        if let Some(group) = self.group_property() {
            group.members().iter().for_each(&mut push);
        }
        if let Some(relation) = self.relation() {
            let dest = &relation.descriptor().dest_type;
            for field in relation.notion().fields() {
                if let Some(key) = schema.key(dest, field) {
                    push(&key);
                }
            }
        }
    }
}

/// Indexed keys of a type together with the nested keys they advertise.
pub fn searchable_keys(schema: &SchemaRegistry, type_name: &str) -> Vec<Arc<PropertyKey>> {
    let mut keys = Vec::new();
    for key in schema.keys(type_name).into_iter().filter(|k| k.is_indexed()) {
        key.register_searchable_keys(schema, &mut keys);
        if !keys.iter().any(|k| Arc::ptr_eq(k, &key)) {
            keys.push(key);
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notion::PropertyNotion;
    use crate::property::{Cardinality, RelationDescriptor};
    use crate::schema::TypeDef;
    use crate::MemoryBackend;
    use pretty_assertions::assert_eq;

    fn graph() -> Graph<MemoryBackend> {
        let schema = SchemaRegistry::builder()
            .entity(
                TypeDef::new("Person")
                    .key(PropertyKey::string("name").indexed())
                    .key(PropertyKey::int("age").indexed())
                    .key(PropertyKey::enumeration("status", ["active", "retired"]))
                    .key(PropertyKey::date("born", Some("%Y-%m-%d")))
                    .key(PropertyKey::group("address", [PropertyKey::string("city"), PropertyKey::string("zip")]).indexed())
                    .key(
                        PropertyKey::entity(
                            "employer",
                            RelationDescriptor::new("Person", "WORKS_AT", "Company", Cardinality::ManyToOne),
                        )
                        .notion(PropertyNotion::new("name"))
                        .indexed(),
                    ),
            )
            .entity(TypeDef::new("Company").key(PropertyKey::string("name")))
            .build()
            .unwrap();
        Graph::new(MemoryBackend::new(), Arc::new(schema))
    }

    fn key(graph: &Graph<MemoryBackend>, name: &str) -> Arc<PropertyKey> {
        graph.schema().key("Person", name).unwrap()
    }

    #[test]
    fn test_strings_are_fuzzy_unless_exact() {
        let graph = graph();
        let name = key(&graph, "name");
        assert_eq!(
            name.build_search_predicate(&graph, Occur::Must, Value::from("ad"), false).unwrap(),
            SearchPredicate::Fuzzy { owner: "Person".into(), field: "name".into(), text: "ad".into(), occur: Occur::Must }
        );
        assert!(matches!(
            name.build_search_predicate(&graph, Occur::Should, Value::from("Ada"), true).unwrap(),
            SearchPredicate::Exact { occur: Occur::Should, .. }
        ));
    }

    #[test]
    fn test_values_are_converted_to_stored_form() {
        let graph = graph();
        let age = key(&graph, "age");
        match age.build_search_predicate(&graph, Occur::Must, Value::from("42"), false).unwrap() {
            SearchPredicate::Exact { value, .. } => assert_eq!(value, Value::Int(42)),
            other => panic!("unexpected {other:?}"),
        }

        let status = key(&graph, "status");
        assert!(matches!(
            status.build_search_predicate(&graph, Occur::Must, Value::from("dead"), true),
            Err(Error::ValueNotAllowed { .. })
        ));
    }

    #[test]
    fn test_range_on_dates_uses_millis() {
        let graph = graph();
        let born = key(&graph, "born");
        match born
            .build_range_predicate(&graph, Occur::Must, Value::from("1970-01-02"), Value::Null)
            .unwrap()
        {
            SearchPredicate::Range { from, to, .. } => {
                assert_eq!(from, Value::Int(86_400_000));
                assert_eq!(to, Value::Null);
            }
            other => panic!("unexpected {other:?}"),
        }

        let employer = key(&graph, "employer");
        assert!(matches!(
            employer.build_range_predicate(&graph, Occur::Must, Value::Null, Value::Null),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_relation_and_group_predicates() {
        let graph = graph();
        let employer = key(&graph, "employer");
        assert_eq!(
            employer.build_search_predicate(&graph, Occur::Must, Value::from("Acme"), true).unwrap(),
            SearchPredicate::Related {
                owner: "Person".into(),
                label: "WORKS_AT".into(),
                direction: Direction::Outgoing,
                dest_type: "Company".into(),
                lookup: EntityLookup::Field { key: "name".into(), value: Value::from("Acme") },
                occur: Occur::Must,
            }
        );

        let address = key(&graph, "address");
        match address
            .build_search_predicate(&graph, Occur::MustNot, Value::map([("city", "Berlin")]), true)
            .unwrap()
        {
            SearchPredicate::Group { occur, children } => {
                assert_eq!(occur, Occur::MustNot);
                assert_eq!(children.len(), 1);
                assert!(matches!(&children[0], SearchPredicate::Exact { field, .. } if field == "address.city"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_searchable_keys_include_nested() {
        let graph = graph();
        let names: Vec<_> = searchable_keys(graph.schema(), "Person")
            .iter()
            .map(|k| format!("{}:{}", k.declaring_type(), k.db_name()))
            .collect();
        assert_eq!(
            names,
            vec![
                "Person:name",
                "Person:age",
                "Person:address.city",
                "Person:address.zip",
                "Person:address",
                "Company:name",
                "Person:employer",
            ]
        );
    }
}
