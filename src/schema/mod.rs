//! # Schema registry
//!
//! Entity types with single inheritance, their property keys and named views,
//! the relation registry and the variant table. A registry is built once by
//! [`SchemaBuilder`] and then shared read-only.
//!
//! Key lookup walks the type chain from the concrete type to the root, so a
//! subtype inherits every key of its ancestors and may redeclare one to
//! override it.

pub mod variant;

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use crate::model::{FromValue, Value};
use crate::property::{KeyBuilder, PropertyKey, RelationDescriptor, TypedKey};
use crate::{Error, Result};

pub use variant::{VariantDef, VariantTable};

/// View implicitly defined on every type: all keys, in declaration order.
pub const ALL_VIEW: &str = "all";

/// Declaration of one entity type.
#[derive(Debug, Clone)]
pub struct TypeDef {
    name: String,
    parent: Option<String>,
    keys: Vec<KeyBuilder>,
    views: Vec<(String, Vec<String>)>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), parent: None, keys: Vec::new(), views: Vec::new() }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn key(mut self, key: KeyBuilder) -> Self {
        self.keys.push(key);
        self
    }

    /// A named, ordered selection of keys by external name.
    pub fn view<I, S>(mut self, name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.views.push((name.into(), keys.into_iter().map(Into::into).collect()));
        self
    }
}

#[derive(Debug)]
struct TypeEntry {
    parent: Option<String>,
    keys: Vec<Arc<PropertyKey>>,
    views: HashMap<String, Vec<String>>,
}

/// Immutable registry of types, keys, relations and variants.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    types: HashMap<String, TypeEntry>,
    relations: HashMap<(String, String), Vec<Arc<RelationDescriptor>>>,
    variants: VariantTable,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn contains_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn parent(&self, type_name: &str) -> Option<&str> {
        self.types.get(type_name)?.parent.as_deref()
    }

    /// The type followed by its ancestors, nearest first. An unregistered
    /// type is its own single-element chain.
    pub fn ancestry(&self, type_name: &str) -> Vec<String> {
        let mut chain = vec![type_name.to_string()];
        let mut current = self.parent(type_name);
        while let Some(parent) = current {
            chain.push(parent.to_string());
            current = self.parent(parent);
        }
        chain
    }

    /// Whether an entity of type `actual` may stand where `declared` is expected.
    pub fn is_assignable(&self, declared: &str, actual: &str) -> bool {
        actual == declared || self.ancestry(actual).iter().any(|t| t == declared)
    }

    /// Resolve a key by external name on a type or any of its ancestors.
    /// The hidden flag keys of groups resolve as `<group>.null`.
    pub fn key(&self, type_name: &str, name: &str) -> Option<Arc<PropertyKey>> {
        for t in self.ancestry(type_name) {
            let Some(entry) = self.types.get(&t) else { continue };
            for key in &entry.keys {
                if key.json_name() == name {
                    return Some(key.clone());
                }
                if let Some(flag) = key.group_property().map(|g| g.null_flag()).filter(|f| f.json_name() == name) {
                    return Some(flag.clone());
                }
            }
        }
        None
    }

    /// Every key visible on a type: inherited keys first, overrides in place.
    pub fn keys(&self, type_name: &str) -> Vec<Arc<PropertyKey>> {
        let mut keys: Vec<Arc<PropertyKey>> = Vec::new();
        for t in self.ancestry(type_name).iter().rev() {
            let Some(entry) = self.types.get(t) else { continue };
            for key in &entry.keys {
                match keys.iter_mut().find(|k| k.json_name() == key.json_name()) {
                    Some(slot) => *slot = key.clone(),
                    None => keys.push(key.clone()),
                }
            }
        }
        keys
    }

    /// Keys of a named view from the nearest type that declares it. `"all"`
    /// is implicit unless redeclared.
    pub fn view(&self, type_name: &str, view: &str) -> Option<Vec<Arc<PropertyKey>>> {
        let names = self
            .ancestry(type_name)
            .iter()
            .filter_map(|t| self.types.get(t))
            .find_map(|entry| entry.views.get(view));
        match names {
            Some(names) => Some(names.iter().filter_map(|n| self.key(type_name, n)).collect()),
            None if view == ALL_VIEW && self.contains_type(type_name) => Some(self.keys(type_name)),
            None => None,
        }
    }

    /// Typed handle for a key.
    pub fn typed<T: FromValue + Into<Value>>(&self, type_name: &str, name: &str) -> Result<TypedKey<T>> {
        self.key(type_name, name).map(TypedKey::new).ok_or_else(|| Error::UnknownProperty {
            key: name.to_string(),
            owner: type_name.to_string(),
        })
    }

    // ========================================================================
    // Relations
    // ========================================================================

    /// Relations declared exactly between two types.
    pub fn relations_between(&self, source: &str, dest: &str) -> &[Arc<RelationDescriptor>] {
        self.relations
            .get(&(source.to_string(), dest.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Find a relation from `source` to `dest`, considering supertypes of
    /// both, optionally restricted to one label.
    pub fn find_relation(&self, source: &str, dest: &str, label: Option<&str>) -> Option<Arc<RelationDescriptor>> {
        let dests = self.ancestry(dest);
        for s in self.ancestry(source) {
            for d in &dests {
                let found = self
                    .relations_between(&s, d)
                    .iter()
                    .find(|r| label.is_none_or(|l| r.label == l));
                if let Some(found) = found {
                    return Some(found.clone());
                }
            }
        }
        None
    }

    // ========================================================================
    // Variants
    // ========================================================================

    pub fn variants(&self) -> &VariantTable {
        &self.variants
    }

    pub fn variant_flag(&self, variant: &str, flag: &str) -> bool {
        self.variants.flag(variant, flag)
    }
}

/// Collects declarations and validates them into a [`SchemaRegistry`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    types: Vec<TypeDef>,
    relations: Vec<RelationDescriptor>,
    variants: Vec<VariantDef>,
    flag_defaults: Vec<(String, bool)>,
}

impl SchemaBuilder {
    pub fn entity(mut self, def: TypeDef) -> Self {
        self.types.push(def);
        self
    }

    /// Register a relation not backed by any key.
    pub fn relation(mut self, desc: RelationDescriptor) -> Self {
        self.relations.push(desc);
        self
    }

    pub fn variant(mut self, def: VariantDef) -> Self {
        self.variants.push(def);
        self
    }

    /// Default of a variant flag for variants that do not override it.
    pub fn flag_default(mut self, name: impl Into<String>, value: bool) -> Self {
        self.flag_defaults.push((name.into(), value));
        self
    }

    pub fn build(self) -> Result<SchemaRegistry> {
        let mut registry = SchemaRegistry::default();
        let mut defs: Vec<(String, Vec<KeyBuilder>, Vec<(String, Vec<String>)>)> = Vec::new();

        for def in self.types {
            register_type(&mut registry, &def.name, def.parent)?;
            defs.push((def.name, def.keys, def.views));
        }
        for (flag, value) in self.flag_defaults {
            registry.variants.set_default(flag, value);
        }
        for def in self.variants {
            let base = def
                .base
                .ok_or_else(|| Error::Schema(format!("variant {} has no base type", def.name)))?;
            register_type(&mut registry, &def.name, Some(base.clone()))?;
            registry.variants.insert(def.name.clone(), base, def.flags);
            defs.push((def.name, def.keys, Vec::new()));
        }

        check_hierarchy(&registry)?;

        let mut relations: Vec<Arc<RelationDescriptor>> =
            self.relations.into_iter().map(Arc::new).collect();

        for (name, keys, views) in defs {
            let mut built = Vec::with_capacity(keys.len());
            let mut seen = HashSet::new();
            for key in keys {
                let key = key.build(&name)?;
                if !seen.insert(key.json_name().to_string()) {
                    return Err(Error::Schema(format!("duplicate key '{}' on {name}", key.json_name())));
                }
                if let Some(rel) = key.relation() {
                    let desc = rel.descriptor();
                    if !registry.is_assignable(&desc.source_type, &name) {
                        return Err(Error::Schema(format!(
                            "key '{}' on {name} uses relation '{}' declared from {}",
                            key.json_name(),
                            desc.label,
                            desc.source_type
                        )));
                    }
                    relations.push(desc.clone());
                }
                built.push(key);
            }
            let entry = registry
                .types
                .get_mut(&name)
                .ok_or_else(|| Error::UnknownType(name.clone()))?;
            entry.keys = built;
            entry.views = views.into_iter().collect();
        }

        for (type_name, entry) in &registry.types {
            for names in entry.views.values() {
                if let Some(missing) = names.iter().find(|n| registry.key(type_name, n).is_none()) {
                    return Err(Error::UnknownProperty { key: missing.clone(), owner: type_name.clone() });
                }
            }
        }

        for desc in relations {
            for t in [&desc.source_type, &desc.dest_type] {
                if !registry.contains_type(t) {
                    return Err(Error::UnknownType(t.clone()));
                }
            }
            let slot = registry
                .relations
                .entry((desc.source_type.clone(), desc.dest_type.clone()))
                .or_default();
            if !slot.iter().any(|d| **d == *desc) {
                slot.push(desc);
            }
        }

        debug!(types = registry.types.len(), relations = registry.relations.len(), "schema built");
        Ok(registry)
    }
}

fn register_type(registry: &mut SchemaRegistry, name: &str, parent: Option<String>) -> Result<()> {
    if registry.types.contains_key(name) {
        return Err(Error::Schema(format!("type {name} declared twice")));
    }
    registry.types.insert(
        name.to_string(),
        TypeEntry { parent, keys: Vec::new(), views: HashMap::new() },
    );
    Ok(())
}

fn check_hierarchy(registry: &SchemaRegistry) -> Result<()> {
    for (name, entry) in &registry.types {
        if let Some(parent) = &entry.parent
            && !registry.types.contains_key(parent)
        {
            return Err(Error::UnknownType(parent.clone()));
        }
        let mut seen = HashSet::new();
        let mut current = Some(name.as_str());
        while let Some(t) = current {
            if !seen.insert(t) {
                return Err(Error::Schema(format!("inheritance cycle through {name}")));
            }
            current = registry.parent(t);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Cardinality;
    use pretty_assertions::assert_eq;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .entity(
                TypeDef::new("Principal")
                    .key(PropertyKey::string("name"))
                    .key(PropertyKey::password("password"))
                    .view("public", ["name"]),
            )
            .entity(
                TypeDef::new("User")
                    .extends("Principal")
                    .key(PropertyKey::string("email"))
                    .key(PropertyKey::group("address", [PropertyKey::string("city")])),
            )
            .entity(TypeDef::new("Group").extends("Principal").key(PropertyKey::collection(
                "members",
                RelationDescriptor::new("Group", "CONTAINS", "Principal", Cardinality::ManyToMany),
            )))
            .build()
            .unwrap()
    }

    #[test]
    fn test_inherited_keys_and_ancestry() {
        let schema = registry();
        assert_eq!(schema.ancestry("User"), vec!["User".to_string(), "Principal".to_string()]);
        assert!(schema.is_assignable("Principal", "User"));
        assert!(!schema.is_assignable("User", "Principal"));
        assert!(!schema.is_assignable("User", "Unknown"));

        let name = schema.key("User", "name").unwrap();
        assert_eq!(name.declaring_type(), "Principal");
        let names: Vec<_> = schema.keys("User").iter().map(|k| k.json_name().to_string()).collect();
        assert_eq!(names, vec!["name", "password", "email", "address"]);
    }

    #[test]
    fn test_group_flag_resolves_by_name() {
        let schema = registry();
        let flag = schema.key("User", "address.null").unwrap();
        assert_eq!(flag.db_name(), "address.null");
        assert!(flag.is_read_only());
    }

    #[test]
    fn test_views_inherit_and_all_is_implicit() {
        let schema = registry();
        let public: Vec<_> = schema.view("User", "public").unwrap().iter().map(|k| k.json_name().to_string()).collect();
        assert_eq!(public, vec!["name"]);
        assert_eq!(schema.view("User", "all").unwrap().len(), 4);
        assert!(schema.view("User", "missing").is_none());
    }

    #[test]
    fn test_relation_registry_resolves_supertypes() {
        let schema = registry();
        assert_eq!(schema.relations_between("Group", "Principal").len(), 1);
        let found = schema.find_relation("Group", "User", None).unwrap();
        assert_eq!(found.label, "CONTAINS");
        assert!(schema.find_relation("Group", "User", Some("OWNS")).is_none());
        assert!(schema.find_relation("User", "Group", None).is_none());
    }

    #[test]
    fn test_build_rejects_bad_declarations() {
        let unknown_parent = SchemaRegistry::builder().entity(TypeDef::new("A").extends("B")).build();
        assert!(matches!(unknown_parent, Err(Error::UnknownType(t)) if t == "B"));

        let cycle = SchemaRegistry::builder()
            .entity(TypeDef::new("A").extends("B"))
            .entity(TypeDef::new("B").extends("A"))
            .build();
        assert!(matches!(cycle, Err(Error::Schema(_))));

        let bad_view = SchemaRegistry::builder()
            .entity(TypeDef::new("A").key(PropertyKey::string("x")).view("public", ["y"]))
            .build();
        assert!(matches!(bad_view, Err(Error::UnknownProperty { .. })));

        let bad_relation = SchemaRegistry::builder()
            .entity(TypeDef::new("A").key(PropertyKey::entity(
                "b",
                RelationDescriptor::new("A", "TO", "Missing", Cardinality::ManyToOne),
            )))
            .build();
        assert!(matches!(bad_relation, Err(Error::UnknownType(t)) if t == "Missing"));
    }

    #[test]
    fn test_variants_share_base_keys() {
        let schema = SchemaRegistry::builder()
            .entity(TypeDef::new("Element").key(PropertyKey::string("id")))
            .flag_default("void", false)
            .variant(VariantDef::new("Img").base("Element").key(PropertyKey::string("src")).flag("void", true))
            .variant(VariantDef::new("Div").base("Element"))
            .build()
            .unwrap();

        assert!(schema.contains_type("Img"));
        assert!(schema.key("Img", "id").is_some());
        assert!(schema.key("Img", "src").is_some());
        assert!(schema.key("Div", "src").is_none());
        assert!(schema.variant_flag("Img", "void"));
        assert!(!schema.variant_flag("Div", "void"));
    }
}
