//! Variant table.
//!
//! Some types come in many small flavours that differ only by a few extra
//! keys and a handful of boolean traits. Rather than one subtype per flavour
//! with overridden methods, a variant is a row in this table: a base type,
//! extra keys, and flag overrides on top of registry-wide flag defaults.

use hashbrown::HashMap;

use crate::property::KeyBuilder;

/// Declaration of one variant.
#[derive(Debug, Clone)]
pub struct VariantDef {
    pub(crate) name: String,
    pub(crate) base: Option<String>,
    pub(crate) keys: Vec<KeyBuilder>,
    pub(crate) flags: Vec<(String, bool)>,
}

impl VariantDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), base: None, keys: Vec::new(), flags: Vec::new() }
    }

    /// Type whose keys the variant shares. Required.
    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn key(mut self, key: KeyBuilder) -> Self {
        self.keys.push(key);
        self
    }

    /// Override a flag for this variant.
    pub fn flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.flags.push((name.into(), value));
        self
    }
}

#[derive(Debug, Clone, Default)]
struct VariantEntry {
    base: String,
    flags: HashMap<String, bool>,
}

/// Resolved variants with their flag overrides.
#[derive(Debug, Clone, Default)]
pub struct VariantTable {
    defaults: HashMap<String, bool>,
    variants: HashMap<String, VariantEntry>,
}

impl VariantTable {
    pub(crate) fn set_default(&mut self, flag: String, value: bool) {
        self.defaults.insert(flag, value);
    }

    pub(crate) fn insert(&mut self, name: String, base: String, flags: Vec<(String, bool)>) {
        let flags = flags.into_iter().collect();
        self.variants.insert(name, VariantEntry { base, flags });
    }

    pub fn contains(&self, variant: &str) -> bool {
        self.variants.contains_key(variant)
    }

    pub fn base(&self, variant: &str) -> Option<&str> {
        self.variants.get(variant).map(|v| v.base.as_str())
    }

    /// Variant override, then the registry default, then false.
    pub fn flag(&self, variant: &str, flag: &str) -> bool {
        self.variants
            .get(variant)
            .and_then(|v| v.flags.get(flag))
            .or_else(|| self.defaults.get(flag))
            .copied()
            .unwrap_or(false)
    }

    /// Names of the variants built on `base`, sorted.
    pub fn variants_of(&self, base: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .variants
            .iter()
            .filter(|(_, v)| v.base == base)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}
