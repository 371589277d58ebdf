//! # Converters
//!
//! A `Converter` is a stateless pair of functions between two representations
//! of a property value. Property keys own up to two of them:
//!
//! | Role | `convert` | `revert` |
//! |------|-----------|----------|
//! | database converter | canonical → stored | stored → canonical |
//! | input converter | external → canonical | canonical → external |
//!
//! `Value::Null` passes through every converter unchanged.

pub mod primitive;
pub mod enumeration;
pub mod date;
pub mod password;

use std::fmt;

use crate::config::LayerConfig;
use crate::model::Value;
use crate::security::SecurityContext;
use crate::Error;
use crate::Result;

pub use primitive::{ArrayConverter, BoolConverter, FloatConverter, IntConverter, StringConverter};
pub use enumeration::EnumConverter;
pub use date::{is_valid_pattern, truncate_millis, DateConverter, DateSide};
pub use password::{PasswordConverter, PasswordSide};

/// Everything a converter may consult besides the value itself.
#[derive(Debug, Clone, Copy)]
pub struct ConversionContext<'a> {
    /// External name of the key being converted.
    pub key: &'a str,
    /// Type that declares the key.
    pub owner: &'a str,
    pub config: &'a LayerConfig,
    pub security: &'a SecurityContext,
}

impl ConversionContext<'_> {
    pub fn type_mismatch(&self, expected: &str, got: &Value) -> Error {
        Error::TypeMismatch {
            key: self.key.to_string(),
            owner: self.owner.to_string(),
            expected: expected.to_string(),
            got: got.type_name().to_string(),
        }
    }
}

/// Two-directional value transformer.
pub trait Converter: Send + Sync + fmt::Debug {
    fn convert(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<Value>;

    fn revert(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<Value>;
}
