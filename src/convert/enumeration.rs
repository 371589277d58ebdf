//! Enumerated string domains.

use std::sync::Arc;

use crate::model::Value;
use crate::{Error, Result};
use super::{ConversionContext, Converter};

/// Restricts a string property to a fixed set of constants.
///
/// Used as both the input and the database converter of enum keys, so the
/// domain is enforced no matter which representation a caller starts from.
#[derive(Debug, Clone)]
pub struct EnumConverter {
    constants: Arc<[String]>,
}

impl EnumConverter {
    pub fn new<I, S>(constants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { constants: constants.into_iter().map(Into::into).collect() }
    }

    pub fn constants(&self) -> &[String] {
        &self.constants
    }

    fn check(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(ref s) if self.constants.iter().any(|c| c == s) => Ok(value),
            Value::String(s) => Err(Error::ValueNotAllowed {
                key: ctx.key.to_string(),
                owner: ctx.owner.to_string(),
                value: s,
                allowed: self.constants.join(", "),
            }),
            other => Err(ctx.type_mismatch("STRING", &other)),
        }
    }
}

impl Converter for EnumConverter {
    fn convert(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        self.check(ctx, value)
    }

    fn revert(&self, _ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        Ok(value)
    }
}
