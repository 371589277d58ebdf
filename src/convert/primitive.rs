//! Scalar input converters.
//!
//! External data often arrives as strings (query parameters, form fields).
//! These converters parse such input into the canonical scalar and render the
//! canonical scalar back unchanged.

use std::sync::Arc;

use crate::model::Value;
use crate::Result;
use super::{ConversionContext, Converter};

/// `"42"`, `42` and `42.0` all become `Int(42)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntConverter;

impl Converter for IntConverter {
    fn convert(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        match value {
            Value::Null | Value::Int(_) => Ok(value),
            Value::Float(f) if f.fract() == 0.0 => Ok(Value::Int(f as i64)),
            Value::String(ref s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| ctx.type_mismatch("INTEGER", &value)),
            other => Err(ctx.type_mismatch("INTEGER", &other)),
        }
    }

    fn revert(&self, _ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FloatConverter;

impl Converter for FloatConverter {
    fn convert(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        match value {
            Value::Null | Value::Float(_) => Ok(value),
            Value::Int(i) => Ok(Value::Float(i as f64)),
            Value::String(ref s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| ctx.type_mismatch("FLOAT", &value)),
            other => Err(ctx.type_mismatch("FLOAT", &other)),
        }
    }

    fn revert(&self, _ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        Ok(value)
    }
}

/// Accepts booleans and the strings `true`/`false`/`1`/`0` (any case).
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolConverter;

impl Converter for BoolConverter {
    fn convert(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        match value {
            Value::Null | Value::Bool(_) => Ok(value),
            Value::String(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(ctx.type_mismatch("BOOLEAN", &value)),
            },
            other => Err(ctx.type_mismatch("BOOLEAN", &other)),
        }
    }

    fn revert(&self, _ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        Ok(value)
    }
}

/// Renders scalars as strings; rejects containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringConverter;

impl Converter for StringConverter {
    fn convert(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        match value {
            Value::Null | Value::String(_) => Ok(value),
            Value::Int(i) => Ok(Value::String(i.to_string())),
            Value::Float(f) => Ok(Value::String(f.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(ctx.type_mismatch("STRING", &other)),
        }
    }

    fn revert(&self, _ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        Ok(value)
    }
}

/// Applies an element converter to every entry of a list.
/// A scalar input is treated as a one-element list.
#[derive(Debug, Clone)]
pub struct ArrayConverter {
    element: Arc<dyn Converter>,
}

impl ArrayConverter {
    pub fn new(element: Arc<dyn Converter>) -> Self {
        Self { element }
    }
}

impl Converter for ArrayConverter {
    fn convert(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::List(items) => items
                .into_iter()
                .map(|v| self.element.convert(ctx, v))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            scalar => Ok(Value::List(vec![self.element.convert(ctx, scalar)?])),
        }
    }

    fn revert(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        match value {
            Value::List(items) => items
                .into_iter()
                .map(|v| self.element.revert(ctx, v))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::testing::with_ctx;
    use crate::Error;

    #[test]
    fn test_int_parses_strings() {
        with_ctx(|ctx| {
            assert_eq!(IntConverter.convert(ctx, Value::from(" 42 ")).unwrap(), Value::Int(42));
            assert_eq!(IntConverter.convert(ctx, Value::Float(3.0)).unwrap(), Value::Int(3));
            assert!(matches!(
                IntConverter.convert(ctx, Value::from("forty")),
                Err(Error::TypeMismatch { ref expected, .. }) if expected == "INTEGER"
            ));
        });
    }

    #[test]
    fn test_bool_accepts_common_spellings() {
        with_ctx(|ctx| {
            assert_eq!(BoolConverter.convert(ctx, Value::from("TRUE")).unwrap(), Value::Bool(true));
            assert_eq!(BoolConverter.convert(ctx, Value::from("0")).unwrap(), Value::Bool(false));
            assert!(BoolConverter.convert(ctx, Value::from("maybe")).is_err());
        });
    }

    #[test]
    fn test_array_wraps_scalar() {
        with_ctx(|ctx| {
            let conv = ArrayConverter::new(Arc::new(IntConverter));
            assert_eq!(
                conv.convert(ctx, Value::from("7")).unwrap(),
                Value::List(vec![Value::Int(7)])
            );
            assert_eq!(
                conv.convert(ctx, Value::List(vec![Value::from("1"), Value::Int(2)])).unwrap(),
                Value::List(vec![Value::Int(1), Value::Int(2)])
            );
        });
    }

    #[test]
    fn test_null_passes_through() {
        with_ctx(|ctx| {
            assert_eq!(FloatConverter.convert(ctx, Value::Null).unwrap(), Value::Null);
            assert_eq!(StringConverter.convert(ctx, Value::Null).unwrap(), Value::Null);
        });
    }
}
