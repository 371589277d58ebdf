//! Date conversion.
//!
//! Canonical dates are `Value::DateTime` (UTC, millisecond precision), stored
//! dates are epoch milliseconds and external dates are strings rendered with
//! the key's pattern.
//!
//! Both sides accept the same lenient inputs on `convert`: epoch milliseconds
//! as a number or numeric string, RFC 3339, or a string in the key's pattern.
//! A `DateTime` passed in with finer precision is truncated to the
//! millisecond, so every value leaving `convert` survives storage unchanged.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, TimeZone, Utc};

use crate::model::Value;
use crate::{Error, Result};
use super::{ConversionContext, Converter};

/// Which boundary a `DateConverter` sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSide {
    Storage,
    Input,
}

#[derive(Debug, Clone)]
pub struct DateConverter {
    side: DateSide,
    /// Falls back to `LayerConfig::dates.default_pattern` when unset.
    pattern: Option<String>,
}

impl DateConverter {
    pub fn storage(pattern: Option<String>) -> Self {
        Self { side: DateSide::Storage, pattern }
    }

    pub fn input(pattern: Option<String>) -> Self {
        Self { side: DateSide::Input, pattern }
    }

    fn pattern<'a>(&'a self, ctx: &'a ConversionContext<'_>) -> &'a str {
        self.pattern.as_deref().unwrap_or(&ctx.config.dates.default_pattern)
    }

    fn parse(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        match value {
            Value::Null => Ok(value),
            Value::DateTime(dt) => Ok(Value::DateTime(truncate_millis(dt))),
            Value::Int(millis) => from_millis(ctx, millis, self.pattern(ctx)),
            Value::Float(f) if f.fract() == 0.0 => from_millis(ctx, f as i64, self.pattern(ctx)),
            Value::String(s) => {
                let pattern = self.pattern(ctx);
                parse_str(s.trim(), pattern)
                    .map(Value::DateTime)
                    .ok_or_else(|| format_invalid(ctx, &s, pattern))
            }
            other => Err(ctx.type_mismatch("DATETIME", &other)),
        }
    }
}

/// Drop everything below the millisecond.
pub fn truncate_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.trunc_subsecs(3)
}

/// True if `pattern` is a format string `chrono` can render.
pub fn is_valid_pattern(pattern: &str) -> bool {
    !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}

fn render(ctx: &ConversionContext<'_>, dt: &DateTime<Utc>, pattern: &str) -> Result<Value> {
    let mut out = String::new();
    write!(out, "{}", dt.format(pattern)).map_err(|_| format_invalid(ctx, &dt.to_rfc3339(), pattern))?;
    Ok(Value::String(out))
}

fn format_invalid(ctx: &ConversionContext<'_>, value: &str, pattern: &str) -> Error {
    Error::FormatInvalid {
        key: ctx.key.to_string(),
        owner: ctx.owner.to_string(),
        value: value.to_string(),
        pattern: pattern.to_string(),
    }
}

fn from_millis(ctx: &ConversionContext<'_>, millis: i64, pattern: &str) -> Result<Value> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(Value::DateTime)
        .ok_or_else(|| format_invalid(ctx, &millis.to_string(), pattern))
}

/// Numeric string, RFC 3339, then the pattern with and without an offset,
/// then a bare date.
fn parse_str(s: &str, pattern: &str) -> Option<DateTime<Utc>> {
    if let Ok(millis) = s.parse::<i64>() {
        return Utc.timestamp_millis_opt(millis).single();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, pattern) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, pattern) {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, pattern)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl Converter for DateConverter {
    fn convert(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        let parsed = self.parse(ctx, value)?;
        match (self.side, parsed) {
            (DateSide::Storage, Value::DateTime(dt)) => Ok(Value::Int(dt.timestamp_millis())),
            (_, other) => Ok(other),
        }
    }

    fn revert(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        match (self.side, value) {
            (_, Value::Null) => Ok(Value::Null),
            (DateSide::Storage, Value::Int(millis)) => from_millis(ctx, millis, self.pattern(ctx)),
            (DateSide::Storage, other) => self.parse(ctx, other),
            (DateSide::Input, Value::DateTime(dt)) => render(ctx, &dt, self.pattern(ctx)),
            (DateSide::Input, other) => Err(ctx.type_mismatch("DATETIME", &other)),
        }
    }
}
