//! One-way password hashing.

use sha2::{Digest, Sha256};

use crate::model::Value;
use crate::{Error, Result};
use super::{ConversionContext, Converter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordSide {
    Storage,
    Input,
}

/// Storage side: hashes on `convert` after enforcing the minimum length;
/// `revert` returns the stored hash as is.
///
/// Input side: passes clear text through on `convert` and masks the hash on
/// `revert` for everyone but superusers.
#[derive(Debug, Clone, Copy)]
pub struct PasswordConverter {
    side: PasswordSide,
}

impl PasswordConverter {
    pub fn storage() -> Self {
        Self { side: PasswordSide::Storage }
    }

    pub fn input() -> Self {
        Self { side: PasswordSide::Input }
    }
}

/// Hex-encoded SHA-256 of `salt || clear`.
pub fn hash_password(salt: &str, clear: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(clear.as_bytes());
    hex::encode(hasher.finalize())
}

impl Converter for PasswordConverter {
    fn convert(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        let clear = match value {
            Value::Null => return Ok(Value::Null),
            Value::String(s) => s,
            other => return Err(ctx.type_mismatch("STRING", &other)),
        };
        if self.side == PasswordSide::Input {
            return Ok(Value::String(clear));
        }
        let policy = &ctx.config.password;
        if clear.chars().count() < policy.min_length {
            return Err(Error::TooShort {
                key: ctx.key.to_string(),
                owner: ctx.owner.to_string(),
                min_length: policy.min_length,
            });
        }
        Ok(Value::String(hash_password(&policy.salt, &clear)))
    }

    fn revert(&self, ctx: &ConversionContext<'_>, value: Value) -> Result<Value> {
        match self.side {
            PasswordSide::Storage => Ok(value),
            PasswordSide::Input if ctx.security.superuser => Ok(value),
            PasswordSide::Input => Ok(Value::Null),
        }
    }
}
