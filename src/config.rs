//! Layer configuration.
//!
//! Everything here has a default, so an empty JSON object (or no file at all)
//! yields a working configuration.

use serde::{Deserialize, Serialize};

use crate::convert::is_valid_pattern;
use crate::{Error, Result};

/// Configuration for the property layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub password: PasswordPolicy,
    pub dates: DateSettings,
    pub timestamps: TimestampSettings,
}

/// Password hashing policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    /// Inputs shorter than this (in characters) are rejected before hashing.
    pub min_length: usize,
    /// Mixed into every hash. Changing it invalidates stored hashes.
    pub salt: String,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { min_length: 8, salt: String::new() }
    }
}

/// Date parsing and formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateSettings {
    /// `chrono` format string used by date keys that declare no pattern.
    pub default_pattern: String,
}

impl Default for DateSettings {
    fn default() -> Self {
        Self { default_pattern: "%Y-%m-%dT%H:%M:%S%z".into() }
    }
}

/// Automatic modification stamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimestampSettings {
    /// Stamp every successful primitive write with the current time.
    pub enabled: bool,
    /// Stored field holding the stamp (epoch milliseconds).
    pub last_modified_field: String,
}

impl Default for TimestampSettings {
    fn default() -> Self {
        Self { enabled: true, last_modified_field: "lastModifiedDate".into() }
    }
}

impl LayerConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would fail at conversion time.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_pattern(&self.dates.default_pattern) {
            return Err(Error::Config(format!(
                "invalid dates.default_pattern '{}'",
                self.dates.default_pattern
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(LayerConfig::from_json("{}").unwrap(), LayerConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let cfg = LayerConfig::from_json(r#"{"password": {"min_length": 12}}"#).unwrap();
        assert_eq!(cfg.password.min_length, 12);
        assert_eq!(cfg.password.salt, "");
        assert!(cfg.timestamps.enabled);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut cfg = LayerConfig::default();
        cfg.dates.default_pattern = "%d.%m.%Y".into();
        cfg.timestamps.enabled = false;
        let json = cfg.to_json().unwrap();
        assert_eq!(LayerConfig::from_json(&json).unwrap(), cfg);
    }

    #[test]
    fn test_rejects_invalid_default_pattern() {
        let err = LayerConfig::from_json(r#"{"dates": {"default_pattern": "%Y-%Q"}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("%Y-%Q")));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(LayerConfig::from_json("{"), Err(Error::Config(_))));
    }
}
