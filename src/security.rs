//! Identity context handed to converters.

use serde::{Deserialize, Serialize};

/// Who is performing the current operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    pub principal: Option<String>,
    pub superuser: bool,
}

impl SecurityContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn superuser() -> Self {
        Self { principal: None, superuser: true }
    }

    pub fn for_principal(name: impl Into<String>) -> Self {
        Self { principal: Some(name.into()), superuser: false }
    }
}
