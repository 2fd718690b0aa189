use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CoreError;

const MAX_TENANT_LEN: usize = 63;

/// Tenant namespace. Part of every storage key and cache key.
///
/// Restricted to `[a-z0-9_-]` so that `:`-separated keys built from it stay
/// unambiguous across tenants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(CoreError::invalid_input("tenant", "Tenant ID cannot be empty"));
        }
        if raw.len() > MAX_TENANT_LEN {
            return Err(CoreError::invalid_input(
                "tenant",
                format!("Tenant ID longer than {MAX_TENANT_LEN} characters"),
            ));
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
        {
            return Err(CoreError::invalid_input(
                "tenant",
                format!("Tenant ID '{raw}' may only contain [a-z0-9_-]"),
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}
