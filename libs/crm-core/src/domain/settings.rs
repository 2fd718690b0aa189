use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CoreError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    #[default]
    Native,
    #[serde(rename = "ExternalERP")]
    ExternalErp,
}

/// Partner endpoint and credentials. The token is never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSettings {
    #[serde(rename = "remoteURL")]
    pub remote_url: String,
    pub access_token: String,
}

impl fmt::Debug for ExternalSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalSettings")
            .field("remote_url", &self.remote_url)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Per-tenant backend selection. Absent settings mean `Native`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSettings {
    pub backend_kind: BackendKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalSettings>,
}

impl TenantSettings {
    pub fn native() -> Self {
        Self::default()
    }

    pub fn external(remote_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            backend_kind: BackendKind::ExternalErp,
            external: Some(ExternalSettings {
                remote_url: remote_url.into(),
                access_token: access_token.into(),
            }),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.backend_kind != BackendKind::ExternalErp {
            return Ok(());
        }
        let Some(external) = &self.external else {
            return Err(CoreError::invalid_input(
                "external",
                "ExternalERP backend requires a remote URL and access token",
            ));
        };
        let url = external.remote_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CoreError::invalid_input(
                "external.remoteURL",
                "must be an http(s) URL",
            ));
        }
        if external.access_token.trim().is_empty() {
            return Err(CoreError::invalid_input(
                "external.accessToken",
                "must not be empty",
            ));
        }
        Ok(())
    }

    /// Partner settings when the tenant is configured for the external backend.
    pub fn external_settings(&self) -> Option<&ExternalSettings> {
        match self.backend_kind {
            BackendKind::ExternalErp => self.external.as_ref(),
            BackendKind::Native => None,
        }
    }
}
