//! Records of the platform identity store, which is an external service.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub id: Uuid,
    pub login: String,
    pub email: Option<String>,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Idempotency key for users provisioned from a partner directory.
    pub external_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIdentityUser {
    pub login: String,
    pub email: Option<String>,
    pub display_name: String,
    pub external_ref: Option<String>,
}

/// `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityUserPatch {
    pub login: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl IdentityUserPatch {
    pub fn is_empty(&self) -> bool {
        self.login.is_none() && self.email.is_none() && self.display_name.is_none()
    }
}
