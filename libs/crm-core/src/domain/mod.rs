//! Domain model shared by every backend.
//!
//! Identifiers arrive as strings at the edges. Read paths treat a malformed
//! identifier exactly like a missing record; create/update paths report the
//! offending field instead.

use uuid::Uuid;

use crate::CoreError;

pub mod catalog;
pub mod client;
pub mod identity;
pub mod settings;
pub mod sync;
pub mod tenant;
pub mod ticket;

/// Parses an identifier on a read path. Malformed ids are reported as `NotFound`.
pub(crate) fn parse_id(kind: &str, raw: &str) -> Result<Uuid, CoreError> {
    Uuid::parse_str(raw.trim()).map_err(|_| CoreError::NotFound(format!("{kind} {raw}")))
}

/// Parses a cross-reference supplied at creation/update time.
pub fn parse_ref(field: &str, raw: &str) -> Result<Uuid, CoreError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| CoreError::invalid_input(field, format!("'{raw}' is not a valid identifier")))
}

/// Same as [`parse_ref`] for optional references; blank strings count as unset.
pub fn parse_optional_ref(field: &str, raw: Option<&str>) -> Result<Option<Uuid>, CoreError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_ref(field, value).map(Some),
    }
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::invalid_input(field, "must not be empty"));
    }
    Ok(())
}
