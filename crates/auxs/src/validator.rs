use aux_common::types::{valid_room_id, Role};
use thiserror::Error;

/// Shape violations in an otherwise well-formed message. The text of each
/// variant is sent verbatim to the offending client in an `error` frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was absent or empty.
    #[error("Missing required field: {0}")]
    Missing(&'static str),
    /// The room id does not match the canonical form.
    #[error("Invalid room ID format")]
    RoomId,
    /// The requested role is not one a client may ask for.
    #[error("Invalid role: {0}")]
    Role(String),
}

/// Require a non-empty string field.
pub fn require<'a>(
    field: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, ValidationError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::Missing(field)),
    }
}

/// Require a present boolean field.
pub fn require_bool(field: &'static str, value: Option<bool>) -> Result<bool, ValidationError> {
    value.ok_or(ValidationError::Missing(field))
}

/// Require a canonical room id.
pub fn room_id(value: Option<&str>) -> Result<&str, ValidationError> {
    let id = require("roomId", value)?;
    if valid_room_id(id) {
        Ok(id)
    } else {
        Err(ValidationError::RoomId)
    }
}

/// Parse the role requested at registration. Only `idle` and `host` may be
/// asked for; `speaker` is reachable exclusively through an accepted invite.
pub fn requested_role(value: Option<&str>) -> Result<Role, ValidationError> {
    match value {
        None | Some("") | Some("idle") => Ok(Role::Idle),
        Some("host") => Ok(Role::Host),
        Some(other) => Err(ValidationError::Role(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_rejects_missing_and_empty() {
        assert_eq!(require("from", Some("c1")), Ok("c1"));
        assert_eq!(require("from", None), Err(ValidationError::Missing("from")));
        assert_eq!(
            require("from", Some("")),
            Err(ValidationError::Missing("from"))
        );
        assert_eq!(
            ValidationError::Missing("from").to_string(),
            "Missing required field: from"
        );
    }

    #[test]
    fn room_id_enforces_canonical_form() {
        assert_eq!(room_id(Some("ROOM1")), Ok("ROOM1"));
        assert_eq!(room_id(Some("AB")), Err(ValidationError::RoomId));
        assert_eq!(room_id(Some("room1")), Err(ValidationError::RoomId));
        assert_eq!(room_id(None), Err(ValidationError::Missing("roomId")));
    }

    #[test]
    fn requested_role_defaults_to_idle() {
        assert_eq!(requested_role(None), Ok(Role::Idle));
        assert_eq!(requested_role(Some("")), Ok(Role::Idle));
        assert_eq!(requested_role(Some("idle")), Ok(Role::Idle));
        assert_eq!(requested_role(Some("host")), Ok(Role::Host));
    }

    #[test]
    fn speaker_cannot_be_requested() {
        assert_eq!(
            requested_role(Some("speaker")),
            Err(ValidationError::Role("speaker".to_string()))
        );
        assert_eq!(
            requested_role(Some("admin")),
            Err(ValidationError::Role("admin".to_string()))
        );
    }

    #[test]
    fn require_bool_needs_presence() {
        assert_eq!(require_bool("accepted", Some(false)), Ok(false));
        assert_eq!(
            require_bool("accepted", None),
            Err(ValidationError::Missing("accepted"))
        );
    }
}
