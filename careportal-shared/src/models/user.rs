use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a portal participant as reported by the backend (`"DOCTOR"`, `"PATIENT"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParticipantRole {
    Doctor,
    Patient,
    Other(String),
}

impl ParticipantRole {
    /// Return the wire representation used by the backend.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Doctor => "DOCTOR",
            Self::Patient => "PATIENT",
            Self::Other(value) => value.as_str(),
        }
    }

    /// Generic display label used when a sender has no resolvable name.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Doctor => "Doctor",
            Self::Patient => "Patient",
            Self::Other(value) => value.as_str(),
        }
    }
}

impl From<&str> for ParticipantRole {
    fn from(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("doctor") {
            Self::Doctor
        } else if trimmed.eq_ignore_ascii_case("patient") {
            Self::Patient
        } else {
            Self::Other(trimmed.to_string())
        }
    }
}

impl From<String> for ParticipantRole {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<ParticipantRole> for String {
    fn from(role: ParticipantRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials posted to `/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// The signed-in user as persisted between CLI invocations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    /// Bearer token attached to every API request.
    pub token: String,
    /// Portal user id; used to decide which messages are ours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ParticipantRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_is_case_insensitive() {
        assert_eq!(ParticipantRole::from("DOCTOR"), ParticipantRole::Doctor);
        assert_eq!(ParticipantRole::from("patient"), ParticipantRole::Patient);
        assert_eq!(
            ParticipantRole::from("NURSE"),
            ParticipantRole::Other("NURSE".to_string())
        );
    }

    #[test]
    fn test_role_labels() {
        assert_eq!(ParticipantRole::Doctor.label(), "Doctor");
        assert_eq!(ParticipantRole::Patient.label(), "Patient");
        assert_eq!(ParticipantRole::Doctor.to_string(), "DOCTOR");
    }

    #[test]
    fn test_role_serde_round_trips_wire_names() {
        let json = serde_json::to_string(&ParticipantRole::Patient).unwrap();
        assert_eq!(json, "\"PATIENT\"");
        let parsed: ParticipantRole = serde_json::from_str("\"Doctor\"").unwrap();
        assert_eq!(parsed, ParticipantRole::Doctor);
    }

    #[test]
    fn test_session_user_skips_missing_fields() {
        let user = SessionUser {
            token: "abc".to_string(),
            user_id: None,
            role: None,
            username: None,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert_eq!(json, r#"{"token":"abc"}"#);

        let parsed: SessionUser =
            serde_json::from_str(r#"{"token":"t","userId":"u1","role":"DOCTOR"}"#).unwrap();
        assert_eq!(parsed.user_id.as_deref(), Some("u1"));
        assert_eq!(parsed.role, Some(ParticipantRole::Doctor));
    }
}
