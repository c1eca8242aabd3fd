//! Session identity: who is signed in and which bearer token to send.
//!
//! The rest of the crate never reads ambient state; it receives an
//! `Arc<dyn SessionIdentity>` so tests can pin a fixed identity.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use directories::BaseDirs;
use serde_json::Value;
use shared::models::{ParticipantRole, SessionUser};
use thiserror::Error;

use crate::normalize::{NULL, id_field, str_field, unwrap_data};

const SESSION_PATH_ENV: &str = "CAREPORTAL_SESSION_PATH";

pub trait SessionIdentity: Send + Sync {
    /// Portal user id of the signed-in user, if known.
    fn user_id(&self) -> Option<String>;

    /// Token for the `Authorization: Bearer` header.
    fn bearer_token(&self) -> Option<String>;

    fn role(&self) -> Option<ParticipantRole> {
        None
    }

    fn username(&self) -> Option<String> {
        None
    }
}

/// Fixed identity, for tests and scripted use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticSession {
    user_id: Option<String>,
    token: Option<String>,
    role: Option<ParticipantRole>,
}

impl StaticSession {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            token: Some(token.into()),
            role: None,
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_role(mut self, role: ParticipantRole) -> Self {
        self.role = Some(role);
        self
    }
}

impl SessionIdentity for StaticSession {
    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }

    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn role(&self) -> Option<ParticipantRole> {
        self.role.clone()
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no active session found at {0}")]
    NotFound(PathBuf),
    #[error("failed to access session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("login response did not contain a token")]
    MissingToken,
}

/// A session persisted on disk by `careportal session login`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    user: SessionUser,
}

impl StoredSession {
    #[must_use]
    pub fn new(user: SessionUser) -> Self {
        Self { user }
    }

    #[must_use]
    pub fn user(&self) -> &SessionUser {
        &self.user
    }

    /// Build a session from the `/auth/login` response.
    ///
    /// The backend answers `{ success, data: { token, id | userId | user.id, role, username } }`;
    /// the bare `data` object is accepted too.
    ///
    /// # Errors
    /// Returns [`SessionError::MissingToken`] when no token can be found.
    pub fn from_login_payload(raw: &Value) -> Result<Self, SessionError> {
        let data = unwrap_data(raw);
        let token = str_field(data, &["token", "accessToken"]).ok_or(SessionError::MissingToken)?;
        let nested_user = data.get("user").unwrap_or(&NULL);
        let user_id =
            id_field(data, &["id", "userId"]).or_else(|| id_field(nested_user, &["id", "userId"]));
        let role = str_field(data, &["role"])
            .or_else(|| str_field(nested_user, &["role"]))
            .map(ParticipantRole::from);
        let username = str_field(data, &["username"])
            .or_else(|| str_field(nested_user, &["username"]))
            .map(str::to_string);

        Ok(Self::new(SessionUser {
            token: token.to_string(),
            user_id,
            role,
            username,
        }))
    }

    /// Load the session stored at `path`.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if nothing is stored there, or an I/O
    /// or parse error for unreadable files.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        if !path.exists() {
            return Err(SessionError::NotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let user = serde_json::from_str(&contents).map_err(|source| SessionError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { user })
    }

    /// Persist the session to `path`, readable by the owner only.
    ///
    /// # Errors
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let io_err = |source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = serde_json::to_string_pretty(&self.user).map_err(|source| {
            SessionError::Corrupt {
                path: path.to_path_buf(),
                source,
            }
        })?;
        fs::write(path, contents).map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(io_err)?;
        }
        Ok(())
    }

    /// Remove the stored session. Returns whether a file was removed.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be deleted.
    pub fn clear(path: &Path) -> Result<bool, SessionError> {
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(true)
    }
}

impl SessionIdentity for StoredSession {
    fn user_id(&self) -> Option<String> {
        self.user.user_id.clone()
    }

    fn bearer_token(&self) -> Option<String> {
        Some(self.user.token.clone())
    }

    fn role(&self) -> Option<ParticipantRole> {
        self.user.role.clone()
    }

    fn username(&self) -> Option<String> {
        self.user.username.clone()
    }
}

/// Location of the stored session: `$CAREPORTAL_SESSION_PATH`, else the
/// platform config directory.
#[must_use]
pub fn session_path() -> PathBuf {
    if let Ok(path) = env::var(SESSION_PATH_ENV)
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }
    BaseDirs::new()
        .map(|dirs| dirs.config_dir().join("careportal").join("session.json"))
        .unwrap_or_else(|| PathBuf::from("./careportal-session.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_login_payload_with_envelope() {
        let raw = json!({
            "success": true,
            "data": { "token": "tok-1", "id": 42, "role": "PATIENT", "username": "ada" }
        });

        let session = StoredSession::from_login_payload(&raw).unwrap();
        assert_eq!(session.bearer_token().as_deref(), Some("tok-1"));
        assert_eq!(session.user_id().as_deref(), Some("42"));
        assert_eq!(session.role(), Some(ParticipantRole::Patient));
        assert_eq!(session.username().as_deref(), Some("ada"));
    }

    #[test]
    fn test_login_payload_with_nested_user() {
        let raw = json!({ "token": "tok-2", "user": { "id": "u9", "role": "DOCTOR" } });

        let session = StoredSession::from_login_payload(&raw).unwrap();
        assert_eq!(session.user_id().as_deref(), Some("u9"));
        assert_eq!(session.role(), Some(ParticipantRole::Doctor));
    }

    #[test]
    fn test_login_payload_without_token() {
        let raw = json!({ "success": false, "message": "bad credentials" });
        assert!(matches!(
            StoredSession::from_login_payload(&raw),
            Err(SessionError::MissingToken)
        ));
    }

    #[test]
    fn test_save_load_clear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let session = StoredSession::new(SessionUser {
            token: "tok".to_string(),
            user_id: Some("u1".to_string()),
            role: None,
            username: None,
        });

        session.save(&path).unwrap();
        assert_eq!(StoredSession::load(&path).unwrap(), session);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        assert!(StoredSession::clear(&path).unwrap());
        assert!(!StoredSession::clear(&path).unwrap());
        assert!(matches!(
            StoredSession::load(&path),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            StoredSession::load(&path),
            Err(SessionError::Corrupt { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_session_path_env_override() {
        unsafe {
            env::set_var(SESSION_PATH_ENV, "/tmp/careportal-test/session.json");
        }
        let path = session_path();
        unsafe {
            env::remove_var(SESSION_PATH_ENV);
        }
        assert_eq!(path, PathBuf::from("/tmp/careportal-test/session.json"));
    }

    #[test]
    fn test_static_session() {
        let session = StaticSession::new("u9", "tok").with_role(ParticipantRole::Doctor);
        assert_eq!(session.user_id().as_deref(), Some("u9"));
        assert_eq!(session.bearer_token().as_deref(), Some("tok"));
        assert_eq!(session.role(), Some(ParticipantRole::Doctor));
        assert!(StaticSession::anonymous().bearer_token().is_none());
    }
}
