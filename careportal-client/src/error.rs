use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors surfaced by user-initiated store and composer operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("session expired; sign in again")]
    SessionExpired,
    #[error(transparent)]
    Gateway(GatewayError),
    #[error("{0}")]
    Validation(String),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether retrying the same operation could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Gateway(err) => err.is_transient(),
            Self::SessionExpired | Self::Validation(_) => false,
        }
    }
}

impl From<GatewayError> for ClientError {
    fn from(err: GatewayError) -> Self {
        if err.is_session_expired() {
            Self::SessionExpired
        } else {
            Self::Gateway(err)
        }
    }
}
