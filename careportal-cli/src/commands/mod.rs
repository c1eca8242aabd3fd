pub mod completion;
pub mod config;
pub mod messages;
pub mod render;
pub mod session;
pub mod watch;

use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use client::{
    ClientError, ConversationStore, PortalClient, SessionError, SessionIdentity, StoredSession,
    session_path,
};
use shared::config::client::Config;

/// Load the stored session and build a store on top of the HTTP gateway.
pub fn connect(config: &Config) -> Result<ConversationStore> {
    let path = session_path();
    let session = match StoredSession::load(&path) {
        Ok(session) => session,
        Err(SessionError::NotFound(_)) => {
            bail!("no active session found; run `careportal session login` first")
        }
        Err(err) => return Err(err.into()),
    };
    let session: Arc<dyn SessionIdentity> = Arc::new(session);
    let gateway = PortalClient::from_config(config, session.clone())?;
    tracing::debug!(base_url = %gateway.base_url(), "connecting to portal");
    Ok(ConversationStore::with_page_size(
        Arc::new(gateway),
        session,
        config.page_size,
    ))
}

/// Attach the re-login hint to a session expiry; pass anything else through.
pub fn explain(err: ClientError) -> anyhow::Error {
    match err {
        ClientError::SessionExpired => {
            anyhow!("session expired. run `careportal session login` to sign in again")
        }
        other => other.into(),
    }
}
