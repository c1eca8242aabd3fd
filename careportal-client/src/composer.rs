//! Message composition with an optimistic local append.

use std::sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
};

use shared::models::{Message, SendMessageRequest};
use thiserror::Error;
use tracing::{info, warn};

use crate::{error::ClientError, store::ConversationStore};

/// Why a send was refused before any request went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendRejection {
    #[error("message is empty")]
    EmptyBody,
    #[error("no thread is open")]
    NoActiveThread,
    #[error("thread is not the one currently open")]
    NotActiveThread,
    #[error("a message is already being sent")]
    InFlight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Delivered; carries the server's record when it returned one.
    Sent(Option<Message>),
    Rejected(SendRejection),
}

impl SendOutcome {
    #[must_use]
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent(_))
    }
}

/// Clears the in-flight flag when the send finishes, however it finishes.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Draft text plus the send path for the active thread. At most one send
/// is in flight per composer.
#[derive(Debug)]
pub struct Composer {
    store: ConversationStore,
    draft: Mutex<String>,
    in_flight: AtomicBool,
}

impl Composer {
    #[must_use]
    pub fn new(store: ConversationStore) -> Self {
        Self {
            store,
            draft: Mutex::new(String::new()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        if let Ok(mut draft) = self.draft.lock() {
            *draft = text.into();
        }
    }

    #[must_use]
    pub fn draft(&self) -> String {
        self.draft
            .lock()
            .map(|draft| draft.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Send the current draft to `thread_id`.
    ///
    /// # Errors
    /// See [`Composer::send`].
    pub async fn send_draft(&self, thread_id: &str) -> Result<SendOutcome, ClientError> {
        let body = self.draft();
        self.send(thread_id, &body).await
    }

    /// Send `body` to the active thread.
    ///
    /// The message appears in the buffer as pending right away and is
    /// reconciled with the server's record before this returns. Empty
    /// bodies, a missing or different active thread, and a send already in
    /// flight are rejected without a request. On success the draft is
    /// cleared; on failure it is kept.
    ///
    /// # Errors
    /// Returns the gateway failure after rolling back the pending message.
    pub async fn send(&self, thread_id: &str, body: &str) -> Result<SendOutcome, ClientError> {
        let body = body.trim();
        if body.is_empty() {
            return Ok(SendOutcome::Rejected(SendRejection::EmptyBody));
        }
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            return Ok(SendOutcome::Rejected(SendRejection::InFlight));
        };

        let client_id = match self.store.begin_send(thread_id, body).await {
            Ok(client_id) => client_id,
            Err(rejection) => return Ok(SendOutcome::Rejected(rejection)),
        };
        info!(%thread_id, %client_id, "sending message");

        let request = SendMessageRequest {
            body: body.to_string(),
        };
        match self.store.gateway().post_message(thread_id, &request).await {
            Ok(raw) => {
                let confirmed = self
                    .store
                    .finish_send(thread_id, client_id, body, &raw)
                    .await;
                self.set_draft(String::new());
                Ok(SendOutcome::Sent(confirmed))
            }
            Err(err) => {
                let err = ClientError::from(err);
                warn!(%thread_id, error = %err, "message send failed");
                self.store.fail_send(thread_id, client_id, &err).await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard_is_exclusive_and_resets() {
        let flag = AtomicBool::new(false);
        {
            let guard = InFlightGuard::acquire(&flag);
            assert!(guard.is_some());
            assert!(InFlightGuard::acquire(&flag).is_none());
        }
        assert!(!flag.load(Ordering::SeqCst));
        assert!(InFlightGuard::acquire(&flag).is_some());
    }

    #[test]
    fn test_rejection_messages() {
        assert_eq!(SendRejection::EmptyBody.to_string(), "message is empty");
        assert_eq!(
            SendRejection::InFlight.to_string(),
            "a message is already being sent"
        );
    }
}
