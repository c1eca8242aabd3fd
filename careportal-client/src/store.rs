//! Conversation state: the thread list, the active thread, and its message
//! buffer.
//!
//! All mutation happens in short write sections that never span an `.await`.
//! Races between navigation, polling and sending are settled by the
//! selection generation: every change of the active thread bumps it, and any
//! fetch that started under an older generation is dropped on commit.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures_util::future::join_all;
use serde_json::Value;
use shared::models::{
    CreateThreadRequest, Delivery, Doctor, Message, PageQuery, Thread, ThreadQuery, Timestamp,
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    composer::SendRejection,
    error::ClientError,
    gateway::{GatewayError, MessagingGateway},
    normalize::{
        Counterpart, created_thread_id, next_cursor, normalize_doctors, normalize_message,
        normalize_messages, normalize_thread_detail, normalize_threads, normalize_unread,
        sort_chronologically, unwrap_data,
    },
    session::SessionIdentity,
};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
const DOCTOR_PICKER_LIMIT: u32 = 100;
const COUNTERPART_LOOKUP_LIMIT: usize = 12;

/// Dismissible banner over the thread list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBanner {
    pub message: String,
    pub retryable: bool,
}

/// Error scoped to the message pane of the active thread.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaneError {
    #[error("could not load messages: {0}")]
    LoadFailed(String),
    #[error("message not sent: {0}")]
    SendFailed(String),
}

/// Everything a front end needs to render the inbox and the open thread.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub threads: Vec<Thread>,
    pub active_thread_id: Option<String>,
    /// Messages of the active thread, oldest first.
    pub messages: Vec<Message>,
    pub unread_total: u32,
    pub threads_cursor: Option<String>,
    pub messages_cursor: Option<String>,
    pub search: Option<String>,
    pub list_error: Option<ErrorBanner>,
    pub pane_error: Option<PaneError>,
    pub session_expired: bool,
    counterparts: HashMap<String, Counterpart>,
}

/// What a poll commit changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub threads_updated: bool,
    /// Messages that were not in the buffer before this poll.
    pub new_messages: Vec<Message>,
    pub unread_updated: bool,
    /// A piece of the tick was rejected with 401.
    pub session_expired: bool,
}

/// Selection captured at the start of a poll tick.
#[derive(Debug, Clone)]
pub(crate) struct PollTarget {
    pub generation: u64,
    pub thread_id: String,
    pub search: Option<String>,
}

/// Pieces fetched by one poll tick; `None` keeps the previous state.
#[derive(Debug, Default)]
pub(crate) struct PollUpdate {
    pub threads: Option<Vec<Thread>>,
    pub messages: Option<Vec<Message>>,
    pub unread: Option<u32>,
    pub session_expired: bool,
}

impl ConversationState {
    #[must_use]
    pub fn active_thread(&self) -> Option<&Thread> {
        let active = self.active_thread_id.as_deref()?;
        self.threads.iter().find(|thread| thread.id == active)
    }

    #[must_use]
    pub fn counterpart(&self, thread_id: &str) -> Option<&Counterpart> {
        self.counterparts.get(thread_id)
    }

    /// Case-insensitive match on subject, snippet and counterpart name.
    #[must_use]
    pub fn filtered_threads(&self, query: &str) -> Vec<Thread> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.threads.clone();
        }
        self.threads
            .iter()
            .filter(|thread| {
                let counterpart = self
                    .counterparts
                    .get(&thread.id)
                    .map_or(thread.counterpart_name.as_str(), |c| c.name.as_str());
                [
                    thread.title.as_str(),
                    thread.last_message_snippet.as_str(),
                    counterpart,
                ]
                .iter()
                .any(|field| field.to_lowercase().contains(&query))
            })
            .cloned()
            .collect()
    }

    /// Remember a counterpart unless one is already cached for the thread.
    pub(crate) fn cache_counterpart(&mut self, thread_id: &str, counterpart: Counterpart) {
        if counterpart.name.is_empty() || self.counterparts.contains_key(thread_id) {
            return;
        }
        if let Some(thread) = self.threads.iter_mut().find(|t| t.id == thread_id) {
            apply_counterpart(thread, &counterpart);
        }
        self.counterparts.insert(thread_id.to_string(), counterpart);
    }

    fn attach_counterparts(&mut self) {
        for thread in &mut self.threads {
            if let Some(cached) = self.counterparts.get(&thread.id) {
                apply_counterpart(thread, cached);
            } else if !thread.counterpart_name.is_empty() {
                self.counterparts.insert(
                    thread.id.clone(),
                    Counterpart {
                        name: thread.counterpart_name.clone(),
                        role: thread.counterpart_role.clone(),
                        initials: thread.counterpart_initials.clone(),
                    },
                );
            }
        }
    }

    fn keep_active_read(&mut self) {
        if let Some(active) = self.active_thread_id.as_deref()
            && let Some(thread) = self.threads.iter_mut().find(|t| t.id == active)
        {
            thread.unread_count = 0;
        }
    }

    /// Replace the list with a fresh first page.
    pub(crate) fn replace_threads(&mut self, threads: Vec<Thread>) {
        self.threads = threads;
        self.attach_counterparts();
        self.keep_active_read();
    }

    /// Merge a polled first page: server order first, then threads known
    /// from older pages that the poll did not return.
    pub(crate) fn merge_polled_threads(&mut self, polled: Vec<Thread>) {
        let polled_ids: HashSet<String> = polled.iter().map(|t| t.id.clone()).collect();
        let retained = std::mem::take(&mut self.threads)
            .into_iter()
            .filter(|thread| !polled_ids.contains(&thread.id));
        self.threads = polled.into_iter().chain(retained).collect();
        self.attach_counterparts();
        self.keep_active_read();
    }

    /// Append the next page of threads, skipping ids already listed.
    pub(crate) fn append_threads(&mut self, page: Vec<Thread>) -> usize {
        let known: HashSet<String> = self.threads.iter().map(|t| t.id.clone()).collect();
        let before = self.threads.len();
        self.threads
            .extend(page.into_iter().filter(|thread| !known.contains(&thread.id)));
        self.attach_counterparts();
        self.threads.len() - before
    }

    /// The thread to show after a list reload: the current one if it is
    /// still listed, otherwise the first thread, otherwise none.
    #[must_use]
    pub(crate) fn selection_fallback(&self) -> Option<String> {
        match self.active_thread_id.as_deref() {
            Some(active) if self.threads.iter().any(|t| t.id == active) => {
                Some(active.to_string())
            }
            _ => self.threads.first().map(|thread| thread.id.clone()),
        }
    }

    /// Zero the thread's unread counter and take it off the global total.
    pub(crate) fn mark_read_locally(&mut self, thread_id: &str) {
        if let Some(thread) = self.threads.iter_mut().find(|t| t.id == thread_id) {
            let cleared = std::mem::take(&mut thread.unread_count);
            self.unread_total = self.unread_total.saturating_sub(cleared);
        }
    }

    /// Replace the buffer with a polled page while keeping older history
    /// and messages still awaiting confirmation. Returns the messages that
    /// were not in the buffer before.
    pub(crate) fn merge_polled_messages(&mut self, polled: Vec<Message>) -> Vec<Message> {
        let known: HashSet<&str> = self.messages.iter().map(|m| m.id.as_str()).collect();
        let new_messages: Vec<Message> = polled
            .iter()
            .filter(|message| !known.contains(message.id.as_str()))
            .cloned()
            .collect();

        let polled_ids: HashSet<&str> = polled.iter().map(|m| m.id.as_str()).collect();
        let oldest_polled = polled.iter().filter_map(|m| m.sent_at.as_ref()).min();
        let older = self.messages.iter().filter(|message| {
            !message.is_pending()
                && !polled_ids.contains(message.id.as_str())
                && matches!((&message.sent_at, oldest_polled), (Some(at), Some(oldest)) if at < oldest)
        });
        let pending = self.messages.iter().filter(|message| message.is_pending());

        let mut merged: Vec<Message> = older
            .cloned()
            .chain(polled.iter().cloned())
            .chain(pending.cloned())
            .collect();
        sort_chronologically(&mut merged);
        self.messages = merged;
        new_messages
    }

    /// Prepend an older page, dropping ids already in the buffer.
    pub(crate) fn prepend_older(&mut self, older: Vec<Message>) -> usize {
        let known: HashSet<&str> = self.messages.iter().map(|m| m.id.as_str()).collect();
        let fresh: Vec<Message> = older
            .into_iter()
            .filter(|message| !known.contains(message.id.as_str()))
            .collect();
        let added = fresh.len();
        self.messages.splice(0..0, fresh);
        sort_chronologically(&mut self.messages);
        added
    }

    pub(crate) fn insert_pending(&mut self, message: Message) {
        self.messages.push(message);
        sort_chronologically(&mut self.messages);
    }

    /// Resolve an optimistic message. The pending entry is replaced in place
    /// by `confirmed`, dropped when `confirmed` is already in the buffer, or
    /// simply marked confirmed when the server returned no record.
    pub(crate) fn confirm_pending(&mut self, client_id: Uuid, confirmed: Option<Message>) {
        let pending = self
            .messages
            .iter()
            .position(|m| m.client_id == Some(client_id));
        match (pending, confirmed) {
            (Some(index), Some(confirmed)) => {
                if self.messages.iter().any(|m| m.id == confirmed.id) {
                    self.messages.remove(index);
                } else {
                    self.messages[index] = confirmed;
                }
            }
            (Some(index), None) => self.messages[index].delivery = Delivery::Confirmed,
            (None, Some(confirmed)) => self.append_confirmed(confirmed),
            (None, None) => {}
        }
        sort_chronologically(&mut self.messages);
    }

    /// Add a confirmed message unless it is already present.
    pub(crate) fn append_confirmed(&mut self, message: Message) {
        if self.messages.iter().any(|m| m.id == message.id) {
            return;
        }
        self.messages.push(message);
        sort_chronologically(&mut self.messages);
    }

    pub(crate) fn discard_pending(&mut self, client_id: Uuid) {
        self.messages.retain(|m| m.client_id != Some(client_id));
    }

    /// Update a thread's summary after a send and move it up the list.
    pub(crate) fn touch_thread_summary(
        &mut self,
        thread_id: &str,
        snippet: &str,
        at: Option<Timestamp>,
    ) {
        let Some(thread) = self.threads.iter_mut().find(|t| t.id == thread_id) else {
            return;
        };
        thread.last_message_snippet = snippet.to_string();
        if at.is_some() {
            thread.last_message_at = at;
        }
        // Most recent activity first; undated threads keep their order at the end.
        self.threads
            .sort_by(|a, b| match (&a.last_message_at, &b.last_message_at) {
                (Some(a), Some(b)) => b.cmp(a),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
    }

    fn note_session(&mut self, err: &ClientError) {
        if matches!(err, ClientError::SessionExpired) {
            self.session_expired = true;
        }
    }
}

fn apply_counterpart(thread: &mut Thread, counterpart: &Counterpart) {
    thread.counterpart_name.clone_from(&counterpart.name);
    thread.counterpart_role.clone_from(&counterpart.role);
    thread.counterpart_initials.clone_from(&counterpart.initials);
}

struct Inner {
    gateway: Arc<dyn MessagingGateway>,
    session: Arc<dyn SessionIdentity>,
    state: RwLock<ConversationState>,
    generation: AtomicU64,
    page_size: u32,
}

/// Shared handle to the conversation state. Cloning is cheap; all clones see
/// the same state.
#[derive(Clone)]
pub struct ConversationStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore")
            .field("generation", &self.generation())
            .field("page_size", &self.inner.page_size)
            .finish_non_exhaustive()
    }
}

impl ConversationStore {
    pub fn new(gateway: Arc<dyn MessagingGateway>, session: Arc<dyn SessionIdentity>) -> Self {
        Self::with_page_size(gateway, session, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(
        gateway: Arc<dyn MessagingGateway>,
        session: Arc<dyn SessionIdentity>,
        page_size: u32,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                session,
                state: RwLock::new(ConversationState::default()),
                generation: AtomicU64::new(0),
                page_size: page_size.max(1),
            }),
        }
    }

    /// Current selection generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub(crate) fn gateway(&self) -> &Arc<dyn MessagingGateway> {
        &self.inner.gateway
    }

    pub(crate) fn session(&self) -> &dyn SessionIdentity {
        self.inner.session.as_ref()
    }

    /// Must be called with the state write lock held.
    fn bump_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// A cloned copy of the state for rendering.
    pub async fn snapshot(&self) -> ConversationState {
        self.inner.state.read().await.clone()
    }

    pub async fn active_thread_id(&self) -> Option<String> {
        self.inner.state.read().await.active_thread_id.clone()
    }

    /// Load the first page of threads, optionally filtered server-side.
    ///
    /// On failure the previous list and message buffer stay in place and a
    /// retryable banner is raised.
    ///
    /// # Errors
    /// Returns the gateway failure, or [`ClientError::SessionExpired`] on 401.
    pub async fn load_threads(&self, search: Option<&str>) -> Result<Vec<Thread>, ClientError> {
        self.reload_threads(search, true).await
    }

    /// Load the first page of threads without touching the selection.
    ///
    /// # Errors
    /// Same as [`ConversationStore::load_threads`].
    pub async fn browse_threads(&self, search: Option<&str>) -> Result<Vec<Thread>, ClientError> {
        self.reload_threads(search, false).await
    }

    async fn reload_threads(
        &self,
        search: Option<&str>,
        follow_selection: bool,
    ) -> Result<Vec<Thread>, ClientError> {
        let search = search
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);
        let query = ThreadQuery {
            cursor: None,
            limit: Some(self.inner.page_size),
            q: search.clone(),
        };
        let result = self.inner.gateway.list_threads(&query).await;

        let (threads, reselect) = {
            let mut state = self.inner.state.write().await;
            let raw = match result {
                Ok(raw) => raw,
                Err(err) => {
                    let err = ClientError::from(err);
                    warn!(error = %err, "failed to load threads");
                    state.note_session(&err);
                    state.list_error = Some(ErrorBanner {
                        message: err.to_string(),
                        retryable: err.is_retryable(),
                    });
                    return Err(err);
                }
            };

            state.replace_threads(normalize_threads(&raw));
            state.threads_cursor = next_cursor(&raw);
            state.search = search;
            state.list_error = None;

            let fallback = state.selection_fallback();
            let reselect = if follow_selection && fallback != state.active_thread_id {
                if fallback.is_none() {
                    state.active_thread_id = None;
                    state.messages.clear();
                    state.messages_cursor = None;
                    self.bump_generation();
                }
                fallback
            } else {
                None
            };
            (state.threads.clone(), reselect)
        };
        debug!(count = threads.len(), "threads loaded");

        if let Some(thread_id) = reselect
            && let Err(err) = self.select_thread(&thread_id).await
        {
            debug!(%thread_id, error = %err, "fallback selection failed to load messages");
        }
        Ok(threads)
    }

    /// Fetch the next page of threads using the stored cursor. Returns how
    /// many threads were added.
    ///
    /// # Errors
    /// Returns the gateway failure.
    pub async fn load_more_threads(&self) -> Result<usize, ClientError> {
        let (cursor, search) = {
            let state = self.inner.state.read().await;
            (state.threads_cursor.clone(), state.search.clone())
        };
        let Some(cursor) = cursor else {
            return Ok(0);
        };
        let query = ThreadQuery {
            cursor: Some(cursor),
            limit: Some(self.inner.page_size),
            q: search,
        };
        let result = self.inner.gateway.list_threads(&query).await;

        let mut state = self.inner.state.write().await;
        match result {
            Ok(raw) => {
                let added = state.append_threads(normalize_threads(&raw));
                state.threads_cursor = next_cursor(&raw);
                Ok(added)
            }
            Err(err) => {
                let err = ClientError::from(err);
                state.note_session(&err);
                Err(err)
            }
        }
    }

    /// Resolve display names for listed threads that arrived without
    /// participants, fetching up to twelve thread details concurrently.
    /// Lookup failures are ignored. Returns how many names were cached.
    pub async fn resolve_counterparts(&self) -> usize {
        let missing: Vec<String> = {
            let state = self.inner.state.read().await;
            state
                .threads
                .iter()
                .filter(|t| t.counterpart_name.is_empty() && !state.counterparts.contains_key(&t.id))
                .take(COUNTERPART_LOOKUP_LIMIT)
                .map(|t| t.id.clone())
                .collect()
        };
        if missing.is_empty() {
            return 0;
        }

        let page = PageQuery::default();
        let lookups = missing.iter().map(|id| self.inner.gateway.get_thread(id, &page));
        let results = join_all(lookups).await;

        let mut state = self.inner.state.write().await;
        let mut resolved = 0;
        for (thread_id, result) in missing.iter().zip(results) {
            match result {
                Ok(raw) => {
                    let detail = normalize_thread_detail(&raw, self.session());
                    if let Some(counterpart) = detail.counterpart {
                        state.cache_counterpart(thread_id, counterpart);
                        resolved += 1;
                    }
                }
                Err(err) => debug!(%thread_id, error = %err, "counterpart lookup failed"),
            }
        }
        resolved
    }

    /// Make `thread_id` the active thread and load its latest messages.
    ///
    /// The thread's unread counter drops to zero immediately, and a
    /// mark-read request runs in the background; its outcome never affects
    /// the local counter.
    ///
    /// # Errors
    /// Returns the gateway failure when the message page cannot be loaded;
    /// the pane error is set in that case.
    pub async fn select_thread(&self, thread_id: &str) -> Result<(), ClientError> {
        let generation = {
            let mut state = self.inner.state.write().await;
            state.active_thread_id = Some(thread_id.to_string());
            state.messages.clear();
            state.messages_cursor = None;
            state.pane_error = None;
            state.mark_read_locally(thread_id);
            self.bump_generation()
        };
        info!(%thread_id, generation, "thread selected");

        self.spawn_mark_read(thread_id);

        let page = PageQuery::latest(self.inner.page_size);
        let result = self.fetch_latest(thread_id, &page).await;

        let mut state = self.inner.state.write().await;
        if !self.is_current(generation) {
            debug!(%thread_id, "discarding messages for a superseded selection");
            return Ok(());
        }
        match result {
            Ok((messages, cursor, counterpart)) => {
                state.messages = messages;
                state.messages_cursor = cursor;
                if let Some(counterpart) = counterpart {
                    state.cache_counterpart(thread_id, counterpart);
                }
                Ok(())
            }
            Err(err) => {
                let err = ClientError::from(err);
                state.note_session(&err);
                state.pane_error = Some(PaneError::LoadFailed(err.to_string()));
                Err(err)
            }
        }
    }

    fn spawn_mark_read(&self, thread_id: &str) {
        let store = self.clone();
        let thread_id = thread_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = store.inner.gateway.mark_read(&thread_id).await {
                debug!(%thread_id, error = %err, "mark-read failed");
            }
            if let Err(err) = store.refresh_unread_count().await {
                debug!(error = %err, "unread refresh after mark-read failed");
            }
        });
    }

    async fn fetch_latest(
        &self,
        thread_id: &str,
        page: &PageQuery,
    ) -> Result<(Vec<Message>, Option<String>, Option<Counterpart>), GatewayError> {
        let raw = self.inner.gateway.get_thread(thread_id, page).await?;
        let detail = normalize_thread_detail(&raw, self.session());
        if let Some(messages) = detail.messages {
            return Ok((messages, detail.next_cursor, detail.counterpart));
        }

        let raw = self.inner.gateway.list_messages(thread_id, page).await?;
        Ok((
            normalize_messages(&raw, self.session()),
            next_cursor(&raw),
            detail.counterpart,
        ))
    }

    /// Load the page before `cursor` (or the stored cursor) and prepend it.
    /// Returns how many messages were added.
    ///
    /// # Errors
    /// Returns the gateway failure; the pane error is set in that case.
    pub async fn load_older_messages(&self, cursor: Option<&str>) -> Result<usize, ClientError> {
        let (generation, thread_id, stored_cursor) = {
            let state = self.inner.state.read().await;
            let Some(thread_id) = state.active_thread_id.clone() else {
                return Ok(0);
            };
            (self.generation(), thread_id, state.messages_cursor.clone())
        };
        let Some(cursor) = cursor.map(str::to_string).or(stored_cursor) else {
            return Ok(0);
        };
        let page = PageQuery::before(Some(cursor), self.inner.page_size);
        let result = self.inner.gateway.list_messages(&thread_id, &page).await;

        let mut state = self.inner.state.write().await;
        if !self.is_current(generation) {
            return Ok(0);
        }
        match result {
            Ok(raw) => {
                let added = state.prepend_older(normalize_messages(&raw, self.session()));
                state.messages_cursor = next_cursor(&raw);
                Ok(added)
            }
            Err(err) => {
                let err = ClientError::from(err);
                state.note_session(&err);
                state.pane_error = Some(PaneError::LoadFailed(err.to_string()));
                Err(err)
            }
        }
    }

    /// # Errors
    /// Returns the gateway failure; the stored total is left unchanged.
    pub async fn refresh_unread_count(&self) -> Result<u32, ClientError> {
        let result = self.inner.gateway.unread_count().await;
        let mut state = self.inner.state.write().await;
        match result {
            Ok(raw) => {
                state.unread_total = normalize_unread(&raw);
                Ok(state.unread_total)
            }
            Err(err) => {
                let err = ClientError::from(err);
                state.note_session(&err);
                Err(err)
            }
        }
    }

    /// Start a new thread with a doctor, reload the list and open the new
    /// thread. Returns its id when the backend reports one.
    ///
    /// # Errors
    /// Returns [`ClientError::Validation`] for blank fields before any
    /// request, or the gateway failure.
    pub async fn create_thread(
        &self,
        doctor_user_id: &str,
        subject: &str,
        body: &str,
    ) -> Result<Option<String>, ClientError> {
        let request = CreateThreadRequest {
            doctor_user_id: doctor_user_id.trim().to_string(),
            subject: subject.trim().to_string(),
            body: body.trim().to_string(),
        };
        if request.doctor_user_id.is_empty() {
            return Err(ClientError::validation("choose a doctor"));
        }
        if request.subject.is_empty() {
            return Err(ClientError::validation("subject must not be empty"));
        }
        if request.body.is_empty() {
            return Err(ClientError::validation("message must not be empty"));
        }

        let raw = match self.inner.gateway.create_thread(&request).await {
            Ok(raw) => raw,
            Err(err) => {
                let err = ClientError::from(err);
                self.inner.state.write().await.note_session(&err);
                return Err(err);
            }
        };
        let thread_id = created_thread_id(&raw);
        info!(thread_id = thread_id.as_deref().unwrap_or("?"), "thread created");

        if let Err(err) = self.reload_threads(None, thread_id.is_none()).await {
            warn!(error = %err, "thread list reload after create failed");
        }
        if let Some(thread_id) = &thread_id {
            self.select_thread(thread_id).await?;
        }
        Ok(thread_id)
    }

    /// Doctors for the compose-recipient picker.
    ///
    /// # Errors
    /// Returns the gateway failure.
    pub async fn list_doctors(&self) -> Result<Vec<Doctor>, ClientError> {
        let raw = self.inner.gateway.list_doctors(DOCTOR_PICKER_LIMIT).await?;
        Ok(normalize_doctors(&raw))
    }

    pub async fn filtered_threads(&self, query: &str) -> Vec<Thread> {
        self.inner.state.read().await.filtered_threads(query)
    }

    /// Clear the thread-list banner.
    pub async fn dismiss_error(&self) {
        self.inner.state.write().await.list_error = None;
    }

    pub async fn dismiss_pane_error(&self) {
        self.inner.state.write().await.pane_error = None;
    }

    /// What a poll tick should refresh, if a thread is active.
    pub(crate) async fn poll_target(&self) -> Option<PollTarget> {
        let state = self.inner.state.read().await;
        if state.session_expired {
            return None;
        }
        let thread_id = state.active_thread_id.clone()?;
        Some(PollTarget {
            generation: self.generation(),
            thread_id,
            search: state.search.clone(),
        })
    }

    /// Commit a poll tick. Returns `None` without touching anything when the
    /// selection moved on since the tick started.
    pub(crate) async fn apply_poll(
        &self,
        generation: u64,
        thread_id: &str,
        update: PollUpdate,
    ) -> Option<PollReport> {
        let mut state = self.inner.state.write().await;
        if !self.is_current(generation) || state.active_thread_id.as_deref() != Some(thread_id) {
            return None;
        }

        let mut report = PollReport::default();
        if let Some(threads) = update.threads {
            state.merge_polled_threads(threads);
            report.threads_updated = true;
        }
        if let Some(messages) = update.messages {
            report.new_messages = state.merge_polled_messages(messages);
        }
        if let Some(unread) = update.unread {
            report.unread_updated = state.unread_total != unread;
            state.unread_total = unread;
        }
        if update.session_expired {
            state.session_expired = true;
            report.session_expired = true;
        }
        Some(report)
    }

    /// Append an optimistic message to the active thread.
    pub(crate) async fn begin_send(
        &self,
        thread_id: &str,
        body: &str,
    ) -> Result<Uuid, SendRejection> {
        let mut state = self.inner.state.write().await;
        match state.active_thread_id.as_deref() {
            None => return Err(SendRejection::NoActiveThread),
            Some(active) if active != thread_id => return Err(SendRejection::NotActiveThread),
            Some(_) => {}
        }

        let client_id = Uuid::new_v4();
        let session = self.session();
        state.insert_pending(Message {
            id: format!("pending-{client_id}"),
            body: body.to_string(),
            sent_at: Some(Timestamp::now()),
            sender_name: session.username().unwrap_or_else(|| "You".to_string()),
            sender_id: session.user_id(),
            sender_role: session.role(),
            is_mine: true,
            client_id: Some(client_id),
            delivery: Delivery::Pending,
        });
        state.pane_error = None;
        Ok(client_id)
    }

    /// Reconcile a successful send with the server's record.
    pub(crate) async fn finish_send(
        &self,
        thread_id: &str,
        client_id: Uuid,
        body: &str,
        raw: &Value,
    ) -> Option<Message> {
        let confirmed = normalize_message(unwrap_data(raw), self.session()).map(|mut message| {
            message.is_mine = true;
            message
        });
        let at = confirmed
            .as_ref()
            .and_then(|message| message.sent_at.clone())
            .or_else(|| Some(Timestamp::now()));

        let mut state = self.inner.state.write().await;
        if state.active_thread_id.as_deref() == Some(thread_id) {
            state.confirm_pending(client_id, confirmed.clone());
        }
        state.touch_thread_summary(thread_id, body, at);
        confirmed
    }

    /// Roll back a failed send and surface the error on the pane.
    pub(crate) async fn fail_send(&self, thread_id: &str, client_id: Uuid, err: &ClientError) {
        let mut state = self.inner.state.write().await;
        state.discard_pending(client_id);
        state.note_session(err);
        if state.active_thread_id.as_deref() == Some(thread_id) {
            state.pane_error = Some(PaneError::SendFailed(err.to_string()));
        }
    }
}
