//! Periodic refresh of the thread list, the active thread and the unread
//! counter.

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use shared::{
    config::client::Config,
    models::{Message, PageQuery, ThreadQuery},
};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    gateway::GatewayError,
    normalize::{normalize_messages, normalize_threads, normalize_unread},
    store::{ConversationStore, PollReport, PollTarget, PollUpdate},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(4000);
pub const DEFAULT_POLL_MESSAGE_LIMIT: u32 = 50;
const EVENT_CAPACITY: usize = 64;

/// Foreground/background flag shared with the front end. Polling pauses in
/// the background and runs a tick right away on return to the foreground.
#[derive(Debug, Clone)]
pub struct Visibility {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for Visibility {
    fn default() -> Self {
        Self::new()
    }
}

impl Visibility {
    /// Starts in the foreground.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(true);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn set_foreground(&self, foreground: bool) {
        self.sender.send_if_modified(|current| {
            let changed = *current != foreground;
            *current = foreground;
            changed
        });
    }

    #[must_use]
    pub fn is_foreground(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Threads fetched per tick.
    pub thread_limit: u32,
    /// Messages of the active thread fetched per tick.
    pub message_limit: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            thread_limit: crate::store::DEFAULT_PAGE_SIZE,
            message_limit: DEFAULT_POLL_MESSAGE_LIMIT,
        }
    }
}

impl PollConfig {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            thread_limit: config.page_size,
            message_limit: config.poll_page_size,
        }
    }
}

/// Broadcast after a committed tick so a front end can re-render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    ThreadsUpdated,
    MessagesUpdated {
        thread_id: String,
        new_messages: Vec<Message>,
    },
    UnreadUpdated(u32),
    /// The backend rejected the session token; polling has stopped.
    SessionExpired,
}

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No active thread, or the view is in the background.
    Idle,
    Applied(PollReport),
    /// The selection changed or the loop was cancelled while fetching.
    Discarded,
}

#[derive(Debug, Clone)]
pub struct PollingLoop {
    store: ConversationStore,
    visibility: Visibility,
    config: PollConfig,
    events: broadcast::Sender<PollEvent>,
}

impl PollingLoop {
    pub fn new(store: ConversationStore, visibility: Visibility, config: PollConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            visibility,
            config,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    /// Start the timer task. The first tick fires one interval from now.
    #[must_use]
    pub fn spawn(&self) -> PollHandle {
        let token = CancellationToken::new();
        let visibility = self.visibility.subscribe();
        let task = tokio::spawn(self.clone().run(token.clone(), visibility));
        PollHandle {
            token,
            task: Some(task),
        }
    }

    /// Run one tick immediately.
    pub async fn tick_once(&self) -> TickOutcome {
        self.tick(&CancellationToken::new()).await
    }

    async fn run(self, token: CancellationToken, mut visibility: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        debug!(interval = ?self.config.interval, "polling started");

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick(&token).await;
                }
                changed = visibility.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *visibility.borrow_and_update() {
                        ticker.reset();
                        self.tick(&token).await;
                    }
                }
            }
        }
        debug!("polling stopped");
    }

    async fn tick(&self, token: &CancellationToken) -> TickOutcome {
        if !self.visibility.is_foreground() {
            trace!("skipping poll tick in background");
            return TickOutcome::Idle;
        }
        let Some(target) = self.store.poll_target().await else {
            return TickOutcome::Idle;
        };

        let update = tokio::select! {
            () = token.cancelled() => return TickOutcome::Discarded,
            update = self.fetch(&target) => update,
        };
        if token.is_cancelled() {
            return TickOutcome::Discarded;
        }
        let unread = update.unread;

        let Some(report) = self
            .store
            .apply_poll(target.generation, &target.thread_id, update)
            .await
        else {
            debug!(thread_id = %target.thread_id, "discarding stale poll result");
            return TickOutcome::Discarded;
        };

        if report.threads_updated {
            let _ = self.events.send(PollEvent::ThreadsUpdated);
        }
        if !report.new_messages.is_empty() {
            let _ = self.events.send(PollEvent::MessagesUpdated {
                thread_id: target.thread_id.clone(),
                new_messages: report.new_messages.clone(),
            });
        }
        if report.unread_updated
            && let Some(unread) = unread
        {
            let _ = self.events.send(PollEvent::UnreadUpdated(unread));
        }
        if report.session_expired {
            warn!(thread_id = %target.thread_id, "session expired during poll");
            let _ = self.events.send(PollEvent::SessionExpired);
        }
        TickOutcome::Applied(report)
    }

    async fn fetch(&self, target: &PollTarget) -> PollUpdate {
        let gateway = self.store.gateway();
        let threads_query = ThreadQuery {
            cursor: None,
            limit: Some(self.config.thread_limit),
            q: target.search.clone(),
        };
        let page = PageQuery::latest(self.config.message_limit);

        let (threads, messages, unread) = tokio::join!(
            gateway.list_threads(&threads_query),
            gateway.list_messages(&target.thread_id, &page),
            gateway.unread_count(),
        );

        let session_expired = [&threads, &messages, &unread]
            .into_iter()
            .any(|result| matches!(result, Err(err) if err.is_session_expired()));

        PollUpdate {
            session_expired,
            threads: swallow("threads", threads).map(|raw| normalize_threads(&raw)),
            messages: swallow("messages", messages)
                .map(|raw| normalize_messages(&raw, self.store.session())),
            unread: swallow("unread", unread).map(|raw| normalize_unread(&raw)),
        }
    }
}

fn swallow(piece: &'static str, result: Result<Value, GatewayError>) -> Option<Value> {
    result
        .map_err(|err| debug!(piece, error = %err, "poll fetch failed"))
        .ok()
}

/// Owner of a running poll task. Dropping the handle stops polling.
#[derive(Debug)]
pub struct PollHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            debug!(error = %err, "poll task ended abnormally");
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
