//! Conversation sessions and the self-expiring session store.
//!
//! Lock layering: the store mutex guards the map's shape
//! (insert/remove/iterate), each session's history mutex guards its
//! messages for the duration of one request (including the outbound
//! completion call, so requests on one session serialize), and
//! `last_seen` sits behind its own cheap lock so the sweeper can take a
//! point-in-time read without waiting on an in-flight request. Never
//! hold the store lock while awaiting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Label used when flattening history into prompt text.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// One turn of a conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered message history of one session.
///
/// The first entry is always the system message seeded at creation; it
/// survives truncation and is never reordered.
#[derive(Debug)]
pub struct History(Vec<Message>);

impl History {
    fn seeded(base_prompt: &str) -> Self {
        Self(vec![Message::system(base_prompt)])
    }

    /// Append a message to the end of the history.
    pub fn append(&mut self, message: Message) {
        self.0.push(message);
    }

    /// Bound the history to `max_len` messages.
    ///
    /// When over the cap, retains the system message plus the most
    /// recent `max_len - 1` entries, discarding the older middle.
    /// Returns whether anything was discarded.
    pub fn truncate_if_needed(&mut self, max_len: usize) -> bool {
        if max_len == 0 || self.0.len() <= max_len {
            return false;
        }
        let keep_from = self.0.len() - (max_len - 1);
        self.0.drain(1..keep_from);
        true
    }

    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A single conversation: its history plus a last-activity timestamp.
pub struct Session {
    id: String,
    history: Mutex<History>,
    last_seen: RwLock<Instant>,
}

impl Session {
    fn new(id: &str, base_prompt: &str) -> Self {
        Self {
            id: id.to_string(),
            history: Mutex::new(History::seeded(base_prompt)),
            last_seen: RwLock::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Take exclusive ownership of the history for one request.
    ///
    /// The guard is held across the outbound completion call, so
    /// concurrent requests on the same session serialize here.
    pub async fn history(&self) -> MutexGuard<'_, History> {
        self.history.lock().await
    }

    /// Refresh the last-activity timestamp.
    pub fn touch(&self) {
        let mut last_seen = self.last_seen.write().unwrap_or_else(PoisonError::into_inner);
        *last_seen = Instant::now();
    }

    /// Point-in-time read of the last-activity timestamp.
    pub fn last_seen(&self) -> Instant {
        *self.last_seen.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn set_last_seen(&self, instant: Instant) {
        let mut last_seen = self.last_seen.write().unwrap_or_else(PoisonError::into_inner);
        *last_seen = instant;
    }
}

/// Concurrent map of session id to session, with idle eviction.
///
/// Owned explicitly by the server (constructed at startup, swept by a
/// [`Sweeper`] until shutdown); not a process-wide singleton.
pub struct SessionStore {
    sessions: StdMutex<HashMap<String, Arc<Session>>>,
    base_prompt: String,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(base_prompt: impl Into<String>, idle_timeout: Duration) -> Self {
        Self {
            sessions: StdMutex::new(HashMap::new()),
            base_prompt: base_prompt.into(),
            idle_timeout,
        }
    }

    /// Return the session for `id`, creating it on first sight.
    ///
    /// Concurrent callers for the same id all observe one instance: the
    /// map is consulted and populated under the store lock.
    pub fn get_or_create(&self, id: &str) -> Arc<Session> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(session) = sessions.get(id) {
            session.touch();
            tracing::debug!(session_id = %id, "session accessed");
            return Arc::clone(session);
        }

        let session = Arc::new(Session::new(id, &self.base_prompt));
        sessions.insert(id.to_string(), Arc::clone(&session));
        tracing::info!(session_id = %id, "created new session");
        session
    }

    /// Look up a session without creating or touching it.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Remove every session idle longer than `timeout` as of `now`.
    ///
    /// Only reads each session's `last_seen`; never waits on a history
    /// lock, so sessions mid-request are judged by their timestamp and
    /// active conversations are not starved.
    pub fn sweep(&self, now: Instant, timeout: Duration) -> usize {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let before = sessions.len();
        sessions.retain(|_, session| now.saturating_duration_since(session.last_seen()) <= timeout);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

/// Handle to the background eviction loop.
///
/// Dropping the handle without calling [`Sweeper::shutdown`] aborts
/// nothing; the loop keeps the store's `Arc` alive until the runtime
/// stops. Shut down explicitly at process exit.
pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: StdMutex<Option<JoinHandle<()>>>,
}

impl Sweeper {
    /// Spawn the periodic sweep task for `store`.
    pub fn spawn(store: Arc<SessionStore>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let timeout = store.idle_timeout();
                        let removed = store.sweep(Instant::now(), timeout);
                        if removed > 0 {
                            tracing::info!(
                                removed,
                                timeout_secs = timeout.as_secs(),
                                "evicted idle sessions"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        Self {
            shutdown_tx,
            handle: StdMutex::new(Some(handle)),
        }
    }

    /// Signal the sweep loop and wait for it to exit.
    ///
    /// Idempotent: later calls find the task already joined and return
    /// immediately.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
