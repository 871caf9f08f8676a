//! Server-side session storage.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

/// String values keyed by name, scoped to a session id.
pub trait SessionStore: Send + Sync {
    fn get(&self, session_id: &str, key: &str) -> Option<String>;
    fn set(&self, session_id: &str, key: &str, value: String);
    fn remove(&self, session_id: &str, key: &str);
    fn keys(&self, session_id: &str) -> Vec<String>;
    /// Drop every value but keep the session id known.
    fn clear(&self, session_id: &str);
    fn exists(&self, session_id: &str) -> bool;
    /// Forget the session id entirely.
    fn destroy(&self, session_id: &str);
}

/// Sessions idle longer than this are forgotten.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct SessionEntry {
    values: HashMap<String, String>,
    last_access: Instant,
}

/// Process-local session store with idle expiry.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: DashMap<String, SessionEntry>,
    idle_timeout: Duration,
    last_sweep: Mutex<Instant>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Register a new empty session and return its id.
    pub fn create(&self) -> String {
        self.create_at(Instant::now())
    }

    fn create_at(&self, now: Instant) -> String {
        self.sweep_expired_at(now);
        let id = Uuid::new_v4().to_string();
        self.sessions.insert(
            id.clone(),
            SessionEntry {
                values: HashMap::new(),
                last_access: now,
            },
        );
        id
    }

    #[cfg(test)]
    pub(crate) fn create_with_id(&self, id: &str) {
        self.sessions.insert(
            id.to_string(),
            SessionEntry {
                values: HashMap::new(),
                last_access: Instant::now(),
            },
        );
    }

    /// Whether `session_id` is live at `now`. A live session is touched,
    /// an idle one is removed.
    fn exists_at(&self, session_id: &str, now: Instant) -> bool {
        self.sweep_expired_at(now);
        let expired = match self.sessions.get_mut(session_id) {
            None => return false,
            Some(mut entry) => {
                if now.saturating_duration_since(entry.last_access) >= self.idle_timeout {
                    true
                } else {
                    entry.last_access = now;
                    false
                }
            }
        };
        if expired {
            self.sessions.remove(session_id);
            tracing::debug!(session = %session_id, "Session expired");
        }
        !expired
    }

    /// Drop idle sessions, at most once per sweep interval.
    ///
    /// Returns the number of sessions removed.
    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        {
            let mut last = self.last_sweep.lock().expect("session store mutex poisoned");
            if now.saturating_duration_since(*last) < SWEEP_INTERVAL {
                return 0;
            }
            *last = now;
        }

        let before = self.sessions.len();
        self.sessions
            .retain(|_, entry| now.saturating_duration_since(entry.last_access) < self.idle_timeout);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::info!(removed, remaining = self.sessions.len(), "Evicted idle sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, session_id: &str, key: &str) -> Option<String> {
        self.sessions.get(session_id)?.values.get(key).cloned()
    }

    /// Unknown or destroyed ids are ignored.
    fn set(&self, session_id: &str, key: &str, value: String) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.values.insert(key.to_string(), value);
        }
    }

    fn remove(&self, session_id: &str, key: &str) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.values.remove(key);
        }
    }

    fn keys(&self, session_id: &str) -> Vec<String> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.values.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn clear(&self, session_id: &str) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.values.clear();
        }
    }

    fn exists(&self, session_id: &str) -> bool {
        self.exists_at(session_id, Instant::now())
    }

    fn destroy(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}

/// The current request's session: an id bound to a store.
#[derive(Clone)]
pub struct Session {
    id: String,
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub fn new(id: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        Self { id: id.into(), store }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.store.get(&self.id, key)
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.store.set(&self.id, key, value.into());
    }

    pub fn remove(&self, key: &str) {
        self.store.remove(&self.id, key);
    }

    pub fn keys(&self) -> Vec<String> {
        self.store.keys(&self.id)
    }

    pub fn clear(&self) {
        self.store.clear(&self.id);
    }

    pub fn destroy(&self) {
        self.store.destroy(&self.id);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}
