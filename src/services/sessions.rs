use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, NaiveDateTime};

use crate::models::Session;

pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

/// Where conversations live between turns.
///
/// Each session sits behind its own async mutex; a caller holds it for a whole
/// turn, so turns of one session are serialized while other sessions proceed.
pub trait SessionStore: Send + Sync {
    /// The session for `id`, created on first use.
    fn checkout(&self, id: &str, now: NaiveDateTime) -> SessionHandle;

    fn get(&self, id: &str, now: NaiveDateTime) -> Option<SessionHandle>;

    fn remove(&self, id: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry {
    handle: SessionHandle,
    last_seen: NaiveDateTime,
}

/// In-process store bounded by capacity and idle time.
///
/// Expired sessions are dropped whenever the store is touched; at capacity the
/// least recently used session is evicted to make room.
pub struct MemorySessionStore {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemorySessionStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // Entries are inserted and removed whole, so a poisoned map is still consistent.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn purge_expired(&self, entries: &mut HashMap<String, Entry>, now: NaiveDateTime) {
        let before = entries.len();
        entries.retain(|_, entry| now - entry.last_seen < self.ttl);
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(purged, "expired sessions dropped");
        }
    }

    fn evict_least_recent(entries: &mut HashMap<String, Entry>) {
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_seen)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            entries.remove(&id);
            tracing::info!(session_id = %id, "session evicted at capacity");
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn checkout(&self, id: &str, now: NaiveDateTime) -> SessionHandle {
        let mut entries = self.lock();
        self.purge_expired(&mut entries, now);

        if let Some(entry) = entries.get_mut(id) {
            entry.last_seen = now;
            return entry.handle.clone();
        }

        if entries.len() >= self.capacity {
            Self::evict_least_recent(&mut entries);
        }

        let handle = Arc::new(tokio::sync::Mutex::new(Session::new(id, now)));
        entries.insert(
            id.to_string(),
            Entry {
                handle: handle.clone(),
                last_seen: now,
            },
        );
        tracing::debug!(session_id = %id, "session created");
        handle
    }

    fn get(&self, id: &str, now: NaiveDateTime) -> Option<SessionHandle> {
        let mut entries = self.lock();
        self.purge_expired(&mut entries, now);
        entries.get(id).map(|entry| entry.handle.clone())
    }

    fn remove(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
