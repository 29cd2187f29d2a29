use crate::session::types::Session;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default session lifetime (15 minutes)
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(15 * 60);

struct Entry {
    session: Session,
    expires_at: Instant,
}

/// In-memory, process-local session store with a sliding TTL.
///
/// Expiry is enforced lazily: an entry past its deadline is evicted by the
/// next `get` that touches it. Nothing is reclaimed proactively unless a
/// sweeper is started (see `session::cleanup`).
///
/// Every operation takes the lock only for the map access itself and never
/// across an await point. Two concurrent requests for the same sender can
/// both read the same snapshot; whichever calls `set` last wins.
pub struct SessionStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns a copy of the live session for `sender`, evicting it if expired.
    pub fn get(&self, sender: &str) -> Option<Session> {
        let mut guard = self.entries.lock();
        let expired = match guard.get(sender) {
            None => return None,
            Some(entry) => Instant::now() > entry.expires_at,
        };

        if expired {
            guard.remove(sender);
            debug!(sender = %sender, "Evicted expired session");
            return None;
        }

        guard.get(sender).map(|entry| entry.session.clone())
    }

    /// Stores `session` under `sender` and resets its expiry to a full TTL window.
    pub fn set(&self, sender: &str, session: Session) -> Session {
        let expires_at = Instant::now() + self.ttl;
        let mut guard = self.entries.lock();
        guard.insert(
            sender.to_string(),
            Entry {
                session: session.clone(),
                expires_at,
            },
        );
        session
    }

    /// Removes the entry for `sender`, returning whether one existed.
    pub fn delete(&self, sender: &str) -> bool {
        self.entries.lock().remove(sender).is_some()
    }

    /// Drops every entry whose deadline has passed and returns how many went.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.entries.lock();
        let before = guard.len();
        guard.retain(|_, entry| now <= entry.expires_at);
        before - guard.len()
    }

    /// Number of entries currently held, including ones not yet lazily evicted.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}
