use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::session::{Session, SessionId};

/// The set of active sessions.
///
/// Every membership change and every snapshot goes through one lock, held
/// only for bookkeeping and never across socket I/O. Removal flips the
/// session to `Closing` while the write lock is held, so a snapshot only
/// ever contains sessions that are `Active`.
#[derive(Default)]
pub struct Registry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly created session. Returns false (and leaves the
    /// registry untouched) if the session is not active or the id is taken.
    pub fn add(&self, session: Arc<Session>) -> bool {
        let mut sessions = self.sessions.write();
        if !session.is_active() || sessions.contains_key(&session.id()) {
            return false;
        }
        debug!(session = %session.id(), "registered");
        sessions.insert(session.id(), session);
        true
    }

    /// Remove a session, marking it `Closing`. Idempotent: returns `None` if
    /// it was already gone.
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write();
        let session = sessions.remove(&id)?;
        session.mark_closing();
        debug!(session = %id, "deregistered");
        Some(session)
    }

    /// Point-in-time copy of the active sessions, safe to iterate while the
    /// live registry keeps changing.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Remove every session at once, marking each `Closing`. The caller
    /// finishes closing them outside the lock.
    pub fn close_all(&self) -> Vec<Arc<Session>> {
        let mut sessions = self.sessions.write();
        sessions
            .drain()
            .map(|(_, session)| {
                session.mark_closing();
                session
            })
            .collect()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("sessions", &self.len())
            .finish()
    }
}
