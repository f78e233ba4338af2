use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::broadcast::Broadcaster;
use crate::config::SessionConfig;
use crate::metrics::ServerMetrics;
use crate::registry::Registry;
use crate::session::{self, CloseReason, Session, SessionId};

/// Shared server context: owns the registry and everything a session needs
/// to run.
pub struct Hub {
    registry: Arc<Registry>,
    broadcaster: Broadcaster,
    metrics: Arc<ServerMetrics>,
    settings: SessionConfig,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Hub {
    pub fn new(settings: SessionConfig) -> Arc<Self> {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(ServerMetrics::new());
        let broadcaster =
            Broadcaster::new(registry.clone(), metrics.clone(), settings.echo_to_sender);
        Arc::new(Self {
            registry,
            broadcaster,
            metrics,
            settings,
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    pub fn settings(&self) -> &SessionConfig {
        &self.settings
    }

    /// Token cancelled when the server starts shutting down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Register a session for an accepted connection and start its tasks.
    /// Returns `None`, dropping the connection, once shutdown has begun.
    pub fn open_session(
        self: &Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Option<Arc<Session>> {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(Session::new(
            id,
            peer,
            self.settings.mailbox_capacity,
            self.shutdown.child_token(),
        ));

        if self.shutdown.is_cancelled() || !self.registry.add(session.clone()) {
            warn!(session = %id, peer = %peer, "session not registered, dropping connection");
            session.close(CloseReason::Shutdown);
            return None;
        }
        self.metrics.session_opened();

        self.tracker
            .spawn(session::run(session.clone(), stream, self.clone()));
        Some(session)
    }

    /// Deregister and close a session. Safe to call from either I/O path,
    /// any number of times.
    pub fn close_session(&self, session: &Session, reason: CloseReason) {
        self.registry.remove(session.id());
        session.close(reason);
    }

    /// Close every session and wait up to `grace` for their tasks to end.
    /// Returns false if some sessions were still running when time ran out.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shutdown.cancel();

        let sessions = self.registry.close_all();
        info!(sessions = sessions.len(), "Closing all sessions");
        for session in &sessions {
            session.close(CloseReason::Shutdown);
        }

        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                "sessions still running after {:?}", grace
            );
            return false;
        }
        true
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish()
    }
}
