use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::mailbox::Enqueue;
use crate::metrics::ServerMetrics;
use crate::registry::Registry;
use crate::session::SessionId;

/// Per-call delivery summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions the line was queued for.
    pub recipients: usize,
    /// Recipients whose oldest pending line was evicted to make room.
    pub dropped: usize,
    /// Sessions that closed between the snapshot and the enqueue.
    pub skipped: usize,
}

/// Fans a line out to every session in a registry snapshot.
///
/// Only enqueues: the cost of a call depends on the number of sessions,
/// never on how fast any of them drains its mailbox.
pub struct Broadcaster {
    registry: Arc<Registry>,
    metrics: Arc<ServerMetrics>,
    echo_to_sender: bool,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>, metrics: Arc<ServerMetrics>, echo_to_sender: bool) -> Self {
        Self {
            registry,
            metrics,
            echo_to_sender,
        }
    }

    /// Deliver `line` to every active session.
    pub fn broadcast(&self, line: Bytes) -> BroadcastReport {
        self.broadcast_from(None, line)
    }

    /// Deliver `line` on behalf of `origin`. The origin gets its own line back
    /// unless echo is turned off.
    pub fn broadcast_from(&self, origin: Option<SessionId>, line: Bytes) -> BroadcastReport {
        debug!(
            origin = ?origin,
            line = %String::from_utf8_lossy(&line),
            "Broadcasting"
        );

        let mut report = BroadcastReport::default();
        for session in self.registry.snapshot() {
            if !self.echo_to_sender && Some(session.id()) == origin {
                continue;
            }
            match session.deliver(line.clone()) {
                Enqueue::Queued => report.recipients += 1,
                Enqueue::DroppedOldest { overflow_started } => {
                    report.recipients += 1;
                    report.dropped += 1;
                    if overflow_started {
                        warn!(
                            session = %session.id(),
                            capacity = session.mailbox().capacity(),
                            "mailbox full, dropping oldest pending lines"
                        );
                    } else {
                        debug!(session = %session.id(), "dropped oldest pending line");
                    }
                }
                Enqueue::Closed => report.skipped += 1,
            }
        }

        self.metrics.broadcast(&report);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use tokio_util::sync::CancellationToken;

    fn session(id: u64, capacity: usize) -> Arc<Session> {
        Arc::new(Session::new(
            SessionId(id),
            "127.0.0.1:40000".parse().unwrap(),
            capacity,
            CancellationToken::new(),
        ))
    }

    fn setup(echo: bool) -> (Arc<Registry>, Arc<ServerMetrics>, Broadcaster) {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(ServerMetrics::new());
        let broadcaster = Broadcaster::new(registry.clone(), metrics.clone(), echo);
        (registry, metrics, broadcaster)
    }

    #[tokio::test]
    async fn reaches_every_session_including_sender() {
        let (registry, _, broadcaster) = setup(true);
        let sessions: Vec<_> = (1..=3).map(|id| session(id, 8)).collect();
        for s in &sessions {
            registry.add(s.clone());
        }

        let report = broadcaster.broadcast_from(Some(SessionId(1)), Bytes::from_static(b"x: hi"));
        assert_eq!(report.recipients, 3);
        for s in &sessions {
            assert_eq!(s.mailbox().recv().await.unwrap(), Bytes::from_static(b"x: hi"));
            assert!(s.mailbox().is_empty());
        }
    }

    #[test]
    fn echo_off_skips_origin() {
        let (registry, _, broadcaster) = setup(false);
        let a = session(1, 8);
        let b = session(2, 8);
        registry.add(a.clone());
        registry.add(b.clone());

        let report = broadcaster.broadcast_from(Some(SessionId(1)), Bytes::from_static(b"a: yo"));
        assert_eq!(report.recipients, 1);
        assert!(a.mailbox().is_empty());
        assert_eq!(b.mailbox().len(), 1);
    }

    #[tokio::test]
    async fn preserves_order_per_sender() {
        let (registry, _, broadcaster) = setup(true);
        let r = session(1, 16);
        registry.add(r.clone());

        for i in 0..10 {
            broadcaster.broadcast(Bytes::from(format!("s: {i}")));
        }
        for i in 0..10 {
            assert_eq!(r.mailbox().recv().await.unwrap(), Bytes::from(format!("s: {i}")));
        }
    }

    #[tokio::test]
    async fn stalled_recipient_does_not_affect_others() {
        let (registry, metrics, broadcaster) = setup(true);
        let stalled = session(1, 2);
        let healthy = session(2, 64);
        registry.add(stalled.clone());
        registry.add(healthy.clone());

        for i in 0..10 {
            broadcaster.broadcast(Bytes::from(format!("line {i}")));
        }

        // The stalled mailbox kept only the newest entries.
        assert_eq!(stalled.mailbox().len(), 2);
        assert_eq!(stalled.mailbox().dropped(), 8);
        assert_eq!(stalled.mailbox().recv().await.unwrap(), Bytes::from("line 8"));

        // The healthy one got everything.
        assert_eq!(healthy.mailbox().len(), 10);
        assert_eq!(healthy.mailbox().dropped(), 0);

        assert_eq!(metrics.snapshot().messages.dropped, 8);
    }

    #[test]
    fn removed_session_gets_nothing() {
        let (registry, _, broadcaster) = setup(true);
        let a = session(1, 8);
        let b = session(2, 8);
        registry.add(a.clone());
        registry.add(b.clone());

        registry.remove(SessionId(1));
        a.close(crate::session::CloseReason::Eof);

        let report = broadcaster.broadcast(Bytes::from_static(b"after"));
        assert_eq!(report.recipients, 1);
        assert!(a.mailbox().is_empty());
        assert_eq!(b.mailbox().len(), 1);
    }

    #[test]
    fn closed_after_snapshot_is_skipped() {
        let (registry, _, broadcaster) = setup(true);
        let a = session(1, 8);
        registry.add(a.clone());
        // Closed mailbox but still registered: the enqueue is refused.
        a.mailbox().close();

        let report = broadcaster.broadcast(Bytes::from_static(b"late"));
        assert_eq!(report.recipients, 0);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn empty_registry() {
        let (_, _, broadcaster) = setup(true);
        assert_eq!(
            broadcaster.broadcast(Bytes::from_static(b"nobody")),
            BroadcastReport::default()
        );
    }
}
