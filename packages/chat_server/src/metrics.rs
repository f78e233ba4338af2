//! Server metrics for observability
//!
//! Counters are relaxed atomics bumped from the accept loop, session tasks
//! and the broadcaster. A serializable snapshot is logged at shutdown.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::broadcast::BroadcastReport;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently connected sessions
    pub active_sessions: AtomicU64,
    /// Total sessions since server start
    pub total_sessions: AtomicU64,

    // Message metrics
    /// Lines read from clients
    pub lines_received: AtomicU64,
    /// Broadcast calls
    pub broadcasts: AtomicU64,
    /// Lines placed in a session mailbox
    pub deliveries_enqueued: AtomicU64,
    /// Pending lines evicted because a mailbox was full
    pub deliveries_dropped: AtomicU64,
    /// Lines written to client sockets
    pub lines_written: AtomicU64,

    // Error metrics
    pub read_errors: AtomicU64,
    pub write_errors: AtomicU64,
    pub accept_errors: AtomicU64,
    /// Sessions closed for sending a line over the size limit
    pub oversized_lines: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    // Connection tracking
    pub fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    // Message tracking
    pub fn line_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcast(&self, report: &BroadcastReport) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.deliveries_enqueued
            .fetch_add(report.recipients as u64, Ordering::Relaxed);
        self.deliveries_dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
    }

    pub fn line_written(&self) {
        self.lines_written.fetch_add(1, Ordering::Relaxed);
    }

    // Error tracking
    pub fn read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn line_too_long(&self) {
        self.oversized_lines.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            sessions: SessionMetrics {
                active: self.active_sessions.load(Ordering::Relaxed),
                total: self.total_sessions.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.lines_received.load(Ordering::Relaxed),
                broadcasts: self.broadcasts.load(Ordering::Relaxed),
                enqueued: self.deliveries_enqueued.load(Ordering::Relaxed),
                dropped: self.deliveries_dropped.load(Ordering::Relaxed),
                written: self.lines_written.load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                read: self.read_errors.load(Ordering::Relaxed),
                write: self.write_errors.load(Ordering::Relaxed),
                accept: self.accept_errors.load(Ordering::Relaxed),
                oversized: self.oversized_lines.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub sessions: SessionMetrics,
    pub messages: MessageMetrics,
    pub errors: ErrorMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub broadcasts: u64,
    pub enqueued: u64,
    pub dropped: u64,
    pub written: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub read: u64,
    pub write: u64,
    pub accept: u64,
    pub oversized: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_tracking() {
        let metrics = ServerMetrics::new();

        metrics.session_opened();
        metrics.session_opened();
        assert_eq!(metrics.active_sessions.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.total_sessions.load(Ordering::Relaxed), 2);

        metrics.session_closed();
        assert_eq!(metrics.active_sessions.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.total_sessions.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_broadcast_accounting() {
        let metrics = ServerMetrics::new();
        metrics.broadcast(&BroadcastReport {
            recipients: 3,
            dropped: 1,
            skipped: 0,
        });
        metrics.broadcast(&BroadcastReport {
            recipients: 2,
            dropped: 0,
            skipped: 1,
        });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages.broadcasts, 2);
        assert_eq!(snapshot.messages.enqueued, 5);
        assert_eq!(snapshot.messages.dropped, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = ServerMetrics::new();
        metrics.session_opened();
        metrics.line_received();
        metrics.line_written();
        metrics.accept_error();
        metrics.line_too_long();

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["sessions"]["active"], 1);
        assert_eq!(json["messages"]["received"], 1);
        assert_eq!(json["messages"]["written"], 1);
        assert_eq!(json["errors"]["accept"], 1);
        assert_eq!(json["errors"]["oversized"], 1);
        assert_eq!(json["errors"]["read"], 0);
    }
}
