//! One connected client: shared session state plus the task that drives its
//! socket.
//!
//! Each session runs two units of work. The reader (the session task itself)
//! decodes inbound lines and hands them to the broadcaster; a spawned writer
//! drains the session's mailbox onto the socket. Either side failing closes
//! the whole session through [`Hub::close_session`].

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::LineCodec;
use crate::error::LineError;
use crate::hub::Hub;
use crate::mailbox::{Enqueue, Mailbox};
use crate::protocol;

/// Unique identifier for a session. Never reused within a process.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Lifecycle of a session: `Active -> Closing -> Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Closing,
    Closed,
}

const ACTIVE: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            ACTIVE => SessionState::Active,
            CLOSING => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// Why a session stopped. The first recorded reason wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed its end.
    Eof,
    ReadError(String),
    WriteError(String),
    LineTooLong,
    IdleTimeout,
    /// Server shutdown or an explicit close from outside the session.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Eof => write!(f, "eof"),
            CloseReason::ReadError(e) => write!(f, "read error: {}", e),
            CloseReason::WriteError(e) => write!(f, "write error: {}", e),
            CloseReason::LineTooLong => write!(f, "line too long"),
            CloseReason::IdleTimeout => write!(f, "idle timeout"),
            CloseReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Server-side state for one client, shared between its tasks, the
/// registry and the broadcaster.
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    connected_at: DateTime<Utc>,
    state: AtomicU8,
    mailbox: Mailbox,
    display_name: Mutex<Option<String>>,
    close_reason: Mutex<Option<CloseReason>>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(
        id: SessionId,
        peer: SocketAddr,
        mailbox_capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer,
            connected_at: Utc::now(),
            state: AtomicU8::new(ACTIVE),
            mailbox: Mailbox::new(mailbox_capacity),
            display_name: Mutex::new(None),
            close_reason: Mutex::new(None),
            cancel,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Queue a line for this client. Never waits on the socket.
    pub fn deliver(&self, line: Bytes) -> Enqueue {
        self.mailbox.push(line)
    }

    /// Advisory label taken from the first line that carried one.
    pub fn display_name(&self) -> Option<String> {
        self.display_name.lock().clone()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.lock().clone()
    }

    /// Fill in the display name from an inbound line if none is known yet.
    pub(crate) fn observe_line(&self, line: &[u8]) {
        let mut name = self.display_name.lock();
        if name.is_none() {
            *name = protocol::display_name_hint(line);
        }
    }

    /// `Active -> Closing`. Returns false if the session already left `Active`.
    pub(crate) fn mark_closing(&self) -> bool {
        self.state
            .compare_exchange(ACTIVE, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_closed(&self) {
        self.state.store(CLOSED, Ordering::Release);
    }

    /// Record the reason, drop pending output and stop both I/O paths.
    /// Safe to call any number of times; callers remove the session from
    /// the registry first.
    pub(crate) fn close(&self, reason: CloseReason) {
        {
            let mut slot = self.close_reason.lock();
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.mark_closing();
        self.mailbox.close();
        self.cancel.cancel();
    }

    fn label(&self) -> String {
        self.display_name()
            .unwrap_or_else(|| "<anonymous>".to_string())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .field("display_name", &*self.display_name.lock())
            .finish()
    }
}

/// Drive a registered session until either direction fails or the server
/// shuts down, then tear it down exactly once.
pub(crate) async fn run(session: Arc<Session>, stream: TcpStream, hub: Arc<Hub>) {
    let (read_half, write_half) = stream.into_split();
    let codec = LineCodec::with_max_length(hub.settings().max_line_bytes);

    let writer = tokio::spawn(write_loop(
        session.clone(),
        FramedWrite::new(write_half, codec.clone()),
        hub.clone(),
    ));

    let reader = FramedRead::new(read_half, codec);
    let reason = tokio::select! {
        reason = read_loop(&session, reader, &hub) => reason,
        () = session.cancel.cancelled() => CloseReason::Shutdown,
    };

    hub.close_session(&session, reason);

    if let Err(e) = writer.await {
        warn!(session = %session.id, error = %e, "writer task failed");
    }

    session.mark_closed();
    hub.metrics().session_closed();

    let duration = Utc::now() - session.connected_at;
    info!(
        session = %session.id,
        peer = %session.peer,
        name = %session.label(),
        reason = %session.close_reason().unwrap_or(CloseReason::Shutdown),
        duration_secs = duration.num_seconds(),
        remaining = hub.registry().len(),
        "Client disconnected"
    );
}

async fn read_loop(
    session: &Session,
    mut reader: FramedRead<OwnedReadHalf, LineCodec>,
    hub: &Hub,
) -> CloseReason {
    let idle_timeout = hub.settings().idle_timeout;

    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, reader.next()).await {
                Ok(next) => next,
                Err(_) => {
                    debug!(session = %session.id, "no input within {:?}", limit);
                    return CloseReason::IdleTimeout;
                }
            },
            None => reader.next().await,
        };

        match next {
            Some(Ok(line)) => {
                hub.metrics().line_received();
                session.observe_line(&line);
                hub.broadcaster().broadcast_from(Some(session.id), line);
            }
            Some(Err(LineError::TooLong { max })) => {
                hub.metrics().line_too_long();
                warn!(session = %session.id, max, "inbound line exceeds limit, closing");
                return CloseReason::LineTooLong;
            }
            Some(Err(LineError::Io(e))) => {
                hub.metrics().read_error();
                debug!(session = %session.id, error = %e, "read failed");
                return CloseReason::ReadError(e.to_string());
            }
            None => return CloseReason::Eof,
        }
    }
}

async fn write_loop<W>(session: Arc<Session>, mut sink: FramedWrite<W, LineCodec>, hub: Arc<Hub>)
where
    W: AsyncWrite + Unpin,
{
    loop {
        let line = tokio::select! {
            biased;
            () = session.cancel.cancelled() => break,
            line = session.mailbox.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        // A peer that stopped reading can park this write forever; shutdown
        // must still be able to reclaim the task.
        let result = tokio::select! {
            result = sink.send(line) => result,
            () = session.cancel.cancelled() => break,
        };

        match result {
            Ok(()) => hub.metrics().line_written(),
            Err(e) => {
                warn!(session = %session.id, error = %e, "write failed, closing session");
                hub.metrics().write_error();
                hub.close_session(&session, CloseReason::WriteError(e.to_string()));
                break;
            }
        }
    }

    if let Err(e) = sink.get_mut().shutdown().await {
        debug!(session = %session.id, error = %e, "write half shutdown failed");
    }
}
