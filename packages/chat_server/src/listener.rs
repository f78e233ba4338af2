use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::hub::Hub;

/// Pause after a failed accept so a persistent condition (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections and hands each one to the hub as a new session.
pub struct Listener {
    listener: TcpListener,
    hub: Arc<Hub>,
}

impl Listener {
    /// Bind the listening socket. Failure here is fatal for the server.
    pub async fn bind(addr: SocketAddr, hub: Arc<Hub>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self { listener, hub })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the hub's shutdown token is cancelled.
    /// Accept failures are logged and never end the loop.
    pub async fn run(self) {
        let shutdown = self.hub.shutdown_token();

        loop {
            let accepted = tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
                    }
                    if let Some(session) = self.hub.open_session(stream, peer) {
                        info!(
                            session = %session.id(),
                            peer = %peer,
                            connected = self.hub.registry().len(),
                            "Client connected"
                        );
                    }
                }
                Err(e) => {
                    self.hub.metrics().accept_error();
                    warn!(error = %e, "accept failed");
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!("Listener stopped accepting connections");
    }
}
