//! Chat Server - line-oriented TCP broadcast
//!
//! Every line a client sends is fanned out to all connected clients,
//! including the sender. The server never interprets line contents; join,
//! leave and `sender: body` conventions belong to the clients.
//!
//! # Example
//!
//! ```no_run
//! use chat_server::{Hub, Listener, SessionConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), chat_server::ServerError> {
//!     let hub = Hub::new(SessionConfig::default());
//!     let listener = Listener::bind("127.0.0.1:5000".parse().unwrap(), hub.clone()).await?;
//!
//!     let server = tokio::spawn(listener.run());
//!     tokio::signal::ctrl_c().await.ok();
//!
//!     hub.shutdown(Duration::from_secs(5)).await;
//!     server.await.ok();
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod codec;
pub mod config;
mod error;
mod hub;
mod listener;
pub mod mailbox;
pub mod metrics;
pub mod protocol;
mod registry;
mod session;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use codec::LineCodec;
pub use config::{ServerConfig, SessionConfig};
pub use error::{LineError, ServerError};
pub use hub::Hub;
pub use listener::Listener;
pub use mailbox::{Enqueue, Mailbox};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use registry::Registry;
pub use session::{CloseReason, Session, SessionId, SessionState};
