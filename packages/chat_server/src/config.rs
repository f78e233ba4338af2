use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::codec::DEFAULT_MAX_LINE_BYTES;
use crate::error::ServerError;

// =============================================================================
// File config (figment-deserialized from defaults / chat_server.toml / env vars)
// =============================================================================
//
//   chat_server.toml:  [session]
//                      mailbox_capacity = 512
//
//   env var:           CHAT_SESSION__MAILBOX_CAPACITY=512  (double underscore = nesting)

/// Name of the config file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "chat_server.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "CHAT_";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long shutdown waits for sessions to finish.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Per-connection settings (lives under `[session]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    /// 0 disables the idle timeout.
    #[serde(default)]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_echo_to_sender")]
    pub echo_to_sender: bool,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            max_line_bytes: default_max_line_bytes(),
            idle_timeout_secs: 0,
            echo_to_sender: default_echo_to_sender(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_shutdown_grace_secs() -> u64 {
    5
}
fn default_mailbox_capacity() -> usize {
    256
}
fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}
fn default_echo_to_sender() -> bool {
    true
}

/// Build a figment that layers: defaults → config file → CHAT_* env vars.
///
/// An explicit `path` is used as-is; otherwise `chat_server.toml` in the
/// working directory is read if it exists. A missing file contributes
/// nothing.
pub fn load_config(path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let file: PathBuf = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

// =============================================================================
// Runtime config (validated view of FileConfig)
// =============================================================================

/// Settings every session reads.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub mailbox_capacity: usize,
    pub max_line_bytes: usize,
    pub idle_timeout: Option<Duration>,
    pub echo_to_sender: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        // Defaults are always valid.
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            max_line_bytes: default_max_line_bytes(),
            idle_timeout: None,
            echo_to_sender: default_echo_to_sender(),
        }
    }
}

impl SessionConfig {
    pub fn from_file(fc: &SessionFileConfig) -> Result<Self, ServerError> {
        if fc.mailbox_capacity == 0 {
            return Err(ServerError::Config(
                "session.mailbox_capacity must be at least 1".to_string(),
            ));
        }
        if fc.max_line_bytes == 0 {
            return Err(ServerError::Config(
                "session.max_line_bytes must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            mailbox_capacity: fc.mailbox_capacity,
            max_line_bytes: fc.max_line_bytes,
            idle_timeout: if fc.idle_timeout_secs == 0 {
                None
            } else {
                Some(Duration::from_secs(fc.idle_timeout_secs))
            },
            echo_to_sender: fc.echo_to_sender,
        })
    }
}

/// Server configuration for runtime behavior.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub shutdown_grace: Duration,
    pub session: SessionConfig,
}

impl ServerConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self, ServerError> {
        Ok(Self {
            bind_addr: resolve_bind_addr(&fc.server.host, fc.server.port)?,
            shutdown_grace: Duration::from_secs(fc.server.shutdown_grace_secs),
            session: SessionConfig::from_file(&fc.session)?,
        })
    }
}

fn resolve_bind_addr(host: &str, port: u16) -> Result<SocketAddr, ServerError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| ServerError::Config(format!("invalid host {host:?}: {e}")))?
        .next()
        .ok_or_else(|| ServerError::Config(format!("host {host:?} resolved to no address")))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_file_config_defaults() {
        let fc = FileConfig::default();
        assert_eq!(fc.server.host, "0.0.0.0");
        assert_eq!(fc.server.port, 5000);
        assert_eq!(fc.server.shutdown_grace_secs, 5);
        assert_eq!(fc.session.mailbox_capacity, 256);
        assert_eq!(fc.session.max_line_bytes, 64 * 1024);
        assert_eq!(fc.session.idle_timeout_secs, 0);
        assert!(fc.session.echo_to_sender);
    }

    #[test]
    fn test_server_config_from_defaults() {
        let sc = ServerConfig::from_file(&FileConfig::default()).unwrap();
        assert_eq!(sc.bind_addr, "0.0.0.0:5000".parse().unwrap());
        assert_eq!(sc.shutdown_grace, Duration::from_secs(5));
        assert!(sc.session.idle_timeout.is_none());
        assert!(sc.session.echo_to_sender);
    }

    // ── validation ──────────────────────────────────────────────────────

    #[test]
    fn test_idle_timeout_enabled() {
        let fc = SessionFileConfig {
            idle_timeout_secs: 30,
            ..Default::default()
        };
        let sc = SessionConfig::from_file(&fc).unwrap();
        assert_eq!(sc.idle_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_mailbox_capacity_rejected() {
        let fc = SessionFileConfig {
            mailbox_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            SessionConfig::from_file(&fc),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn test_zero_max_line_rejected() {
        let fc = SessionFileConfig {
            max_line_bytes: 0,
            ..Default::default()
        };
        assert!(SessionConfig::from_file(&fc).is_err());
    }

    #[test]
    fn test_bad_host_rejected() {
        let fc = FileConfig {
            server: ServerFileConfig {
                host: "not a host name".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            ServerConfig::from_file(&fc),
            Err(ServerError::Config(_))
        ));
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(Some(&tmp.path().join("absent.toml")))
            .extract()
            .unwrap();
        assert_eq!(fc.server.port, 5000);
        assert_eq!(fc.session.mailbox_capacity, 256);
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("chat.toml");
        std::fs::write(
            &path,
            "[server]\nhost = \"127.0.0.1\"\nport = 6000\n\n[session]\nmailbox_capacity = 16\necho_to_sender = false\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(Some(&path)).extract().unwrap();
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.server.port, 6000);
        assert_eq!(fc.session.mailbox_capacity, 16);
        assert!(!fc.session.echo_to_sender);
        // Untouched keys keep their defaults.
        assert_eq!(fc.session.max_line_bytes, 64 * 1024);
    }

    #[test]
    fn test_load_config_rejects_bad_type() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("chat.toml");
        std::fs::write(&path, "[server]\nport = \"lots\"\n").unwrap();
        let result: Result<FileConfig, figment::Error> = load_config(Some(&path)).extract();
        let err = ServerError::from(result.unwrap_err());
        assert!(matches!(err, ServerError::Config(_)));
    }
}
