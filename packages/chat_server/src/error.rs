use std::io;

/// Fatal server errors. Everything here ends the process at startup;
/// per-connection failures never surface as a `ServerError`.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<figment::Error> for ServerError {
    fn from(err: figment::Error) -> Self {
        ServerError::Config(err.to_string())
    }
}

/// Errors produced while framing lines on a connection.
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("line exceeds {max} bytes")]
    TooLong { max: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_names_address() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:5000".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        };
        let msg = err.to_string();
        assert!(msg.contains("0.0.0.0:5000"));
        assert!(msg.contains("address in use"));
    }

    #[test]
    fn line_error_from_io() {
        let err: LineError = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        assert!(matches!(err, LineError::Io(_)));
        assert_eq!(LineError::TooLong { max: 8 }.to_string(), "line exceeds 8 bytes");
    }
}
