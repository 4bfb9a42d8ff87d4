use thiserror::Error;

/// Errors that can occur while probing a destination
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connect to {dest} failed: {source}")]
    Connect {
        dest: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("Invalid server name: {0}")]
    InvalidServerName(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
