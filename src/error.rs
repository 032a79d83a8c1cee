//! Error types
//!
//! Setup-time failures (configuration, binding, TLS material) surface as
//! [`ServerError`]. Request-time failures never leave the router; they are
//! turned into a status code and, where relevant, a security event.

use std::net::SocketAddr;
use thiserror::Error;

/// Error returned by an API endpoint handler
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Server setup errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    /// A listener socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Certificate or key could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ServerError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Server result alias
pub type ServerResult<T> = Result<T, ServerError>;

/// Misuse of a [`crate::http::Response`] by a handler
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseError {
    #[error("write after end")]
    WriteAfterEnd,
}
