//! Error types for the relay.

use std::io;

use thiserror::Error;

/// Top-level error for binding and running the proxy or directory servers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cache capacity must be greater than 0")]
    ZeroCapacity,

    #[error("max_connections must be greater than 0")]
    ZeroMaxConnections,

    #[error("backend timeout must be greater than 0")]
    ZeroBackendTimeout,

    #[error("invalid address {addr:?}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

/// A message that cannot be classified as a request or reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,

    #[error("unknown message type marker {0:?}")]
    UnknownMarker(char),

    #[error("missing '#' separator after message type")]
    MissingSeparator,

    #[error("empty lookup key")]
    EmptyKey,

    #[error("message is not valid UTF-8")]
    InvalidUtf8,
}

/// Failures reading the directory datastore.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read database {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
