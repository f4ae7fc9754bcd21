//! # Error Taxonomy
//!
//! Purpose: Separate configuration mistakes (fatal, raised while building the
//! client) from transport failures (raised per call, never retried here).
//!
//! A missing key is not an error anywhere in this crate; operations report it
//! through their return values.

use thiserror::Error;

/// Result type for cache client operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Result type for driver-level calls.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors surfaced by the cache client.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Invalid descriptor, serializer version, driver name, or driver option.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failure reaching or talking to a shard.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Value could not be encoded or a stored payload could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        CacheError::Config(message.into())
    }

    /// Returns true for errors raised while building the client.
    pub fn is_config(&self) -> bool {
        matches!(self, CacheError::Config(_))
    }

    /// Returns true for network, protocol, or server-reply failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, CacheError::Transport(_))
    }
}

/// Errors raised by a driver while executing commands.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// RESP2 framing or parse error.
    #[error("protocol error")]
    Protocol,

    /// Server returned an error reply.
    #[error("server error: {}", String::from_utf8_lossy(.message))]
    Server { message: Vec<u8> },

    /// Response type did not match the expected command response.
    #[error("unexpected response")]
    UnexpectedResponse,

    /// No connection was returned to a full pool within `pool_timeout`.
    #[error("connection pool exhausted")]
    PoolExhausted,
}
