//! # Client Errors
//!
//! Purpose: One error type for every layer of the client, from socket I/O up
//! to pool bookkeeping, so callers can match on the failure class.
//!
//! ## Failure Classes
//! 1. **Connection**: `Io`, `Protocol`, `BrokenConnection`. Terminal for the
//!    connection that produced them.
//! 2. **Application**: `Server`. The connection stays usable.
//! 3. **Decoding**: `UnexpectedResponse`, `InvalidInteger`, `InvalidUtf8`.
//! 4. **Pool**: `PoolExhausted`, `NoIdleConnection`, `PoolClosed`. The caller
//!    may retry acquisition.
//! 5. **Setup**: `InvalidConfig`, `Config`, `InvalidAddress`.

use thiserror::Error;

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client and its pool.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or IO failure while dialing, reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Response framing could not be parsed.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The connection failed earlier and refuses further commands.
    #[error("broken connection: {0}")]
    BrokenConnection(String),
    /// Status block was not `ok`; carries the status text verbatim.
    #[error("{0}")]
    Server(String),
    /// Response shape did not match what the decoder expects.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(&'static str),
    /// Payload block is not a decimal integer.
    #[error("invalid integer in response: {0:?}")]
    InvalidInteger(String),
    /// Payload block is not valid UTF-8.
    #[error("response is not valid utf-8")]
    InvalidUtf8,
    /// Pool is at capacity and no idle connection is available.
    #[error("can not create more connections")]
    PoolExhausted,
    /// The selected idle connection failed its liveness probe and was evicted.
    #[error("no idle connection")]
    NoIdleConnection,
    /// The pool has been closed.
    #[error("connection pool closed")]
    PoolClosed,
    /// Configuration violates one of its invariants.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Configuration document could not be parsed.
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),
    /// Address did not resolve to any socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl ClientError {
    /// Returns true for failures that leave the connection unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Protocol(_) | ClientError::BrokenConnection(_)
        )
    }
}
