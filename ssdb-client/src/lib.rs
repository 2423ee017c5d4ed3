//! # SSDB Sync Client
//!
//! Purpose: Provide a lightweight, synchronous client for a key-value server
//! speaking the length-prefixed block protocol, with connection pooling to
//! minimize TCP handshake overhead.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse TCP connections to avoid repeated connects.
//! 2. **One Generic Call**: Everything funnels through `execute`; typed
//!    commands are thin rows on top of it.
//! 3. **Minimal Allocation**: Reuse buffers for framing and parsing.
//! 4. **Protocol Clarity**: Encode/parse blocks explicitly for correctness.
//!
//! ## Usage
//! ```no_run
//! use ssdb_client::{Commands, ConnectionPool, PoolConfig};
//!
//! let pool = ConnectionPool::new(PoolConfig::new("127.0.0.1", 8888))?;
//! let mut conn = pool.acquire()?;
//! conn.set("greeting", "hello")?;
//! assert_eq!(conn.get("greeting")?, "hello");
//! conn.release();
//! # Ok::<(), ssdb_client::ClientError>(())
//! ```

mod commands;
mod config;
mod connection;
mod error;
mod pool;
mod protocol;
mod response;

pub use commands::Commands;
pub use config::{
    PoolConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_GROW_STEP, DEFAULT_HEALTH_CHECK_INTERVAL,
    DEFAULT_PROBE_KEY, DEFAULT_READ_TIMEOUT,
};
pub use connection::{ConnectOptions, Connection};
pub use error::{ClientError, ClientResult};
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use protocol::{encode_command, read_response, Arg};
pub use response::{Response, STATUS_OK};
