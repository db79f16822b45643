//! # Relay Pool
//!
//! A connection pool for a single origin, generic over the transport.
//!
//! ## Features
//!
//! - **Idle Reuse**: Returned connections are handed out again in FIFO order
//! - **Liveness Probes**: Dead idle connections are evicted on checkout
//! - **Discard on Drop**: A handle that is not returned is shut down
//! - **Revocation**: `close()` shuts down handles that are still checked out
//! - **Timed I/O**: Per-operation deadlines from the pool configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relay_pool::{ConnectionPool, PoolConfig, Verdict};
//! use relay_transport::TcpConnector;
//! use tokio::io::AsyncWriteExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PoolConfig::builder()
//!         .host("example.com")
//!         .port(80)
//!         .max_size(8)
//!         .build();
//!     let pool = ConnectionPool::new(config, TcpConnector::new());
//!
//!     let mut conn = pool.get().await?;
//!     let result = conn.write_all(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").await;
//!     pool.put(conn, Verdict::from(&result)).await;
//!
//!     pool.close().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod handle;
mod pool;
mod record;
mod stats;

#[cfg(test)]
mod mock;

pub use config::{PoolConfig, PoolConfigBuilder};
pub use error::{PoolError, Result};
pub use handle::PooledConnection;
pub use pool::{ConnectionPool, TcpPool, Verdict};
#[cfg(feature = "tls")]
pub use pool::TlsPool;
pub use stats::PoolStats;

/// Prelude for common imports.
///
/// ```
/// use relay_pool::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{PoolConfig, PoolConfigBuilder};
    pub use crate::error::{PoolError, Result};
    pub use crate::handle::PooledConnection;
    pub use crate::pool::{ConnectionPool, Verdict};
    pub use crate::stats::PoolStats;
}
