// Relay - client-side connection transport for HTTP
//
// This library pools connections to a single origin over plain TCP or TLS,
// and bounds individual reads and writes with per-operation deadlines.

// Re-export the transport layer
pub use relay_transport::{
    Aborted, Origin, TcpConfig, TcpConnector, TimedStream, TransportError, TransportFactory,
    aborted, default_port, is_aborted,
};

#[cfg(feature = "tls")]
pub use relay_transport::{TlsConnector, TlsStream, rustls};

#[cfg(feature = "test-util")]
pub use relay_transport::testing;

// Re-export the pool
pub use relay_pool::{
    ConnectionPool, PoolConfig, PoolConfigBuilder, PoolError, PoolStats, PooledConnection,
    TcpPool, Verdict,
};

#[cfg(feature = "tls")]
pub use relay_pool::TlsPool;

pub use relay_pool;
pub use relay_transport;

/// Create a plain TCP pool for the origin of `url`.
///
/// `https` URLs are rejected: they need a [`TlsPool`] built from a
/// `TlsConnector`.
///
/// ```no_run
/// # async fn example() -> Result<(), relay::PoolError> {
/// let pool = relay::tcp_pool("http://example.com/")?;
/// let conn = pool.get().await?;
/// pool.put(conn, relay::Verdict::Reusable).await;
/// pool.close().await
/// # }
/// ```
pub fn tcp_pool(url: &str) -> Result<TcpPool, PoolError> {
    let url = url::Url::parse(url).map_err(TransportError::from)?;
    let origin = Origin::from_url(&url)?;
    if origin.is_secure() {
        return Err(PoolError::Config(format!(
            "{}://{} needs a TLS pool",
            origin.scheme, origin
        )));
    }
    Ok(TcpPool::new(
        PoolConfig::builder().origin(&origin).build(),
        TcpConnector::new(),
    ))
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use relay_pool::{ConnectionPool, PoolConfig, PoolError, PoolStats, PooledConnection, Verdict};
    pub use relay_transport::{Aborted, Origin, TcpConnector, TimedStream, TransportError, TransportFactory};

    #[cfg(feature = "tls")]
    pub use relay_transport::TlsConnector;
}
