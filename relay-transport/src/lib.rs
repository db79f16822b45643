//! # Relay Transport
//!
//! Transport factories and deadline-guarded streams for client connections.
//!
//! ## Features
//!
//! - **TCP**: Resolve a host and connect to the first address that accepts
//! - **TLS**: rustls handshake layered on the TCP connector (`tls` feature)
//! - **Cancellation**: Abort every in-flight connect on a factory at once
//! - **Timed Streams**: Per-operation read/write deadlines for any stream
//! - **Liveness Probes**: Non-blocking checks for peers that went away
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relay_transport::{TcpConnector, TimedStream, TransportFactory};
//! use std::time::Duration;
//! use tokio::io::AsyncWriteExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = TcpConnector::new();
//!     let stream = connector.connect("example.com", 80).await?;
//!
//!     let mut stream = TimedStream::new(stream, Duration::from_secs(5));
//!     stream.write_all(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").await?;
//!
//!     connector.shutdown(stream.get_mut()).await?;
//!     Ok(())
//! }
//! ```

mod error;
mod factory;
mod origin;
mod tcp;
mod timed;
#[cfg(feature = "tls")]
mod tls;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{Aborted, Result, TransportError, aborted, is_aborted};
pub use factory::TransportFactory;
pub use origin::{Origin, default_port};
pub use tcp::{TcpConfig, TcpConnector};
pub use timed::TimedStream;
#[cfg(feature = "tls")]
pub use tls::TlsConnector;

// Re-export rustls for building client configurations
#[cfg(feature = "tls")]
pub use rustls;
#[cfg(feature = "tls")]
pub use tokio_rustls::client::TlsStream;

/// Prelude for common imports.
///
/// ```
/// use relay_transport::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Aborted, Result, TransportError};
    pub use crate::factory::TransportFactory;
    pub use crate::origin::Origin;
    pub use crate::tcp::{TcpConfig, TcpConnector};
    pub use crate::timed::TimedStream;
    #[cfg(feature = "tls")]
    pub use crate::tls::TlsConnector;
}
