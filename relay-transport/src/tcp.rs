//! Plain TCP transport.

use async_trait::async_trait;
use futures::task::noop_waker_ref;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use tokio::io::{AsyncWriteExt, ReadBuf};
use tokio::net::{TcpStream, lookup_host};
use tracing::debug;

use crate::error::peer_gone;
use crate::factory::Canceler;
use crate::{Result, TransportError, TransportFactory};

/// TCP socket options applied to every new connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Disable Nagle's algorithm.
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self { nodelay: true }
    }
}

/// Transport factory for plain TCP connections.
#[derive(Debug, Default)]
pub struct TcpConnector {
    config: TcpConfig,
    canceler: Canceler,
}

impl TcpConnector {
    /// Create a connector with default socket options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connector with the given socket options.
    pub fn with_config(config: TcpConfig) -> Self {
        Self {
            config,
            canceler: Canceler::new(),
        }
    }

    /// Get the socket options.
    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    #[cfg(feature = "tls")]
    pub(crate) fn canceler(&self) -> &Canceler {
        &self.canceler
    }

    async fn resolve_and_connect(&self, host: &str, port: u16) -> Result<TcpStream> {
        let addrs: Vec<SocketAddr> = lookup_host((host, port))
            .await
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                port,
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(TransportError::NoAddresses {
                host: host.to_string(),
                port,
            });
        }

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(self.config.nodelay)?;
                    debug!(host, %addr, "TCP connection established");
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(host, %addr, error = %e, "TCP connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(TransportError::Connect {
            host: host.to_string(),
            port,
            source: last_error.unwrap_or_else(|| io::ErrorKind::NotConnected.into()),
        })
    }
}

#[async_trait]
impl TransportFactory for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream> {
        self.canceler
            .run(self.resolve_and_connect(host, port))
            .await
            .inspect_err(|e| debug!(host, port, error = %e, "TCP connect failed"))
    }

    async fn shutdown(&self, stream: &mut TcpStream) -> Result<()> {
        match stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if peer_gone(&e) => Ok(()),
            Err(e) => Err(TransportError::Shutdown(e)),
        }
    }

    fn probe(&self, stream: &TcpStream) -> io::Result<()> {
        probe_socket(stream)
    }

    fn cancel(&self) {
        debug!("Cancelling in-flight TCP connects");
        self.canceler.cancel();
    }
}

/// Peek one byte without blocking or consuming it.
///
/// End-of-stream or a socket error means the peer is gone. Pending bytes or
/// "would block" mean the connection still looks usable.
pub(crate) fn probe_socket(stream: &TcpStream) -> io::Result<()> {
    let mut cx = Context::from_waker(noop_waker_ref());
    let mut byte = [0u8; 1];
    let mut buf = ReadBuf::new(&mut byte);

    match stream.poll_peek(&mut cx, &mut buf) {
        Poll::Pending => Ok(()),
        Poll::Ready(Ok(0)) => Err(io::ErrorKind::UnexpectedEof.into()),
        Poll::Ready(Ok(_)) => Ok(()),
        Poll::Ready(Err(e)) => Err(e),
    }
}
