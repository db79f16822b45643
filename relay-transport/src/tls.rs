//! TLS transport over rustls.
//!
//! [`TlsConnector`] layers a rustls client session on top of a
//! [`TcpConnector`]: connect runs the TCP connect and then the handshake,
//! shutdown sends `close_notify` before half-closing the socket.
//!
//! ```no_run
//! use relay_transport::{TlsConnector, TransportFactory};
//!
//! # async fn example() -> relay_transport::Result<()> {
//! let connector = TlsConnector::from_pem_file("ca.pem")?;
//! let mut stream = connector.connect("example.com", 443).await?;
//! connector.shutdown(&mut stream).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use rustls_pemfile::certs;
use std::fmt;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::error::peer_gone;
use crate::tcp::probe_socket;
use crate::{Result, TcpConnector, TransportError, TransportFactory};

/// Transport factory for TLS connections.
pub struct TlsConnector {
    tcp: TcpConnector,
    connector: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    /// Create a connector from a prepared rustls client configuration.
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self::with_tcp(TcpConnector::new(), config)
    }

    /// Create a connector on top of a specific TCP connector.
    pub fn with_tcp(tcp: TcpConnector, config: Arc<ClientConfig>) -> Self {
        Self {
            tcp,
            connector: tokio_rustls::TlsConnector::from(config),
        }
    }

    /// Create a connector trusting the given roots.
    pub fn from_root_store(roots: RootCertStore) -> Result<Self> {
        Ok(Self::new(Arc::new(client_config(roots)?)))
    }

    /// Create a connector trusting the certificates in PEM bytes.
    pub fn from_pem_roots(pem: &[u8]) -> Result<Self> {
        Self::from_root_store(root_store(parse_certs(pem)?)?)
    }

    /// Create a connector trusting the certificates in a PEM file.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_root_store(root_store(load_certs(path.as_ref())?)?)
    }

    /// Get the underlying TCP connector.
    pub fn tcp(&self) -> &TcpConnector {
        &self.tcp
    }
}

impl fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConnector")
            .field("tcp", &self.tcp)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TransportFactory for TlsConnector {
    type Stream = TlsStream<TcpStream>;

    async fn connect(&self, host: &str, port: u16) -> Result<Self::Stream> {
        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|_| TransportError::InvalidServerName(host.to_string()))?;

        let tcp = self.tcp.connect(host, port).await?;

        let stream = self
            .tcp
            .canceler()
            .run(async {
                self.connector
                    .connect(server_name, tcp)
                    .await
                    .map_err(|source| TransportError::Handshake {
                        host: host.to_string(),
                        source,
                    })
            })
            .await
            .inspect_err(|e| debug!(host, port, error = %e, "TLS handshake failed"))?;

        debug!(host, port, "TLS connection established");
        Ok(stream)
    }

    async fn shutdown(&self, stream: &mut Self::Stream) -> Result<()> {
        stream.get_mut().1.send_close_notify();
        match stream.flush().await {
            Ok(()) => {}
            Err(e) if peer_gone(&e) => {}
            Err(e) => return Err(TransportError::Shutdown(e)),
        }
        self.tcp.shutdown(stream.get_mut().0).await
    }

    /// Peeks the TCP socket under the TLS session.
    ///
    /// Undecrypted records count as alive, so a server that sent
    /// `close_notify` before its FIN passes until the FIN arrives alone.
    /// As with plain TCP, a half-open connection can also pass.
    fn probe(&self, stream: &Self::Stream) -> io::Result<()> {
        probe_socket(stream.get_ref().0)
    }

    fn cancel(&self) {
        self.tcp.cancel();
    }
}

fn client_config(roots: RootCertStore) -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::TlsConfig(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

fn root_store(certs: Vec<CertificateDer<'static>>) -> Result<RootCertStore> {
    if certs.is_empty() {
        return Err(TransportError::TlsConfig(
            "No certificates found in PEM input".to_string(),
        ));
    }

    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots
            .add(cert)
            .map_err(|e| TransportError::TlsConfig(format!("Invalid root certificate: {}", e)))?;
    }
    Ok(roots)
}

/// Load certificates from a PEM file
fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = std::fs::read(path).map_err(|e| {
        TransportError::TlsConfig(format!(
            "Failed to open certificate file {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_certs(&pem)
}

/// Parse certificates from PEM bytes
fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(pem);

    certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| TransportError::TlsConfig(format!("Failed to parse certificates: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pem_without_certificates_is_rejected() {
        let err = TlsConnector::from_pem_roots(b"not a certificate").unwrap_err();
        assert!(matches!(err, TransportError::TlsConfig(_)));
    }

    #[test]
    fn test_missing_pem_file() {
        let err = TlsConnector::from_pem_file("/nonexistent/relay/ca.pem").unwrap_err();
        assert!(matches!(err, TransportError::TlsConfig(msg) if msg.contains("ca.pem")));
    }

    #[test]
    fn test_self_signed_root_is_accepted() {
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();

        let connector = TlsConnector::from_pem_roots(cert.pem().as_bytes());
        assert!(connector.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_server_name_fails_before_connecting() {
        let connector = TlsConnector::from_root_store(RootCertStore::empty()).unwrap();
        let err = connector.connect("bad host name!", 443).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidServerName(_)));
        assert!(err.is_handshake());
    }
}
