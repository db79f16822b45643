//! Transport error types.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Host name resolution failed.
    #[error("Failed to resolve {host}:{port}: {source}")]
    Resolve {
        /// Host being resolved.
        host: String,
        /// Port being resolved.
        port: u16,
        /// Resolver error.
        #[source]
        source: io::Error,
    },

    /// Resolution succeeded but produced no addresses.
    #[error("No addresses found for {host}:{port}")]
    NoAddresses {
        /// Host that was resolved.
        host: String,
        /// Port that was resolved.
        port: u16,
    },

    /// Every resolved address refused or failed the connection.
    #[error("Failed to connect to {host}:{port}: {source}")]
    Connect {
        /// Target host.
        host: String,
        /// Target port.
        port: u16,
        /// Error from the last address tried.
        #[source]
        source: io::Error,
    },

    /// Host is not a valid TLS server name.
    #[error("Invalid server name: {0}")]
    InvalidServerName(String),

    /// TLS client configuration could not be built.
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// TLS handshake failed.
    #[error("TLS handshake with {host} failed: {source}")]
    Handshake {
        /// Server name used for the handshake.
        host: String,
        /// Handshake error.
        #[source]
        source: io::Error,
    },

    /// The operation was aborted by `cancel()`.
    #[error("Operation cancelled")]
    Cancelled,

    /// Graceful shutdown failed.
    #[error("Shutdown failed: {0}")]
    Shutdown(#[source] io::Error),

    /// URL could not be used as an origin.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Check if this error came from `cancel()`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error happened while establishing the connection.
    pub fn is_connect(&self) -> bool {
        matches!(
            self,
            Self::Resolve { .. } | Self::NoAddresses { .. } | Self::Connect { .. }
        )
    }

    /// Check if this is a TLS handshake failure.
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Handshake { .. } | Self::InvalidServerName(_))
    }
}

impl From<TransportError> for io::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(e) => e,
            TransportError::Cancelled => Aborted::Cancelled.into(),
            other => io::Error::other(other),
        }
    }
}

/// Cancellation-flavored failure of a single read or write.
///
/// Carried inside [`std::io::Error`] so wrapped streams keep their error type.
/// Use [`is_aborted`] to classify an I/O error without caring whether a
/// deadline or an explicit cancel caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Aborted {
    /// The per-operation deadline elapsed.
    #[error("Operation timed out after {0:?}")]
    Deadline(Duration),

    /// The operation was cancelled explicitly.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Aborted {
    /// The `io::ErrorKind` this abort surfaces as.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::Deadline(_) => io::ErrorKind::TimedOut,
            Self::Cancelled => io::ErrorKind::ConnectionAborted,
        }
    }
}

impl From<Aborted> for io::Error {
    fn from(aborted: Aborted) -> Self {
        io::Error::new(aborted.kind(), aborted)
    }
}

/// Check if an I/O error is a timeout or cancellation abort.
pub fn is_aborted(err: &io::Error) -> bool {
    aborted(err).is_some()
}

/// Extract the abort reason from an I/O error, if it carries one.
pub fn aborted(err: &io::Error) -> Option<Aborted> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<Aborted>())
        .copied()
}

/// Errors a graceful shutdown may report when the peer is already gone.
pub(crate) fn peer_gone(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
    )
}
