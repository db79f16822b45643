//! Pool error types.

use relay_transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Pool errors.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Connecting a new transport failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Connecting a new transport took too long.
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The pool was closed while a connect was in flight.
    #[error("Connection pool closed")]
    Closed,

    /// One or more idle connections failed to shut down on close.
    #[error("{failures} connection(s) failed to shut down, last error: {last}")]
    Shutdown {
        /// Number of failed shutdowns.
        failures: usize,
        /// The last failure observed.
        #[source]
        last: TransportError,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PoolError {
    /// Check if retrying the acquisition might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectTimeout(_) => true,
            Self::Transport(e) => e.is_connect() || e.is_cancelled(),
            _ => false,
        }
    }

    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectTimeout(_))
    }
}
