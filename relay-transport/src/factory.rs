//! The transport factory contract.

use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Notify;

use crate::{Result, TransportError};

/// Connect/shutdown/probe/cancel capability for one kind of transport.
///
/// Implemented by [`TcpConnector`](crate::TcpConnector) and
/// [`TlsConnector`](crate::TlsConnector). Consumers such as the connection
/// pool take the factory as a generic parameter, so calls are statically
/// dispatched.
#[async_trait]
pub trait TransportFactory: Send + Sync + 'static {
    /// The connected byte stream this factory produces.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Resolve `host:port` and establish a connection.
    ///
    /// A resolution failure is returned as-is; no connection is attempted.
    async fn connect(&self, host: &str, port: u16) -> Result<Self::Stream>;

    /// Gracefully half-close the stream.
    ///
    /// A peer that already went away is not reported as a failure.
    async fn shutdown(&self, stream: &mut Self::Stream) -> Result<()>;

    /// Non-blocking liveness probe.
    ///
    /// Returns an error when the peer has closed or the socket is broken.
    /// Detection is best-effort: a half-open connection can still pass, and
    /// so can one whose peer left unread bytes (a TLS `close_notify`) ahead
    /// of its FIN.
    fn probe(&self, stream: &Self::Stream) -> io::Result<()>;

    /// Abort every resolution/connect currently in flight on this factory.
    ///
    /// Aborted operations complete with [`TransportError::Cancelled`].
    /// Established streams and connects started afterwards are unaffected.
    fn cancel(&self);
}

#[async_trait]
impl<F: TransportFactory> TransportFactory for Arc<F> {
    type Stream = F::Stream;

    async fn connect(&self, host: &str, port: u16) -> Result<Self::Stream> {
        (**self).connect(host, port).await
    }

    async fn shutdown(&self, stream: &mut Self::Stream) -> Result<()> {
        (**self).shutdown(stream).await
    }

    fn probe(&self, stream: &Self::Stream) -> io::Result<()> {
        (**self).probe(stream)
    }

    fn cancel(&self) {
        (**self).cancel()
    }
}

/// Aborts the operations that are in flight when `cancel()` is called.
#[derive(Debug, Default)]
pub(crate) struct Canceler {
    notify: Notify,
}

impl Canceler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wake every operation currently running under this canceler.
    pub(crate) fn cancel(&self) {
        self.notify.notify_waiters();
    }

    /// Run `operation` until it completes or `cancel()` is called.
    pub(crate) async fn run<T, Fut>(&self, operation: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        // Registered before the first poll so a cancel racing the start is seen.
        let cancelled = self.notify.notified();
        tokio::select! {
            biased;
            _ = cancelled => Err(TransportError::Cancelled),
            result = operation => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_operation() {
        let canceler = Arc::new(Canceler::new());

        let task = {
            let canceler = Arc::clone(&canceler);
            tokio::spawn(async move {
                canceler
                    .run(std::future::pending::<Result<()>>())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        canceler.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("cancel did not wake the operation")
            .unwrap();
        assert!(matches!(result, Err(TransportError::Cancelled)));
    }

    #[tokio::test]
    async fn test_operations_after_cancel_are_unaffected() {
        let canceler = Canceler::new();
        canceler.cancel();

        let result = canceler.run(async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_completed_operation_wins_over_later_cancel() {
        let canceler = Canceler::new();
        let result = canceler
            .run(async { Err::<(), _>(TransportError::InvalidServerName("x".into())) })
            .await;
        canceler.cancel();

        assert!(matches!(result, Err(TransportError::InvalidServerName(_))));
    }
}
