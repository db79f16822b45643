//! In-memory transport factory for pool tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_transport::{Result, TransportError, TransportFactory};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::Notify;

/// Connection `n` (0-based) from a [`MockFactory`].
#[derive(Debug)]
pub(crate) struct MockStream {
    pub(crate) n: usize,
    io: DuplexStream,
    dead: Arc<AtomicBool>,
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockFactory {
    connects: AtomicUsize,
    shutdowns: AtomicUsize,
    fail_connect: AtomicBool,
    fail_shutdown: AtomicBool,
    stall: AtomicBool,
    stall_shutdown: AtomicBool,
    cancel: Notify,
    dead: Mutex<Vec<Arc<AtomicBool>>>,
    peers: Mutex<Vec<Option<DuplexStream>>>,
}

impl MockFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Make the probe report connection `n` as gone.
    pub(crate) fn kill(&self, n: usize) {
        self.dead.lock()[n].store(true, Ordering::SeqCst);
    }

    /// Take the server end of connection `n`.
    pub(crate) fn take_peer(&self, n: usize) -> DuplexStream {
        self.peers.lock()[n].take().expect("peer already taken")
    }

    pub(crate) fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_shutdown(&self, fail: bool) {
        self.fail_shutdown.store(fail, Ordering::SeqCst);
    }

    /// Make shutdowns hang forever.
    pub(crate) fn stall_shutdown(&self, stall: bool) {
        self.stall_shutdown.store(stall, Ordering::SeqCst);
    }

    /// Make connects hang until cancelled.
    pub(crate) fn stall(&self, stall: bool) {
        self.stall.store(stall, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    type Stream = MockStream;

    async fn connect(&self, host: &str, port: u16) -> Result<MockStream> {
        let cancelled = self.cancel.notified();
        if self.stall.load(Ordering::SeqCst) {
            cancelled.await;
            return Err(TransportError::Cancelled);
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                host: host.to_string(),
                port,
                source: io::ErrorKind::ConnectionRefused.into(),
            });
        }

        let (io, peer) = tokio::io::duplex(1024);
        let dead = Arc::new(AtomicBool::new(false));
        let n = self.connects.fetch_add(1, Ordering::SeqCst);
        self.dead.lock().push(Arc::clone(&dead));
        self.peers.lock().push(Some(peer));

        Ok(MockStream { n, io, dead })
    }

    async fn shutdown(&self, _stream: &mut MockStream) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.stall_shutdown.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_shutdown.load(Ordering::SeqCst) {
            return Err(TransportError::Shutdown(io::Error::other("shutdown failed")));
        }
        Ok(())
    }

    fn probe(&self, stream: &MockStream) -> io::Result<()> {
        if stream.dead.load(Ordering::SeqCst) {
            Err(io::ErrorKind::BrokenPipe.into())
        } else {
            Ok(())
        }
    }

    fn cancel(&self) {
        self.cancel.notify_waiters();
    }
}
