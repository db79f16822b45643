//! Deadline-guarded streams.
//!
//! [`TimedStream`] wraps any async stream and bounds each individual read,
//! write, flush, or shutdown by the same duration. A zero duration disables
//! the deadline entirely.
//!
//! The inherent methods ([`read`](TimedStream::read),
//! [`write_all`](TimedStream::write_all) and the rest) give every call its own
//! timer, owned by the returned future: dropping the future drops the timer,
//! so an abandoned call never shortens the next one. The `AsyncRead` and
//! `AsyncWrite` impls serve code that is generic over streams; there the
//! deadline is armed on the first poll of an operation and disarmed when it
//! completes, or when the next inherent call starts.
//!
//! ```
//! use relay_transport::TimedStream;
//! use std::time::Duration;
//! use tokio::io::AsyncReadExt;
//!
//! # #[tokio::main]
//! # async fn main() -> std::io::Result<()> {
//! let inner = tokio_test::io::Builder::new().read(b"pong").build();
//! let mut stream = TimedStream::new(inner, Duration::from_secs(5));
//!
//! let mut buf = [0u8; 4];
//! stream.read_exact(&mut buf).await?;
//! assert_eq!(&buf, b"pong");
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::time::{Instant, Sleep, sleep_until};
use tracing::debug;

use crate::Aborted;

/// One direction's deadline. The timer is allocated on first use and reset
/// on every re-arm.
#[derive(Debug, Default)]
struct Deadline {
    sleep: Option<Pin<Box<Sleep>>>,
    armed: bool,
}

impl Deadline {
    fn arm(&mut self, timeout: Duration) {
        if self.armed {
            return;
        }
        let at = Instant::now() + timeout;
        match &mut self.sleep {
            Some(sleep) => sleep.as_mut().reset(at),
            None => self.sleep = Some(Box::pin(sleep_until(at))),
        }
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    fn poll_elapsed(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        match &mut self.sleep {
            Some(sleep) if self.armed => sleep.as_mut().poll(cx),
            _ => Poll::Pending,
        }
    }
}

/// A stream whose individual operations fail after a fixed duration.
///
/// An operation that outlives the deadline completes with an
/// [`io::Error`] of kind [`TimedOut`](io::ErrorKind::TimedOut) carrying
/// [`Aborted::Deadline`]. If the inner operation and the deadline become
/// ready in the same poll, the inner result wins.
#[derive(Debug)]
pub struct TimedStream<S> {
    inner: S,
    timeout: Duration,
    read: Deadline,
    write: Deadline,
}

impl<S> TimedStream<S> {
    /// Wrap `inner`, bounding each operation by `timeout`.
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            read: Deadline::default(),
            write: Deadline::default(),
        }
    }

    /// The per-operation timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get a reference to the wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the wrapped stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwrap, returning the inner stream.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn is_enabled(&self) -> bool {
        !self.timeout.is_zero()
    }
}

impl<S: AsyncRead + Unpin> TimedStream<S> {
    /// Read into `buf`, failing if nothing arrives within the timeout.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read.disarm();
        bounded(self.timeout, self.inner.read(buf)).await
    }

    /// Fill `buf` completely. The whole call shares one deadline.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read.disarm();
        bounded(self.timeout, self.inner.read_exact(buf)).await
    }
}

impl<S: AsyncWrite + Unpin> TimedStream<S> {
    /// Write some of `buf`, failing if the stream does not accept it in time.
    pub async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write.disarm();
        bounded(self.timeout, self.inner.write(buf)).await
    }

    /// Write all of `buf`. The whole call shares one deadline.
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.write.disarm();
        bounded(self.timeout, self.inner.write_all(buf)).await
    }

    /// Flush buffered output.
    pub async fn flush(&mut self) -> io::Result<()> {
        self.write.disarm();
        bounded(self.timeout, self.inner.flush()).await
    }

    /// Shut down the write side.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.write.disarm();
        bounded(self.timeout, self.inner.shutdown()).await
    }
}

/// Run one operation with its own timer. The timer lives and dies with the
/// returned future.
async fn bounded<T>(
    timeout: Duration,
    op: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    if timeout.is_zero() {
        return op.await;
    }
    match tokio::time::timeout(timeout, op).await {
        Ok(result) => result,
        Err(_) => {
            debug!(timeout_ms = timeout.as_millis() as u64, "Stream operation timed out");
            Err(Aborted::Deadline(timeout).into())
        }
    }
}

/// Drive one operation against its deadline.
fn poll_timed<T>(
    deadline: &mut Deadline,
    timeout: Duration,
    cx: &mut Context<'_>,
    op: impl FnOnce(&mut Context<'_>) -> Poll<io::Result<T>>,
) -> Poll<io::Result<T>> {
    deadline.arm(timeout);

    if let Poll::Ready(result) = op(cx) {
        deadline.disarm();
        return Poll::Ready(result);
    }

    ready!(deadline.poll_elapsed(cx));
    deadline.disarm();
    debug!(timeout_ms = timeout.as_millis() as u64, "Stream operation timed out");
    Poll::Ready(Err(Aborted::Deadline(timeout).into()))
}

impl<S: AsyncRead + Unpin> AsyncRead for TimedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.is_enabled() {
            return Pin::new(&mut this.inner).poll_read(cx, buf);
        }

        let inner = &mut this.inner;
        poll_timed(&mut this.read, this.timeout, cx, |cx| {
            Pin::new(inner).poll_read(cx, buf)
        })
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TimedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if !this.is_enabled() {
            return Pin::new(&mut this.inner).poll_write(cx, buf);
        }

        let inner = &mut this.inner;
        poll_timed(&mut this.write, this.timeout, cx, |cx| {
            Pin::new(inner).poll_write(cx, buf)
        })
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.is_enabled() {
            return Pin::new(&mut this.inner).poll_flush(cx);
        }

        let inner = &mut this.inner;
        poll_timed(&mut this.write, this.timeout, cx, |cx| {
            Pin::new(inner).poll_flush(cx)
        })
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.is_enabled() {
            return Pin::new(&mut this.inner).poll_shutdown(cx);
        }

        let inner = &mut this.inner;
        poll_timed(&mut this.write, this.timeout, cx, |cx| {
            Pin::new(inner).poll_shutdown(cx)
        })
    }
}
