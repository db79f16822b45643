//! Checked-out connection handles.

use bytes::BytesMut;
use relay_transport::{TimedStream, TransportFactory};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::pool::Shared;
use crate::record::ConnectionRecord;

/// A connection checked out of a [`ConnectionPool`](crate::ConnectionPool).
///
/// Reads and writes go straight to the transport. Hand the connection back
/// with [`ConnectionPool::put`](crate::ConnectionPool::put); dropping it
/// instead shuts the transport down.
///
/// Closing the pool revokes the handle: the pool shuts the transport down
/// and every read or write fails with [`io::ErrorKind::NotConnected`].
pub struct PooledConnection<F: TransportFactory> {
    key: usize,
    record: Option<ConnectionRecord<F::Stream>>,
    pool: Weak<Shared<F>>,
    io_timeout: Duration,
}

impl<F: TransportFactory> PooledConnection<F> {
    pub(crate) fn new(
        key: usize,
        record: ConnectionRecord<F::Stream>,
        pool: Weak<Shared<F>>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            key,
            record: Some(record),
            pool,
            io_timeout,
        }
    }

    pub(crate) fn key(&self) -> usize {
        self.key
    }

    pub(crate) fn belongs_to(&self, shared: &Arc<Shared<F>>) -> bool {
        std::ptr::eq(self.pool.as_ptr(), Arc::as_ptr(shared))
    }

    /// Take the record out so `Drop` leaves it alone.
    pub(crate) fn release(&mut self) -> Option<ConnectionRecord<F::Stream>> {
        self.record.take()
    }

    fn record(&self) -> &ConnectionRecord<F::Stream> {
        self.record
            .as_ref()
            .expect("pooled connection used after release")
    }

    fn record_mut(&mut self) -> &mut ConnectionRecord<F::Stream> {
        self.record
            .as_mut()
            .expect("pooled connection used after release")
    }

    /// Pool-unique connection id. Stays the same across reuse.
    pub fn id(&self) -> u64 {
        self.record().id()
    }

    /// Run `f` against the transport stream, for socket addresses and the
    /// like. Returns `None` once the pool has revoked the connection.
    pub fn with_stream<R>(&self, f: impl FnOnce(&F::Stream) -> R) -> Option<R> {
        self.record().transport.lock().as_ref().map(f)
    }

    /// Bytes read ahead by a previous user of this connection.
    pub fn buffer(&self) -> &BytesMut {
        &self.record().buffer
    }

    /// Mutable access to the read-ahead buffer. Kept across reuse.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.record_mut().buffer
    }

    /// Check if the pool was closed while this connection was checked out.
    pub fn is_revoked(&self) -> bool {
        self.record
            .as_ref()
            .is_none_or(|record| record.transport.is_closed())
    }

    /// Borrow the connection with the pool's per-operation I/O timeout.
    pub fn timed(&mut self) -> TimedStream<&mut Self> {
        let timeout = self.io_timeout;
        TimedStream::new(self, timeout)
    }

    /// Borrow the connection with an explicit per-operation I/O timeout.
    pub fn with_timeout(&mut self, timeout: Duration) -> TimedStream<&mut Self> {
        TimedStream::new(self, timeout)
    }

    /// Poll `op` on the live stream, registering for revocation wakeups.
    /// Returns `None` if the pool took the stream away.
    fn poll_stream<T>(
        &self,
        cx: &mut Context<'_>,
        write: bool,
        op: impl FnOnce(Pin<&mut F::Stream>, &mut Context<'_>) -> Poll<io::Result<T>>,
    ) -> Option<Poll<io::Result<T>>> {
        let transport = &self.record.as_ref()?.transport;
        let mut guard = transport.lock();
        let stream = guard.as_mut()?;

        let waker = if write {
            transport.write_waker()
        } else {
            transport.read_waker()
        };
        waker.register(cx.waker());

        Some(op(Pin::new(stream), cx))
    }
}

fn revoked_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection pool closed")
}

impl<F: TransportFactory> AsyncRead for PooledConnection<F> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.poll_stream(cx, false, |stream, cx| stream.poll_read(cx, buf))
            .unwrap_or_else(|| Poll::Ready(Err(revoked_error())))
    }
}

impl<F: TransportFactory> AsyncWrite for PooledConnection<F> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.poll_stream(cx, true, |stream, cx| stream.poll_write(cx, buf))
            .unwrap_or_else(|| Poll::Ready(Err(revoked_error())))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_stream(cx, true, |stream, cx| stream.poll_flush(cx))
            .unwrap_or_else(|| Poll::Ready(Err(revoked_error())))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Already shut down by the pool.
        self.poll_stream(cx, true, |stream, cx| stream.poll_shutdown(cx))
            .unwrap_or(Poll::Ready(Ok(())))
    }
}

impl<F: TransportFactory> fmt::Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.record.as_ref().map(|r| r.id()))
            .field("revoked", &self.is_revoked())
            .field("io_timeout", &self.io_timeout)
            .finish()
    }
}

impl<F: TransportFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        let Some(record) = self.record.take() else {
            return;
        };
        match self.pool.upgrade() {
            Some(shared) => shared.discard(self.key, &record.transport),
            // The pool is gone; dropping the stream closes the socket.
            None => drop(record),
        }
    }
}
