//! Stream doubles for exercising timeouts and error paths.
//!
//! Available in this crate's own tests and, with the `test-util` feature,
//! to downstream test suites.

use futures::task::AtomicWaker;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::Aborted;

#[derive(Debug, Default)]
struct NullState {
    cancelled: AtomicBool,
    waker: AtomicWaker,
}

/// A stream whose reads and writes never complete on their own.
///
/// The pending operation fails with [`Aborted::Cancelled`] once
/// [`NullCancel::cancel`] is called.
#[derive(Debug, Default)]
pub struct NullStream {
    state: Arc<NullState>,
}

/// Cancels the operation pending on a [`NullStream`].
#[derive(Debug, Clone)]
pub struct NullCancel {
    state: Arc<NullState>,
}

impl NullStream {
    /// Create a new idle stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a handle that aborts the pending operation.
    pub fn cancel_handle(&self) -> NullCancel {
        NullCancel {
            state: Arc::clone(&self.state),
        }
    }

    fn poll_op<T>(&self, cx: &mut Context<'_>) -> Poll<io::Result<T>> {
        self.state.waker.register(cx.waker());
        if self.state.cancelled.swap(false, Ordering::AcqRel) {
            Poll::Ready(Err(Aborted::Cancelled.into()))
        } else {
            Poll::Pending
        }
    }
}

impl NullCancel {
    /// Abort the current (or next) operation on the stream.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.waker.wake();
    }
}

impl AsyncRead for NullStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.poll_op(cx)
    }
}

impl AsyncWrite for NullStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.poll_op(cx)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_op(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_op(cx)
    }
}

/// A stream whose every operation fails immediately with the same error kind.
#[derive(Debug, Clone, Copy)]
pub struct ErrorStream {
    kind: io::ErrorKind,
}

impl ErrorStream {
    /// Create a stream failing with `kind`.
    pub fn new(kind: io::ErrorKind) -> Self {
        Self { kind }
    }

    /// The error kind every operation reports.
    pub fn kind(&self) -> io::ErrorKind {
        self.kind
    }
}

impl AsyncRead for ErrorStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(self.kind.into()))
    }
}

impl AsyncWrite for ErrorStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(self.kind.into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(self.kind.into()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(self.kind.into()))
    }
}
