//! The connection pool.

use parking_lot::Mutex;
use relay_transport::{TcpConnector, TransportError, TransportFactory};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::handle::PooledConnection;
use crate::record::{ConnectionRecord, Slots, Transport};
use crate::stats::{Counters, PoolStats};
use crate::{PoolConfig, PoolError, Result};

/// A pool of plain TCP connections.
pub type TcpPool = ConnectionPool<TcpConnector>;

/// A pool of TLS connections.
#[cfg(feature = "tls")]
pub type TlsPool = ConnectionPool<relay_transport::TlsConnector>;

/// How a connection is handed back with [`ConnectionPool::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The exchange completed cleanly; the connection may be reused.
    Reusable,
    /// The exchange failed; the connection is shut down.
    Broken,
}

impl Verdict {
    /// Check if the connection goes back to the idle list.
    pub fn is_reusable(&self) -> bool {
        matches!(self, Self::Reusable)
    }
}

impl<T, E> From<&std::result::Result<T, E>> for Verdict {
    fn from(result: &std::result::Result<T, E>) -> Self {
        if result.is_ok() {
            Self::Reusable
        } else {
            Self::Broken
        }
    }
}

/// State shared by the pool and every handle it issued.
pub(crate) struct Shared<F: TransportFactory> {
    pub(crate) config: PoolConfig,
    pub(crate) factory: F,
    pub(crate) slots: Mutex<Slots<F::Stream>>,
    pub(crate) counters: Counters,
    next_id: AtomicU64,
}

impl<F: TransportFactory> Shared<F> {
    /// Shut a stream down on the current runtime without waiting for it.
    ///
    /// Without a runtime the stream is dropped, which closes the socket.
    pub(crate) fn dispose(self: &Arc<Self>, id: u64, mut stream: F::Stream) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let shared = Arc::clone(self);
                runtime.spawn(async move {
                    if let Err(e) = shared.factory.shutdown(&mut stream).await {
                        debug!(id, error = %e, "Background shutdown failed");
                    }
                });
            }
            Err(_) => drop(stream),
        }
    }

    /// Forget a handle that was dropped without being returned, then shut its
    /// transport down in the background.
    pub(crate) fn discard(self: &Arc<Self>, key: usize, transport: &Arc<Transport<F::Stream>>) {
        let stream = {
            let mut slots = self.slots.lock();
            // Revoked by close(), which shuts the stream down itself.
            if !slots.remove_outstanding(key, transport) {
                return;
            }
            transport.take()
        };
        let Some(stream) = stream else {
            return;
        };

        self.counters.record_discarded();
        debug!(id = transport.id, "Discarding dropped connection");
        self.dispose(transport.id, stream);
    }
}

/// A pool of connections to one host and port.
///
/// Connections are checked out with [`get`](Self::get) and returned with
/// [`put`](Self::put). A handle that is dropped instead of returned is
/// treated as broken and shut down.
///
/// The pool must be [`close`](Self::close)d, or every handle returned,
/// before it is dropped: dropping a pool with connections still checked
/// out panics.
pub struct ConnectionPool<F: TransportFactory> {
    shared: Arc<Shared<F>>,
}

impl<F: TransportFactory> ConnectionPool<F> {
    /// Create an empty pool. No connections are made until `get()`.
    pub fn new(config: PoolConfig, factory: F) -> Self {
        info!(
            origin = %config.target(),
            max_size = config.max_size,
            "Creating connection pool"
        );

        Self {
            shared: Arc::new(Shared {
                config,
                factory,
                slots: Mutex::new(Slots::default()),
                counters: Counters::default(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Check out a connection.
    ///
    /// Idle connections are tried oldest-returned first; any that fail the
    /// liveness probe are evicted and shut down in the background. If none
    /// survive, a new connection is made through the factory, bounded by the
    /// configured connect timeout.
    ///
    /// # Panics
    ///
    /// Panics if the pool has been closed.
    pub async fn get(&self) -> Result<PooledConnection<F>> {
        if let Some(conn) = self.reuse_idle() {
            return Ok(conn);
        }

        let stream = self.connect().await?;
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let record = ConnectionRecord::new(id, stream);

        let inserted = {
            let mut slots = self.shared.slots.lock();
            (!slots.closed).then(|| {
                let key = slots.insert_outstanding(Arc::clone(&record.transport));
                (key, slots.outstanding.len())
            })
        };
        let Some((key, outstanding)) = inserted else {
            debug!(id, "Pool closed while connecting");
            if let Some(mut stream) = record.transport.take()
                && let Err(e) = self.shared.factory.shutdown(&mut stream).await
            {
                debug!(id, error = %e, "Shutdown of late connection failed");
            }
            return Err(PoolError::Closed);
        };
        self.shared.counters.record_created();

        if outstanding > self.shared.config.max_size {
            warn!(
                origin = %self.shared.config.target(),
                outstanding,
                max_size = self.shared.config.max_size,
                "Connection pool exceeded its configured size"
            );
        }
        debug!(id, outstanding, "Opened pooled connection");

        Ok(self.handle(key, record))
    }

    /// Check out the first idle connection that passes the probe. Dead ones
    /// met on the way are handed to background shutdown.
    fn reuse_idle(&self) -> Option<PooledConnection<F>> {
        let mut slots = self.shared.slots.lock();
        assert!(!slots.closed, "connection pool used after close");

        while let Some(record) = slots.pop_idle() {
            let alive = record.transport.lock().as_ref().map_or_else(
                || Err(io::ErrorKind::NotConnected.into()),
                |stream| self.shared.factory.probe(stream),
            );
            match alive {
                Ok(()) => {
                    let key = slots.insert_outstanding(Arc::clone(&record.transport));
                    drop(slots);
                    self.shared.counters.record_reused();
                    debug!(id = record.id(), "Reusing idle connection");
                    return Some(self.handle(key, record));
                }
                Err(e) => {
                    self.shared.counters.record_evicted();
                    debug!(id = record.id(), error = %e, "Evicting dead idle connection");
                    if let Some(stream) = record.transport.take() {
                        self.shared.dispose(record.id(), stream);
                    }
                }
            }
        }
        None
    }

    async fn connect(&self) -> Result<F::Stream> {
        let config = &self.shared.config;
        let connect = self.shared.factory.connect(&config.host, config.port);

        match config.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, connect).await {
                Ok(result) => Ok(result?),
                Err(_) => {
                    warn!(
                        origin = %config.target(),
                        timeout_ms = limit.as_millis() as u64,
                        "Connect timed out"
                    );
                    Err(PoolError::ConnectTimeout(limit))
                }
            },
            None => Ok(connect.await?),
        }
    }

    fn handle(&self, key: usize, record: ConnectionRecord<F::Stream>) -> PooledConnection<F> {
        PooledConnection::new(
            key,
            record,
            Arc::downgrade(&self.shared),
            self.shared.config.io_timeout,
        )
    }

    /// Return a checked-out connection.
    ///
    /// A [`Verdict::Reusable`] connection goes to the back of the idle list.
    /// A [`Verdict::Broken`] one is shut down; shutdown failures are logged,
    /// not returned. A connection revoked by [`close`](Self::close) was
    /// already shut down and is simply released.
    ///
    /// # Panics
    ///
    /// Panics if `conn` was issued by a different pool.
    pub async fn put(&self, mut conn: PooledConnection<F>, verdict: Verdict) {
        assert!(
            conn.belongs_to(&self.shared),
            "connection returned to a pool that did not issue it"
        );
        let key = conn.key();
        let Some(record) = conn.release() else {
            return;
        };
        let id = record.id();

        let stream = {
            let mut slots = self.shared.slots.lock();
            if verdict.is_reusable() {
                if slots.checkin(key, record).is_some() {
                    debug!(id, "Releasing revoked connection");
                }
                return;
            }
            if !slots.remove_outstanding(key, &record.transport) {
                debug!(id, "Releasing revoked connection");
                return;
            }
            record.transport.take()
        };
        let Some(mut stream) = stream else {
            return;
        };

        self.shared.counters.record_discarded();
        debug!(id, "Shutting down broken connection");
        if let Err(e) = self.shared.factory.shutdown(&mut stream).await {
            debug!(id, error = %e, "Shutdown of broken connection failed");
        }
    }

    /// Close the pool.
    ///
    /// Every checked-out connection is revoked and shut down: its pending
    /// and future I/O fails with `NotConnected`. Then every idle connection
    /// is shut down. Failures do not stop the drain; they are reported
    /// together once it finishes. Calling `close()` again does nothing.
    pub async fn close(&self) -> Result<()> {
        let (revoked, idle) = {
            let mut slots = self.shared.slots.lock();
            slots.closed = true;

            let mut revoked = Vec::with_capacity(slots.outstanding.len());
            while let Some(transport) = slots.pop_outstanding() {
                if let Some(stream) = transport.revoke() {
                    revoked.push((transport.id, stream));
                }
            }

            let mut idle = Vec::with_capacity(slots.idle.len());
            while let Some(record) = slots.pop_idle() {
                if let Some(stream) = record.transport.take() {
                    idle.push((record.id(), stream));
                }
            }
            (revoked, idle)
        };

        if revoked.is_empty() && idle.is_empty() {
            return Ok(());
        }
        info!(
            origin = %self.shared.config.target(),
            revoked = revoked.len(),
            idle = idle.len(),
            "Closing connection pool"
        );

        let mut failures = 0usize;
        let mut last: Option<TransportError> = None;
        for (id, mut stream) in revoked.into_iter().chain(idle) {
            if let Err(e) = self.shared.factory.shutdown(&mut stream).await {
                warn!(id, error = %e, "Failed to shut down connection");
                failures += 1;
                last = Some(e);
            }
        }

        match last {
            Some(last) => Err(PoolError::Shutdown { failures, last }),
            None => Ok(()),
        }
    }

    /// Snapshot the pool counters.
    pub fn stats(&self) -> PoolStats {
        let (idle, outstanding) = {
            let slots = self.shared.slots.lock();
            (slots.idle.len(), slots.outstanding.len())
        };
        PoolStats::new(idle, outstanding, &self.shared.counters)
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Get the transport factory.
    pub fn factory(&self) -> &F {
        &self.shared.factory
    }

    /// Abort every connect currently in flight for this pool.
    ///
    /// Waiting `get()` calls fail with a cancelled transport error.
    pub fn cancel_connects(&self) {
        self.shared.factory.cancel();
    }

    /// Check if `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.slots.lock().closed
    }
}

impl<F: TransportFactory> fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<F: TransportFactory> Drop for ConnectionPool<F> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let outstanding = self.shared.slots.lock().outstanding.len();
        assert!(
            outstanding == 0,
            "connection pool dropped with {} outstanding connection(s)",
            outstanding
        );
    }
}
