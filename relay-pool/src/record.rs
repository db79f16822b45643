//! Per-connection state shared between the pool and its handles.

use bytes::BytesMut;
use futures::task::AtomicWaker;
use parking_lot::{Mutex, MutexGuard};
use slab::Slab;
use std::collections::VecDeque;
use std::sync::Arc;

/// The transport of one connection, reachable from both its handle and the
/// pool.
///
/// The stream is taken out exactly once: by the handle when the connection
/// is discarded, or by `ConnectionPool::close()` when it revokes the handle.
/// Whoever takes it owns shutting it down. An empty slot means closed.
#[derive(Debug)]
pub(crate) struct Transport<S> {
    pub(crate) id: u64,
    stream: Mutex<Option<S>>,
    read_waker: AtomicWaker,
    write_waker: AtomicWaker,
}

impl<S> Transport<S> {
    pub(crate) fn new(id: u64, stream: S) -> Self {
        Self {
            id,
            stream: Mutex::new(Some(stream)),
            read_waker: AtomicWaker::new(),
            write_waker: AtomicWaker::new(),
        }
    }

    /// Lock the stream for one poll. Never held across an await.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Option<S>> {
        self.stream.lock()
    }

    /// Take the stream for disposal. Returns `None` if it is already gone.
    pub(crate) fn take(&self) -> Option<S> {
        self.stream.lock().take()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.stream.lock().is_none()
    }

    /// Take the stream and wake any I/O pending on its handle.
    pub(crate) fn revoke(&self) -> Option<S> {
        let stream = self.take();
        if stream.is_some() {
            self.read_waker.wake();
            self.write_waker.wake();
        }
        stream
    }

    pub(crate) fn read_waker(&self) -> &AtomicWaker {
        &self.read_waker
    }

    pub(crate) fn write_waker(&self) -> &AtomicWaker {
        &self.write_waker
    }
}

/// A pooled transport with its read buffer.
#[derive(Debug)]
pub(crate) struct ConnectionRecord<S> {
    pub(crate) transport: Arc<Transport<S>>,
    pub(crate) buffer: BytesMut,
}

impl<S> ConnectionRecord<S> {
    pub(crate) fn new(id: u64, stream: S) -> Self {
        Self {
            transport: Arc::new(Transport::new(id, stream)),
            buffer: BytesMut::new(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.transport.id
    }
}

/// A slot in the pool arena.
///
/// Idle records are owned by the pool. Outstanding records are owned by their
/// handle; the pool keeps the shared transport so `close()` can reach it.
#[derive(Debug)]
pub(crate) enum Slot<S> {
    Idle(ConnectionRecord<S>),
    Outstanding(Arc<Transport<S>>),
}

/// Arena plus the idle and outstanding orderings.
#[derive(Debug)]
pub(crate) struct Slots<S> {
    pub(crate) entries: Slab<Slot<S>>,
    /// Idle keys, least recently returned first.
    pub(crate) idle: VecDeque<usize>,
    /// Outstanding keys, in checkout order.
    pub(crate) outstanding: VecDeque<usize>,
    pub(crate) closed: bool,
}

impl<S> Default for Slots<S> {
    fn default() -> Self {
        Self {
            entries: Slab::new(),
            idle: VecDeque::new(),
            outstanding: VecDeque::new(),
            closed: false,
        }
    }
}

impl<S> Slots<S> {
    /// Register a checked-out connection.
    pub(crate) fn insert_outstanding(&mut self, transport: Arc<Transport<S>>) -> usize {
        let key = self.entries.insert(Slot::Outstanding(transport));
        self.outstanding.push_back(key);
        key
    }

    /// Pop the least recently returned idle record.
    pub(crate) fn pop_idle(&mut self) -> Option<ConnectionRecord<S>> {
        let key = self.idle.pop_front()?;
        match self.entries.try_remove(key) {
            Some(Slot::Idle(record)) => Some(record),
            _ => unreachable!("idle list referenced a non-idle slot"),
        }
    }

    /// Pop the oldest outstanding connection's transport.
    pub(crate) fn pop_outstanding(&mut self) -> Option<Arc<Transport<S>>> {
        let key = self.outstanding.pop_front()?;
        match self.entries.try_remove(key) {
            Some(Slot::Outstanding(transport)) => Some(transport),
            _ => unreachable!("outstanding list referenced a non-outstanding slot"),
        }
    }

    /// Check whether `key` is the outstanding slot for `transport`.
    fn owns(&self, key: usize, transport: &Arc<Transport<S>>) -> bool {
        matches!(
            self.entries.get(key),
            Some(Slot::Outstanding(current)) if Arc::ptr_eq(current, transport)
        )
    }

    fn unlink_outstanding(&mut self, key: usize) {
        if let Some(pos) = self.outstanding.iter().position(|&k| k == key) {
            self.outstanding.remove(pos);
        }
    }

    /// Move an outstanding record back to the idle list, keeping its key.
    ///
    /// Returns the record if it no longer belongs to this slot.
    pub(crate) fn checkin(
        &mut self,
        key: usize,
        record: ConnectionRecord<S>,
    ) -> Option<ConnectionRecord<S>> {
        if !self.owns(key, &record.transport) {
            return Some(record);
        }
        self.unlink_outstanding(key);
        self.entries[key] = Slot::Idle(record);
        self.idle.push_back(key);
        None
    }

    /// Forget an outstanding connection. Returns `false` if the slot was
    /// already released.
    pub(crate) fn remove_outstanding(&mut self, key: usize, transport: &Arc<Transport<S>>) -> bool {
        if !self.owns(key, transport) {
            return false;
        }
        self.unlink_outstanding(key);
        self.entries.remove(key);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_is_taken_once() {
        let transport = Transport::new(1, "stream");
        assert!(!transport.is_closed());
        assert_eq!(transport.revoke(), Some("stream"));
        assert_eq!(transport.take(), None);
        assert_eq!(transport.revoke(), None);
        assert!(transport.is_closed());
    }

    #[test]
    fn test_checkin_and_pop_idle_fifo() {
        let mut slots = Slots::default();
        let first = ConnectionRecord::new(1, ());
        let second = ConnectionRecord::new(2, ());

        let k1 = slots.insert_outstanding(Arc::clone(&first.transport));
        let k2 = slots.insert_outstanding(Arc::clone(&second.transport));
        assert_eq!(slots.outstanding.len(), 2);

        assert!(slots.checkin(k2, second).is_none());
        assert!(slots.checkin(k1, first).is_none());
        assert!(slots.outstanding.is_empty());

        assert_eq!(slots.pop_idle().map(|r| r.id()), Some(2));
        assert_eq!(slots.pop_idle().map(|r| r.id()), Some(1));
        assert!(slots.pop_idle().is_none());
        assert!(slots.entries.is_empty());
    }

    #[test]
    fn test_pop_outstanding_in_checkout_order() {
        let mut slots = Slots::default();
        let first = ConnectionRecord::new(1, ());
        let second = ConnectionRecord::new(2, ());
        slots.insert_outstanding(Arc::clone(&first.transport));
        slots.insert_outstanding(Arc::clone(&second.transport));

        assert_eq!(slots.pop_outstanding().map(|t| t.id), Some(1));
        assert_eq!(slots.pop_outstanding().map(|t| t.id), Some(2));
        assert!(slots.pop_outstanding().is_none());
        assert!(slots.entries.is_empty());
    }

    #[test]
    fn test_stale_key_is_rejected() {
        let mut slots = Slots::default();
        let record = ConnectionRecord::new(1, ());
        let stranger = ConnectionRecord::new(2, ());

        let key = slots.insert_outstanding(Arc::clone(&record.transport));
        assert!(!slots.remove_outstanding(key, &stranger.transport));
        assert!(slots.checkin(key, stranger).is_some());

        assert!(slots.remove_outstanding(key, &record.transport));
        assert!(!slots.remove_outstanding(key, &record.transport));
        assert!(slots.entries.is_empty());
    }
}
