//! Per-cycle render snapshots and the bounded buffer between the
//! scheduler and the renderer
//!
//! The scheduler reserves a slot with [`DoubleBuffer::publish`] when it
//! dispatches a cycle, so the slot counts against the capacity while the
//! cycle is still computing. [`PendingSnapshot::seal`] fills the slot once
//! integration is done. Consumers only ever see sealed snapshots, strictly
//! in publication order: an unsealed head blocks everything behind it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use serde::Serialize;

use super::body::{BodyId, BodyState, Color};

/// What the renderer needs to know about one body for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderRecord {
    pub id: BodyId,
    pub exists: bool, // false: retire this id from the scene
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub radius: f64,
    pub light_source: bool,
    pub color: Color,
}

impl RenderRecord {
    pub fn from_state(id: BodyId, state: &BodyState) -> Self {
        Self {
            id,
            exists: state.exists,
            x: state.position.x,
            y: state.position.y,
            z: state.position.z,
            radius: state.radius,
            light_source: state.light_source,
            color: state.color,
        }
    }
}

/// One computed cycle; never mutated after sealing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub cycle: u64,
    pub records: Vec<RenderRecord>,
}

#[derive(Debug)]
struct Slot {
    cycle: u64,
    sealed: OnceLock<Arc<Snapshot>>,
}

impl Slot {
    fn is_sealed(&self) -> bool {
        self.sealed.get().is_some()
    }
}

/// Bounded FIFO of snapshots awaiting consumption
#[derive(Debug)]
pub struct DoubleBuffer {
    queue: Mutex<VecDeque<Arc<Slot>>>,
    ready: Condvar,
    capacity: AtomicUsize,
    next_cycle: AtomicU64,
}

impl DoubleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            capacity: AtomicUsize::new(capacity.max(1)),
            next_cycle: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<Slot>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Takes effect immediately; a buffer shrunk below its current length
    /// just stays full until the consumer catches up
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity.max(1), Ordering::Release);
    }

    /// Queued snapshots, sealed and unsealed
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Reserve the next slot, or `None` when the buffer is at capacity
    pub fn publish(&self) -> Option<PendingSnapshot<'_>> {
        let mut queue = self.lock();
        if queue.len() >= self.capacity() {
            return None;
        }
        let slot = Arc::new(Slot {
            cycle: self.next_cycle.fetch_add(1, Ordering::Relaxed),
            sealed: OnceLock::new(),
        });
        queue.push_back(Arc::clone(&slot));
        Some(PendingSnapshot { buffer: self, slot })
    }

    fn pop_sealed(queue: &mut VecDeque<Arc<Slot>>) -> Option<Arc<Snapshot>> {
        let snapshot = queue.front()?.sealed.get().cloned()?;
        queue.pop_front();
        Some(snapshot)
    }

    /// Non-blocking: the head snapshot if it is sealed
    pub fn consume_next(&self) -> Option<Arc<Snapshot>> {
        Self::pop_sealed(&mut self.lock())
    }

    /// Block up to `timeout` for the head snapshot to be sealed
    pub fn wait_next(&self, timeout: Duration) -> Option<Arc<Snapshot>> {
        let queue = self.lock();
        let (mut queue, _) = self
            .ready
            .wait_timeout_while(queue, timeout, |q| !q.front().is_some_and(|s| s.is_sealed()))
            .unwrap_or_else(PoisonError::into_inner);
        Self::pop_sealed(&mut queue)
    }
}

/// A reserved, not yet sealed slot.
///
/// Dropping it without sealing withdraws the slot, so a cycle that fails
/// halfway cannot leave an unsealed head blocking the consumer forever
#[derive(Debug)]
pub struct PendingSnapshot<'a> {
    buffer: &'a DoubleBuffer,
    slot: Arc<Slot>,
}

impl PendingSnapshot<'_> {
    pub fn cycle(&self) -> u64 {
        self.slot.cycle
    }

    /// Freeze the records and make the snapshot visible to consumers
    pub fn seal(self, records: Vec<RenderRecord>) -> Arc<Snapshot> {
        let snapshot = Arc::new(Snapshot {
            cycle: self.slot.cycle,
            records,
        });
        let _queue = self.buffer.lock();
        let _ = self.slot.sealed.set(Arc::clone(&snapshot));
        self.buffer.ready.notify_all();
        snapshot
    }
}

impl Drop for PendingSnapshot<'_> {
    fn drop(&mut self) {
        if self.slot.is_sealed() {
            return;
        }
        let mut queue = self.buffer.lock();
        queue.retain(|s| !Arc::ptr_eq(s, &self.slot));
        self.buffer.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsealed_head_blocks_consumption() {
        let buf = DoubleBuffer::new(3);
        let first = buf.publish().unwrap();
        let second = buf.publish().unwrap();
        second.seal(Vec::new());
        assert!(buf.consume_next().is_none());
        let sealed = first.seal(Vec::new());
        assert_eq!(buf.consume_next().unwrap().cycle, sealed.cycle);
        assert!(buf.consume_next().is_some());
        assert!(buf.is_empty());
    }

    #[test]
    fn publish_respects_capacity() {
        let buf = DoubleBuffer::new(2);
        let a = buf.publish().unwrap();
        let _b = buf.publish().unwrap();
        assert!(buf.is_full());
        assert!(buf.publish().is_none());
        a.seal(Vec::new());
        buf.consume_next().unwrap();
        assert!(!buf.is_full());
    }

    #[test]
    fn dropped_pending_slot_is_withdrawn() {
        let buf = DoubleBuffer::new(2);
        let a = buf.publish().unwrap();
        let b = buf.publish().unwrap();
        drop(a);
        assert_eq!(buf.len(), 1);
        b.seal(Vec::new());
        assert!(buf.consume_next().is_some());
    }

    #[test]
    fn wait_next_times_out_on_empty_buffer() {
        let buf = DoubleBuffer::new(1);
        assert!(buf.wait_next(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn wait_next_wakes_on_seal() {
        let buf = Arc::new(DoubleBuffer::new(1));
        let producer = {
            let buf = Arc::clone(&buf);
            std::thread::spawn(move || {
                let pending = buf.publish().unwrap();
                std::thread::sleep(Duration::from_millis(20));
                pending.seal(Vec::new());
            })
        };
        let got = buf.wait_next(Duration::from_secs(5));
        producer.join().unwrap();
        assert!(got.is_some());
    }

    #[test]
    fn shrinking_capacity_keeps_queued_snapshots() {
        let buf = DoubleBuffer::new(3);
        buf.publish().unwrap().seal(Vec::new());
        buf.publish().unwrap().seal(Vec::new());
        buf.set_capacity(1);
        assert!(buf.is_full());
        assert_eq!(buf.len(), 2);
        buf.set_capacity(0);
        assert_eq!(buf.capacity(), 1);
    }
}
