//! Lock-free bounded FIFO ring queue.
//!
//! Two ring buffers of [`RefPtr`] slots share one flat payload arena of
//! `num_elements + 1` cells: `public_ring` holds indices of filled cells in
//! FIFO order, `recycle_ring` holds indices of free cells. One cell is
//! always held back as a separator so "full" and "empty" remain
//! distinguishable from cursor equality alone.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::Ordering;

use crate::backoff::{Backoff, SpinClass};
use crate::error::InitError;
use crate::invariants::debug_assert_ring_conservation;
use crate::metrics::{BoundedMetrics, BoundedMetricsSnapshot};
use crate::primitives::{thread_tag, CacheAligned, RefPtr, NIL};

struct Ring {
    // `first_in` (consumer-of-this-ring's cursor) and `last_in`
    // (producer-of-this-ring's cursor) are contended by disjoint sets of
    // threads; padding them apart keeps one cursor's busy-wait traffic from
    // bouncing the other's cache line.
    first_in: CacheAligned<RefPtr>,
    last_in: CacheAligned<RefPtr>,
    slots: Box<[RefPtr]>,
    capacity: u32,
}

impl Ring {
    fn new(capacity: u32, start_first: u32, start_last: u32, slot_init: impl Fn(u32) -> u32) -> Self {
        let slots = (0..capacity)
            .map(|i| RefPtr::new(slot_init(i), 0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            first_in: CacheAligned::new(RefPtr::new(start_first, 0)),
            last_in: CacheAligned::new(RefPtr::new(start_last, 0)),
            slots,
            capacity,
        }
    }

    fn advance(&self, pos: u32) -> u32 {
        let next = pos + 1;
        if next >= self.capacity {
            0
        } else {
            next
        }
    }

    fn len(&self) -> usize {
        let (first, _) = self.first_in.load(Ordering::Acquire);
        let (last, _) = self.last_in.load(Ordering::Acquire);
        if last >= first {
            (last - first) as usize
        } else {
            (self.capacity - first + last) as usize
        }
    }
}

/// A lock-free bounded FIFO queue of `T`.
pub struct BoundedRingQueue<T> {
    payload: Box<[UnsafeCell<MaybeUninit<T>>]>,
    public_ring: Ring,
    recycle_ring: Ring,
    num_elements: usize,
    metrics: BoundedMetrics,
}

unsafe impl<T: Send> Send for BoundedRingQueue<T> {}
unsafe impl<T: Send> Sync for BoundedRingQueue<T> {}

impl<T> BoundedRingQueue<T> {
    /// Allocates a queue with room for exactly `num_elements` items.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::InvalidInitialization`] if `num_elements == 0`
    /// or `T` is zero-sized.
    pub fn new(num_elements: usize) -> Result<Self, InitError> {
        if num_elements == 0 || std::mem::size_of::<T>() == 0 {
            return Err(InitError::InvalidInitialization);
        }
        let slot_count = (num_elements + 1) as u32;

        let payload = (0..=num_elements)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let public_ring = Ring::new(slot_count, 0, 0, |_| NIL);
        // the recycle ring starts "full": first_in = 0, last_in =
        // num_elements. Every ring buffer here carries num_elements + 1
        // slots but only ever circulates num_elements of them — slot
        // `num_elements` is the permanent separator, never reachable by
        // first_in on this initial lap — which is what makes first_in ==
        // last_in an unambiguous "empty" signal instead of colliding with
        // "full". Seeding last_in at slot_count (one past the last valid
        // index) would both read out of bounds on the first recycle and
        // let the ring hand out num_elements + 1 cells instead of
        // num_elements.
        let recycle_ring = Ring::new(slot_count, 0, num_elements as u32, |i| i);

        Ok(Self {
            payload,
            public_ring,
            recycle_ring,
            num_elements,
            metrics: BoundedMetrics::default(),
        })
    }

    /// Enqueues `value`. Returns `false` if the queue is full.
    #[must_use]
    pub fn enqueue(&self, value: T) -> bool {
        let Some(cell) = self.remove_link(&self.recycle_ring) else {
            self.metrics.record_rejected_full();
            return false;
        };
        unsafe {
            (*self.payload[cell as usize].get()).write(value);
        }
        self.insert_link(cell, &self.public_ring);
        self.metrics.record_insert();
        true
    }

    /// Dequeues the oldest enqueued value, or `None` if empty.
    #[must_use]
    pub fn dequeue(&self) -> Option<T> {
        let Some(cell) = self.remove_link(&self.public_ring) else {
            self.metrics.record_rejected_empty();
            return None;
        };
        let value = unsafe { (*self.payload[cell as usize].get()).assume_init_read() };
        self.insert_link(cell, &self.recycle_ring);
        self.metrics.record_remove();
        Some(value)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        let (first, _) = self.public_ring.first_in.load(Ordering::Acquire);
        let (last, _) = self.public_ring.last_in.load(Ordering::Acquire);
        first == last
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        let (first, _) = self.recycle_ring.first_in.load(Ordering::Acquire);
        let (last, _) = self.recycle_ring.last_in.load(Ordering::Acquire);
        first == last
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.num_elements
    }

    #[must_use]
    pub fn metrics(&self) -> BoundedMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Publishes `cell` at the tail of `ring`. Since the cursor's
    /// micro-lock already serializes every writer of `slots[cur]`, there is
    /// no separate "mark the slot busy" step — the packed `{data, ref}`
    /// word already publishes atomically in one step.
    fn insert_link(&self, cell: u32, ring: &Ring) {
        let tag = thread_tag();
        let mut backoff = Backoff::calibrated(SpinClass::RingQueue);
        loop {
            let (_, refv) = ring.last_in.load(Ordering::Acquire);
            if refv == 0 && ring.last_in.cas_ref(0, tag).is_ok() {
                break;
            }
            backoff.snooze();
        }

        let (cur, _) = ring.last_in.load(Ordering::Acquire);
        ring.slots[cur as usize].store_data(cell);
        let next = ring.advance(cur);
        loop {
            match ring.last_in.cas64((cur, tag), (next, 0)) {
                Ok(()) => return,
                Err(_) => continue,
            }
        }
    }

    /// Removes and returns the cell index at the head of `ring`, or `None`
    /// if `ring` is empty.
    fn remove_link(&self, ring: &Ring) -> Option<u32> {
        let tag = thread_tag();
        let mut backoff = Backoff::calibrated(SpinClass::RingQueue);
        loop {
            let (_, refv) = ring.first_in.load(Ordering::Acquire);
            if refv == 0 && ring.first_in.cas_ref(0, tag).is_ok() {
                break;
            }
            backoff.snooze();
        }

        loop {
            let (cur, _) = ring.first_in.load(Ordering::Acquire);
            let (last, _) = ring.last_in.load(Ordering::Acquire);
            if cur == last {
                if ring.first_in.cas64((cur, tag), (cur, 0)).is_ok() {
                    return None;
                }
                continue;
            }
            let cell = ring.slots[cur as usize].load(Ordering::Acquire).0;
            let next = ring.advance(cur);
            match ring.first_in.cas64((cur, tag), (next, 0)) {
                Ok(()) => return Some(cell),
                Err(_) => continue,
            }
        }
    }

    #[cfg(debug_assertions)]
    fn assert_conservation(&self) {
        debug_assert_ring_conservation!(
            self.public_ring.len(),
            self.recycle_ring.len(),
            self.num_elements
        );
    }
}

impl<T> Drop for BoundedRingQueue<T> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.assert_conservation();

        let (mut cur, _) = self.public_ring.first_in.load(Ordering::Acquire);
        let (last, _) = self.public_ring.last_in.load(Ordering::Acquire);
        while cur != last {
            let cell = self.public_ring.slots[cur as usize].load(Ordering::Acquire).0;
            unsafe {
                (*self.payload[cell as usize].get()).assume_init_drop();
            }
            cur = self.public_ring.advance(cur);
        }
    }
}
