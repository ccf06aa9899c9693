//! Lock-free unbounded FIFO queue, built from a linked list of fixed-size
//! blocks.
//!
//! Each slot carries a [`Tag`] driving a small state machine (`Free` →
//! `Allocating` → `Allocated` → `Removing` → `Removed`, with `EndOfList` →
//! `Extending` → `BlockPointer` → `Destroying` governing the transition
//! across block boundaries). Tag transitions are CAS-driven; a
//! reader/writer epoch counter (`remove_count`) gates when a block may
//! actually be freed, guaranteeing no in-flight reader still references
//! its interior.
//!
//! `head`/`tail`/`cached_block` are raw pointers rather than arena indices:
//! the queue is a genuinely cyclic/linked structure, and every raw-pointer
//! dereference here is guarded by the reader/writer epoch mechanism
//! above.

use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicPtr, AtomicU32, Ordering};

use crate::backoff::{Backoff, SpinClass};
use crate::error::EmptyQueueError;
use crate::invariants::{debug_assert_epoch_range, debug_assert_transition_ok};
use crate::metrics::{BlockQueueMetrics, BlockQueueMetricsSnapshot};
use crate::primitives::CacheAligned;

/// Number of slots per block (64 KiB worth of 16-byte slots).
pub const BLOCK_SLOTS: usize = 4096;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Free = 0,
    Allocating = 1,
    Allocated = 2,
    Removing = 3,
    Removed = 4,
    EndOfList = 5,
    Extending = 6,
    BlockPointer = 7,
    Destroying = 8,
    /// Debug-only guard tag; never assigned to a real slot in this
    /// implementation, kept so the state-machine assertion macro can
    /// name every tag the state machine enumerates.
    #[cfg(debug_assertions)]
    Sentinel = 9,
}

impl Tag {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => Tag::Free,
            1 => Tag::Allocating,
            2 => Tag::Allocated,
            3 => Tag::Removing,
            4 => Tag::Removed,
            5 => Tag::EndOfList,
            6 => Tag::Extending,
            7 => Tag::BlockPointer,
            8 => Tag::Destroying,
            #[cfg(debug_assertions)]
            9 => Tag::Sentinel,
            other => unreachable!("invalid tag discriminant {other}"),
        }
    }
}

struct Slot<V> {
    tag: AtomicU32,
    /// Only meaningful while `tag == BlockPointer`: the address of the
    /// successor block's first slot. Carried in its own field rather than
    /// unioned into `value`, since Rust cannot safely reinterpret a
    /// `MaybeUninit<V>` as a raw pointer without `transmute`.
    next_block: AtomicPtr<Slot<V>>,
    value: std::cell::UnsafeCell<MaybeUninit<V>>,
}

// SAFETY: `value` is written only by the thread that wins the
// `Free -> Allocating` (or block-extension) CAS and read only by the
// thread that wins the paired `Allocated -> Removing` (or cross-block)
// CAS, so there is never more than one live accessor at a time.
unsafe impl<V: Send> Sync for Slot<V> {}

impl<V> Slot<V> {
    fn new(tag: Tag) -> Self {
        Self {
            tag: AtomicU32::new(tag as u32),
            next_block: AtomicPtr::new(ptr::null_mut()),
            value: std::cell::UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    fn tag(&self) -> Tag {
        Tag::from_u32(self.tag.load(Ordering::Acquire))
    }

    fn cas_tag(&self, from: Tag, to: Tag) -> Result<(), Tag> {
        self.tag
            .compare_exchange(from as u32, to as u32, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(Tag::from_u32)
    }

    fn store_tag(&self, to: Tag) {
        self.tag.store(to as u32, Ordering::Release);
    }
}

fn allocate_block<V>() -> *mut Slot<V> {
    let mut slots = Vec::with_capacity(BLOCK_SLOTS);
    for i in 0..BLOCK_SLOTS {
        let tag = if i + 1 == BLOCK_SLOTS {
            Tag::EndOfList
        } else {
            Tag::Free
        };
        slots.push(Slot::new(tag));
    }
    let boxed = slots.into_boxed_slice();
    Box::into_raw(boxed) as *mut Slot<V>
}

/// Resets a uniquely-owned (cached, about-to-be-reused) block back to its
/// freshly-allocated shape.
fn reset_block<V>(base: *mut Slot<V>) {
    unsafe {
        for i in 0..BLOCK_SLOTS {
            let slot = &*base.add(i);
            slot.next_block.store(ptr::null_mut(), Ordering::Relaxed);
            let tag = if i + 1 == BLOCK_SLOTS {
                Tag::EndOfList
            } else {
                Tag::Free
            };
            slot.store_tag(tag);
        }
    }
}

fn free_block<V>(base: *mut Slot<V>) {
    unsafe {
        let slice = std::slice::from_raw_parts_mut(base, BLOCK_SLOTS);
        drop(Box::from_raw(slice));
    }
}

/// A lock-free unbounded FIFO queue of `V`, growing one 4096-slot block at
/// a time.
pub struct UnboundedBlockQueue<V> {
    // `head` (consumers), `tail` (producers), `cached_block` (the rare
    // writer-section handoff), and `remove_count` (the reader/writer
    // epoch, touched by every enqueue/dequeue) are each padded apart so
    // that producer traffic on `tail` can't bounce consumers spinning on
    // `head`, and vice versa.
    head: CacheAligned<AtomicPtr<Slot<V>>>,
    tail: CacheAligned<AtomicPtr<Slot<V>>>,
    cached_block: CacheAligned<AtomicPtr<Slot<V>>>,
    remove_count: CacheAligned<AtomicI32>,
    metrics: BlockQueueMetrics,
}

unsafe impl<V: Send> Send for UnboundedBlockQueue<V> {}
unsafe impl<V: Send> Sync for UnboundedBlockQueue<V> {}

impl<V> Default for UnboundedBlockQueue<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> UnboundedBlockQueue<V> {
    #[must_use]
    pub fn new() -> Self {
        let first = allocate_block::<V>();
        let metrics = BlockQueueMetrics::default();
        metrics.record_block_allocated();
        Self {
            head: CacheAligned::new(AtomicPtr::new(first)),
            tail: CacheAligned::new(AtomicPtr::new(first)),
            cached_block: CacheAligned::new(AtomicPtr::new(ptr::null_mut())),
            remove_count: CacheAligned::new(AtomicI32::new(0)),
            metrics,
        }
    }

    /// Enqueues `value`. Always succeeds; the only failure mode is
    /// allocation failure, which aborts the process
    /// rather than returning a `Result`.
    pub fn enqueue(&self, value: V) {
        self.enter_reader();
        let mut backoff = Backoff::calibrated(SpinClass::BlockQueue);
        loop {
            let tail_ptr = self.tail.load(Ordering::Acquire);
            let slot = unsafe { &*tail_ptr };
            match slot.tag() {
                Tag::Free => {
                    if slot.cas_tag(Tag::Free, Tag::Allocating).is_ok() {
                        self.enqueue_into_slot(tail_ptr, value);
                        break;
                    }
                }
                Tag::EndOfList => {
                    if slot.cas_tag(Tag::EndOfList, Tag::Extending).is_ok() {
                        self.extend_and_enqueue(tail_ptr, value);
                        break;
                    }
                }
                Tag::Extending => std::thread::yield_now(),
                _ => std::hint::spin_loop(),
            }
            backoff.spin();
        }
        self.leave_reader();
        self.metrics.record_enqueue();
    }

    fn enqueue_into_slot(&self, tail_ptr: *mut Slot<V>, value: V) {
        unsafe {
            let slot = &*tail_ptr;
            let next = tail_ptr.add(1);
            self.tail.store(next, Ordering::Release);
            (*slot.value.get()).write(value);
            let result = slot.cas_tag(Tag::Allocating, Tag::Allocated);
            debug_assert_transition_ok!(result, "Allocating", "Allocated");
        }
    }

    fn extend_and_enqueue(&self, tail_ptr: *mut Slot<V>, value: V) {
        unsafe {
            let new_block = self.acquire_block();
            let first = &*new_block;
            (*first.value.get()).write(value);
            first.store_tag(Tag::Allocated);

            self.tail.store(new_block.add(1), Ordering::Release);

            let slot = &*tail_ptr;
            slot.next_block.store(new_block, Ordering::Release);
            let result = slot.cas_tag(Tag::Extending, Tag::BlockPointer);
            debug_assert_transition_ok!(result, "Extending", "BlockPointer");
        }
    }

    /// Attempts to dequeue one value. Returns `None` if the queue was
    /// empty, or if the `cross_block` branch observed the successor
    /// block's first slot still `Free` — a deliberate choice to report no
    /// value rather than transparently retrying.
    #[must_use]
    pub fn try_dequeue(&self) -> Option<V> {
        self.enter_reader();
        let mut backoff = Backoff::calibrated(SpinClass::BlockQueue);
        let result = loop {
            let head_ptr = self.head.load(Ordering::Acquire);
            let slot = unsafe { &*head_ptr };
            match slot.tag() {
                Tag::Free => break None,
                Tag::Allocated => {
                    if slot.cas_tag(Tag::Allocated, Tag::Removing).is_ok() {
                        break Some(unsafe { self.remove_from_slot(head_ptr) });
                    }
                }
                Tag::BlockPointer => {
                    if slot.cas_tag(Tag::BlockPointer, Tag::Destroying).is_ok() {
                        // cross_block manages its own reader/writer section
                        // bookkeeping, so return directly without falling
                        // through to the generic `leave_reader` below.
                        return self.cross_block(head_ptr);
                    }
                }
                _ => std::thread::yield_now(),
            }
            backoff.spin();
        };
        self.leave_reader();
        if result.is_some() {
            self.metrics.record_dequeue();
        }
        result
    }

    /// Fails with [`EmptyQueueError`] if the queue was empty.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyQueueError`] if `try_dequeue` observed no value.
    pub fn dequeue(&self) -> Result<V, EmptyQueueError> {
        self.try_dequeue().ok_or(EmptyQueueError)
    }

    unsafe fn remove_from_slot(&self, head_ptr: *mut Slot<V>) -> V {
        let next = head_ptr.add(1);
        self.head.store(next, Ordering::Release);
        let slot = &*head_ptr;
        let value = (*slot.value.get()).assume_init_read();
        let result = slot.cas_tag(Tag::Removing, Tag::Removed);
        debug_assert_transition_ok!(result, "Removing", "Removed");
        value
    }

    fn cross_block(&self, head_ptr: *mut Slot<V>) -> Option<V> {
        unsafe {
            let slot = &*head_ptr;
            let next_block_head = slot.next_block.load(Ordering::Acquire);
            let next_slot = &*next_block_head;

            if next_slot.tag() != Tag::Allocated {
                self.head.store(next_block_head, Ordering::Release);
                self.leave_reader();
                return None;
            }

            let after = next_block_head.add(1);
            self.head.store(after, Ordering::Release);
            let value = (*next_slot.value.get()).assume_init_read();
            let result = next_slot.cas_tag(Tag::Allocated, Tag::Removed);
            debug_assert_transition_ok!(result, "Allocated", "Removed");

            self.leave_reader();
            self.enter_writer();
            self.release_block(head_ptr);
            self.leave_writer();

            self.metrics.record_dequeue();
            Some(value)
        }
    }

    fn release_block(&self, last_slot_of_old_block: *mut Slot<V>) {
        let block = unsafe { last_slot_of_old_block.sub(BLOCK_SLOTS - 1) };
        let cached = self.cached_block.load(Ordering::Acquire);
        if !cached.is_null() {
            free_block::<V>(block);
            self.metrics.record_block_freed();
            return;
        }
        match self.cached_block.compare_exchange(
            ptr::null_mut(),
            block,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => self.metrics.record_block_cached(),
            Err(_) => {
                free_block::<V>(block);
                self.metrics.record_block_freed();
            }
        }
    }

    fn acquire_block(&self) -> *mut Slot<V> {
        let cached = self.cached_block.swap(ptr::null_mut(), Ordering::AcqRel);
        if cached.is_null() {
            self.metrics.record_block_allocated();
            allocate_block::<V>()
        } else {
            reset_block::<V>(cached);
            self.metrics.record_block_reused();
            cached
        }
    }

    fn enter_reader(&self) {
        let mut backoff = Backoff::calibrated(SpinClass::BlockQueue);
        loop {
            let cur = self.remove_count.load(Ordering::Acquire);
            if cur >= 0 {
                if self
                    .remove_count
                    .compare_exchange_weak(cur, cur + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return;
                }
            } else {
                std::thread::yield_now();
            }
            backoff.spin();
        }
    }

    fn leave_reader(&self) {
        let prev = self.remove_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert_epoch_range!(prev - 1);
    }

    fn enter_writer(&self) {
        let mut backoff = Backoff::calibrated(SpinClass::BlockQueue);
        loop {
            if self
                .remove_count
                .compare_exchange_weak(0, -1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
            backoff.snooze();
        }
    }

    fn leave_writer(&self) {
        self.remove_count.store(0, Ordering::Release);
    }

    #[must_use]
    pub fn metrics(&self) -> BlockQueueMetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl<V> Drop for UnboundedBlockQueue<V> {
    fn drop(&mut self) {
        unsafe {
            let mut cur = *self.head.get_mut();
            loop {
                let slot = &*cur;
                match slot.tag() {
                    Tag::BlockPointer | Tag::Destroying => {
                        let next = slot.next_block.load(Ordering::Relaxed);
                        let block = cur.sub(BLOCK_SLOTS - 1);
                        free_block::<V>(block);
                        cur = next;
                    }
                    Tag::EndOfList => {
                        let block = cur.sub(BLOCK_SLOTS - 1);
                        free_block::<V>(block);
                        break;
                    }
                    Tag::Allocated | Tag::Removing => {
                        ptr::drop_in_place((*slot.value.get()).as_mut_ptr());
                        cur = cur.add(1);
                    }
                    _ => cur = cur.add(1),
                }
            }

            let cached = *self.cached_block.get_mut();
            if !cached.is_null() {
                free_block::<V>(cached);
            }
        }
    }
}
