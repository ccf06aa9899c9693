//! Lock-free bounded LIFO stack.
//!
//! Backed by a fixed-size arena of nodes threaded onto two intrusive
//! singly-linked chains: `public` (filled nodes, in LIFO order) and
//! `recycle` (free nodes). Both chain heads are [`RefPtr`] micro-locks;
//! `push`/`pop` never block and never allocate after construction.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::backoff::{Backoff, SpinClass};
use crate::error::InitError;
use crate::invariants::debug_assert_chain_cardinality;
use crate::metrics::{BoundedMetrics, BoundedMetricsSnapshot};
use crate::primitives::{thread_tag, CacheAligned, RefPtr, NIL};

struct Node<T> {
    next: AtomicU32,
    payload: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: access to `payload` is only ever performed by the thread that
// currently holds the node (established by `pop_link` handing out a unique
// arena index, mirrored by `push_link` giving it back), so there is never
// more than one live reference at a time despite the `UnsafeCell`.
unsafe impl<T: Send> Sync for Node<T> {}

/// A lock-free bounded LIFO stack of `T`.
pub struct BoundedStack<T> {
    arena: Box<[Node<T>]>,
    // Each chain head is contended independently by every producer/consumer
    // thread; padding them apart keeps one chain's busy-wait traffic from
    // bouncing the other chain's cache line.
    public_chain: CacheAligned<RefPtr>,
    recycle_chain: CacheAligned<RefPtr>,
    num_elements: usize,
    metrics: BoundedMetrics,
}

unsafe impl<T: Send> Send for BoundedStack<T> {}
unsafe impl<T: Send> Sync for BoundedStack<T> {}

impl<T> BoundedStack<T> {
    /// Allocates a stack with room for exactly `num_elements` items.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::InvalidInitialization`] if `num_elements == 0`
    /// or `T` is zero-sized (the Rust analogue of rejecting a zero
    /// byte-size element).
    pub fn new(num_elements: usize) -> Result<Self, InitError> {
        if num_elements == 0 || std::mem::size_of::<T>() == 0 {
            return Err(InitError::InvalidInitialization);
        }

        let mut arena = Vec::with_capacity(num_elements);
        for i in 0..num_elements {
            let next = if i + 1 == num_elements {
                NIL
            } else {
                (i + 1) as u32
            };
            arena.push(Node {
                next: AtomicU32::new(next),
                payload: UnsafeCell::new(MaybeUninit::uninit()),
            });
        }

        Ok(Self {
            arena: arena.into_boxed_slice(),
            public_chain: CacheAligned::new(RefPtr::new(NIL, 0)),
            recycle_chain: CacheAligned::new(RefPtr::new(0, 0)),
            num_elements,
            metrics: BoundedMetrics::default(),
        })
    }

    /// Pushes `value` onto the stack.
    ///
    /// Returns `false` (and drops nothing — `value` is returned to the
    /// caller via the argument, as it was never consumed) if the stack is
    /// full.
    #[must_use]
    pub fn push(&self, value: T) -> bool {
        let Some(node) = self.pop_link(&self.recycle_chain) else {
            self.metrics.record_rejected_full();
            return false;
        };
        unsafe {
            (*self.arena[node as usize].payload.get()).write(value);
        }
        self.push_link(node, &self.public_chain);
        self.metrics.record_insert();
        true
    }

    /// Pops the most recently pushed value, or `None` if the stack is empty.
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        let Some(node) = self.pop_link(&self.public_chain) else {
            self.metrics.record_rejected_empty();
            return None;
        };
        let value = unsafe { (*self.arena[node as usize].payload.get()).assume_init_read() };
        self.push_link(node, &self.recycle_chain);
        self.metrics.record_remove();
        Some(value)
    }

    /// Snapshot check; may be stale under contention.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.public_chain.load(Ordering::Acquire).0 == NIL
    }

    /// Snapshot check; may be stale under contention.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.recycle_chain.load(Ordering::Acquire).0 == NIL
    }

    /// Total capacity this stack was constructed with.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.num_elements
    }

    /// Drains every public element back into the recycle chain.
    ///
    /// Takes `&mut self`: draining concurrently with in-flight `push`/`pop`
    /// calls from other threads is not supported, and the exclusive borrow
    /// enforces that statically rather than at runtime.
    pub fn empty(&mut self) {
        loop {
            let (head, _) = self.public_chain.load(Ordering::Acquire);
            if head == NIL {
                break;
            }
            if self.pop_link(&self.public_chain).is_none() {
                break;
            }
            // pop_link already took the node off `public`; thread it onto
            // `recycle` the same way a real pop would.
            self.push_link(head, &self.recycle_chain);
        }
    }

    #[must_use]
    pub fn metrics(&self) -> BoundedMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Acquires the chain's micro-lock, advances it past the head node, and
    /// returns that node's arena index (or `None` if the chain was empty).
    ///
    /// Because `push_link` never inspects `ref`, `data` can move again
    /// before the release CAS below lands; rather than releasing and
    /// re-acquiring the lock (which this thread already holds and nothing
    /// else can touch), the release CAS is simply retried with freshly
    /// read state. This is the concrete resolution of "retry from the top"
    /// for the lock's own holder.
    fn pop_link(&self, chain: &RefPtr) -> Option<u32> {
        let tag = thread_tag();
        let mut backoff = Backoff::calibrated(SpinClass::Stack);

        loop {
            let (_, refv) = chain.load(Ordering::Acquire);
            if refv == 0 && chain.cas_ref(0, tag).is_ok() {
                break;
            }
            backoff.snooze();
        }

        loop {
            let (head, _) = chain.load(Ordering::Acquire);
            if head == NIL {
                if chain.cas64((NIL, tag), (NIL, 0)).is_ok() {
                    return None;
                }
                continue;
            }
            let next = self.arena[head as usize].next.load(Ordering::Acquire);
            match chain.cas64((head, tag), (next, 0)) {
                Ok(()) => return Some(head),
                Err(_) => continue,
            }
        }
    }

    /// Publishes `node` as the chain's new head. Only spins while the lock
    /// looks busy as a politeness heuristic; the CAS itself never inspects
    /// `ref` and so cannot be blocked by a concurrent `pop_link` holder.
    fn push_link(&self, node: u32, chain: &RefPtr) {
        let mut backoff = Backoff::calibrated(SpinClass::Stack);
        loop {
            let (old, refv) = chain.load(Ordering::Acquire);
            if refv != 0 {
                backoff.spin();
                continue;
            }
            self.arena[node as usize].next.store(old, Ordering::Release);
            match chain.cas_data(old, node) {
                Ok(()) => return,
                Err(_) => backoff.reset(),
            }
        }
    }

    #[cfg(debug_assertions)]
    fn chain_len(&self, chain: &RefPtr) -> usize {
        let mut count = 0;
        let (mut cur, _) = chain.load(Ordering::Acquire);
        while cur != NIL {
            count += 1;
            cur = self.arena[cur as usize].next.load(Ordering::Acquire);
        }
        count
    }

    #[cfg(debug_assertions)]
    fn assert_cardinality(&self) {
        let public = self.chain_len(&self.public_chain);
        let recycle = self.chain_len(&self.recycle_chain);
        debug_assert_chain_cardinality!(public, recycle, self.num_elements);
    }
}

impl<T> Drop for BoundedStack<T> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.assert_cardinality();

        let mut cur = self.public_chain.load(Ordering::Acquire).0;
        while cur != NIL {
            unsafe {
                (*self.arena[cur as usize].payload.get()).assume_init_drop();
            }
            cur = self.arena[cur as usize].next.load(Ordering::Acquire);
        }
    }
}
