//! Plain atomic counters exposed by each container as a side channel.
//!
//! No container logs on its hot path; instead each one accumulates a
//! handful of `AtomicU64` counters and exposes a `Copy` snapshot through a
//! `metrics()` method.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the bounded stack and bounded ring queue.
#[derive(Debug, Default)]
pub(crate) struct BoundedMetrics {
    inserts: AtomicU64,
    removes: AtomicU64,
    rejected_full: AtomicU64,
    rejected_empty: AtomicU64,
}

impl BoundedMetrics {
    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected_full(&self) {
        self.rejected_full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected_empty(&self) {
        self.rejected_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BoundedMetricsSnapshot {
        BoundedMetricsSnapshot {
            inserts: self.inserts.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            rejected_full: self.rejected_full.load(Ordering::Relaxed),
            rejected_empty: self.rejected_empty.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of a bounded container's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundedMetricsSnapshot {
    pub inserts: u64,
    pub removes: u64,
    pub rejected_full: u64,
    pub rejected_empty: u64,
}

/// Counters specific to the unbounded block queue's block lifecycle.
#[derive(Debug, Default)]
pub(crate) struct BlockQueueMetrics {
    enqueues: AtomicU64,
    dequeues: AtomicU64,
    blocks_allocated: AtomicU64,
    blocks_freed: AtomicU64,
    blocks_cached: AtomicU64,
    blocks_reused: AtomicU64,
}

impl BlockQueueMetrics {
    pub(crate) fn record_enqueue(&self) {
        self.enqueues.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dequeue(&self) {
        self.dequeues.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_block_allocated(&self) {
        self.blocks_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_block_freed(&self) {
        self.blocks_freed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_block_cached(&self) {
        self.blocks_cached.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_block_reused(&self) {
        self.blocks_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BlockQueueMetricsSnapshot {
        BlockQueueMetricsSnapshot {
            enqueues: self.enqueues.load(Ordering::Relaxed),
            dequeues: self.dequeues.load(Ordering::Relaxed),
            blocks_allocated: self.blocks_allocated.load(Ordering::Relaxed),
            blocks_freed: self.blocks_freed.load(Ordering::Relaxed),
            blocks_cached: self.blocks_cached.load(Ordering::Relaxed),
            blocks_reused: self.blocks_reused.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of the unbounded queue's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockQueueMetricsSnapshot {
    pub enqueues: u64,
    pub dequeues: u64,
    pub blocks_allocated: u64,
    pub blocks_freed: u64,
    pub blocks_cached: u64,
    pub blocks_reused: u64,
}
