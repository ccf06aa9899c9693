//! Edge-triggered notification wrapper for any of the three containers.
//!
//! `ContainerSubject` is the external collaborator this crate depends on
//! only through its interface, not through any particular delivery
//! mechanism (channel, callback, async task...).
//! `EdgeNotifier` is the shared bookkeeping every wrapper needs: an atomic
//! count plus two edge-armed flags, so `OnAlmostFull`/`OnPartlyEmpty` fire
//! exactly once per threshold crossing rather than on every operation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Notification events a [`ContainerSubject`] may receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    AllInserts,
    AllRemoves,
    PartlyEmpty,
    AlmostFull,
}

/// External observer interface consumed by the notification wrapper.
///
/// Implementations decide how events actually reach a subscriber (a
/// channel send, a callback invocation, a counter) — out of scope here.
pub trait ContainerSubject {
    /// Fires every time the event occurs.
    fn notify(&self, event: NotifyEvent);
    /// Fires once per edge crossing; see [`EdgeNotifier`] for the armed/
    /// disarmed bookkeeping that makes this true.
    fn notify_once(&self, event: NotifyEvent);
}

/// Tunable thresholds for the edge-triggered events, as fractions of
/// capacity.
#[derive(Debug, Clone, Copy)]
pub struct NotifyConfig {
    pub partly_empty_factor: f64,
    pub almost_full_factor: f64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            partly_empty_factor: 0.8,
            almost_full_factor: 0.9,
        }
    }
}

/// Shared edge-triggered counting logic used by every notifying wrapper.
pub(crate) struct EdgeNotifier<S> {
    count: AtomicUsize,
    partly_empty_armed: AtomicBool,
    almost_full_armed: AtomicBool,
    partly_empty_threshold: usize,
    almost_full_threshold: usize,
    subject: S,
}

impl<S: ContainerSubject> EdgeNotifier<S> {
    pub(crate) fn new(capacity: usize, config: NotifyConfig, subject: S) -> Self {
        let clip = |factor: f64| -> usize {
            let raw = (capacity as f64 * factor).round() as usize;
            raw.min(capacity.saturating_sub(1))
        };
        Self::new_with_thresholds(clip(config.partly_empty_factor), clip(config.almost_full_factor), subject)
    }

    /// Builds a notifier with explicit thresholds rather than capacity
    /// fractions, for containers (the unbounded queue) that have no fixed
    /// capacity to take a fraction of.
    pub(crate) fn new_with_thresholds(
        partly_empty_threshold: usize,
        almost_full_threshold: usize,
        subject: S,
    ) -> Self {
        Self {
            count: AtomicUsize::new(0),
            partly_empty_armed: AtomicBool::new(true),
            almost_full_armed: AtomicBool::new(true),
            partly_empty_threshold,
            almost_full_threshold,
            subject,
        }
    }

    pub(crate) fn subject(&self) -> &S {
        &self.subject
    }

    pub(crate) fn current_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn on_insert(&self) {
        let new_count = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        self.subject.notify(NotifyEvent::AllInserts);

        if new_count >= self.almost_full_threshold {
            if self.almost_full_armed.swap(false, Ordering::AcqRel) {
                self.subject.notify_once(NotifyEvent::AlmostFull);
            }
        }
        // Rearm `PartlyEmpty` only once this insert has actually left the
        // region that last fired it, not merely because `AlmostFull` didn't
        // fire — each edge arms/disarms against its own threshold.
        if new_count > self.partly_empty_threshold {
            self.partly_empty_armed.store(true, Ordering::Release);
        }
    }

    pub(crate) fn on_remove(&self) {
        let new_count = self.count.fetch_sub(1, Ordering::AcqRel) - 1;
        self.subject.notify(NotifyEvent::AllRemoves);

        if new_count <= self.partly_empty_threshold {
            if self.partly_empty_armed.swap(false, Ordering::AcqRel) {
                self.subject.notify_once(NotifyEvent::PartlyEmpty);
            }
        }
        if new_count < self.almost_full_threshold {
            self.almost_full_armed.store(true, Ordering::Release);
        }
    }
}

/// A [`crate::BoundedStack`] wrapped with edge-triggered notifications.
pub struct NotifyingStack<T, S> {
    inner: crate::BoundedStack<T>,
    notifier: EdgeNotifier<S>,
}

impl<T, S: ContainerSubject> NotifyingStack<T, S> {
    pub fn new(
        num_elements: usize,
        config: NotifyConfig,
        subject: S,
    ) -> Result<Self, crate::InitError> {
        let inner = crate::BoundedStack::new(num_elements)?;
        Ok(Self {
            notifier: EdgeNotifier::new(num_elements, config, subject),
            inner,
        })
    }

    #[must_use]
    pub fn push(&self, value: T) -> bool {
        let ok = self.inner.push(value);
        if ok {
            self.notifier.on_insert();
        }
        ok
    }

    #[must_use]
    pub fn pop(&self) -> Option<T> {
        let value = self.inner.pop();
        if value.is_some() {
            self.notifier.on_remove();
        }
        value
    }

    #[must_use]
    pub fn subject(&self) -> &S {
        self.notifier.subject()
    }

    #[must_use]
    pub fn inner(&self) -> &crate::BoundedStack<T> {
        &self.inner
    }
}

/// A [`crate::BoundedRingQueue`] wrapped with edge-triggered notifications.
pub struct NotifyingRingQueue<T, S> {
    inner: crate::BoundedRingQueue<T>,
    notifier: EdgeNotifier<S>,
}

impl<T, S: ContainerSubject> NotifyingRingQueue<T, S> {
    pub fn new(
        num_elements: usize,
        config: NotifyConfig,
        subject: S,
    ) -> Result<Self, crate::InitError> {
        let inner = crate::BoundedRingQueue::new(num_elements)?;
        Ok(Self {
            notifier: EdgeNotifier::new(num_elements, config, subject),
            inner,
        })
    }

    #[must_use]
    pub fn enqueue(&self, value: T) -> bool {
        let ok = self.inner.enqueue(value);
        if ok {
            self.notifier.on_insert();
        }
        ok
    }

    #[must_use]
    pub fn dequeue(&self) -> Option<T> {
        let value = self.inner.dequeue();
        if value.is_some() {
            self.notifier.on_remove();
        }
        value
    }

    #[must_use]
    pub fn subject(&self) -> &S {
        self.notifier.subject()
    }

    #[must_use]
    pub fn inner(&self) -> &crate::BoundedRingQueue<T> {
        &self.inner
    }
}

/// An [`crate::UnboundedBlockQueue`] wrapped with edge-triggered
/// notifications.
///
/// Only `OnAllInserts`/`OnAllRemoves`/`OnPartlyEmpty` are meaningful here —
/// `OnAlmostFull` never fires because the queue has no capacity to
/// approach. `try_dequeue` delegates to the base implementation exactly
/// once and inspects its `Option` result to decide whether to notify; this
/// is the pinned resolution of the `TryDequeue` self-recursion defect
/// named in the dequeue state machine below.
pub struct NotifyingBlockQueue<V, S> {
    inner: crate::UnboundedBlockQueue<V>,
    notifier: EdgeNotifier<S>,
}

impl<V, S: ContainerSubject> NotifyingBlockQueue<V, S> {
    pub fn new(partly_empty_watermark: usize, subject: S) -> Self {
        Self {
            inner: crate::UnboundedBlockQueue::new(),
            notifier: EdgeNotifier::new_with_thresholds(partly_empty_watermark, usize::MAX, subject),
        }
    }

    pub fn enqueue(&self, value: V) {
        self.inner.enqueue(value);
        self.notifier.on_insert();
    }

    #[must_use]
    pub fn try_dequeue(&self) -> Option<V> {
        let value = self.inner.try_dequeue();
        if value.is_some() {
            self.notifier.on_remove();
        }
        value
    }

    /// # Errors
    ///
    /// Returns [`crate::EmptyQueueError`] if the queue was empty.
    pub fn dequeue(&self) -> Result<V, crate::EmptyQueueError> {
        self.try_dequeue().ok_or(crate::EmptyQueueError)
    }

    #[must_use]
    pub fn subject(&self) -> &S {
        self.notifier.subject()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSubject {
        almost_full: AtomicUsize,
        partly_empty: AtomicUsize,
        all_inserts: AtomicUsize,
        all_removes: AtomicUsize,
    }

    impl ContainerSubject for CountingSubject {
        fn notify(&self, event: NotifyEvent) {
            match event {
                NotifyEvent::AllInserts => self.all_inserts.fetch_add(1, Ordering::Relaxed),
                NotifyEvent::AllRemoves => self.all_removes.fetch_add(1, Ordering::Relaxed),
                _ => 0,
            };
        }

        fn notify_once(&self, event: NotifyEvent) {
            match event {
                NotifyEvent::AlmostFull => self.almost_full.fetch_add(1, Ordering::Relaxed),
                NotifyEvent::PartlyEmpty => self.partly_empty.fetch_add(1, Ordering::Relaxed),
                _ => 0,
            };
        }
    }

    #[test]
    fn notification_edges_scenario() {
        // Edge-triggered almost-full/partly-empty notification thresholds.
        let stack = NotifyingStack::new(
            100,
            NotifyConfig {
                partly_empty_factor: 0.8,
                almost_full_factor: 0.9,
            },
            CountingSubject::default(),
        )
        .unwrap();

        for _ in 0..91 {
            assert!(stack.push(1u32));
        }
        assert_eq!(stack.subject().almost_full.load(Ordering::Relaxed), 1);
        assert_eq!(stack.subject().all_inserts.load(Ordering::Relaxed), 91);

        for _ in 0..21 {
            stack.pop();
        }
        assert_eq!(stack.subject().partly_empty.load(Ordering::Relaxed), 1);

        for _ in 0..21 {
            assert!(stack.push(1u32));
        }
        assert_eq!(stack.subject().almost_full.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn partly_empty_does_not_refire_without_an_intervening_almost_full() {
        // Each edge must arm/disarm against its own threshold, not the
        // other one's — oscillating below `partly_empty_threshold` (never
        // climbing back above it) must not produce a second `PartlyEmpty`
        // without an `AlmostFull` in between.
        let stack = NotifyingStack::new(
            100,
            NotifyConfig {
                partly_empty_factor: 0.8,
                almost_full_factor: 0.9,
            },
            CountingSubject::default(),
        )
        .unwrap();

        for _ in 0..90 {
            assert!(stack.push(1u32));
        }
        assert_eq!(stack.subject().almost_full.load(Ordering::Relaxed), 1);

        // Drop from 90 to 50, crossing the partly-empty threshold (80) once.
        for _ in 0..40 {
            stack.pop();
        }
        assert_eq!(stack.subject().partly_empty.load(Ordering::Relaxed), 1);

        // Oscillate at the bottom of the range (50 <-> 51) without ever
        // climbing back above the partly-empty threshold of 80.
        for _ in 0..10 {
            assert!(stack.push(1u32));
            stack.pop();
        }
        assert_eq!(
            stack.subject().partly_empty.load(Ordering::Relaxed),
            1,
            "PartlyEmpty must not refire while still inside the same excursion"
        );
        assert_eq!(stack.subject().almost_full.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn no_spurious_fires_oscillating_strictly_between_the_two_thresholds() {
        // Oscillating entirely inside the open band (partly_empty_threshold,
        // almost_full_threshold) — here (80, 90) — must never touch either
        // edge: no `PartlyEmpty`, no `AlmostFull`.
        let stack = NotifyingStack::new(
            100,
            NotifyConfig {
                partly_empty_factor: 0.8,
                almost_full_factor: 0.9,
            },
            CountingSubject::default(),
        )
        .unwrap();

        for _ in 0..85 {
            assert!(stack.push(1u32));
        }
        assert_eq!(stack.subject().almost_full.load(Ordering::Relaxed), 0);
        assert_eq!(stack.subject().partly_empty.load(Ordering::Relaxed), 0);

        for _ in 0..50 {
            assert!(stack.push(1u32));
            stack.pop();
            stack.pop();
            assert!(stack.push(1u32));
        }

        assert_eq!(
            stack.subject().almost_full.load(Ordering::Relaxed),
            0,
            "count never reached the almost-full threshold"
        );
        assert_eq!(
            stack.subject().partly_empty.load(Ordering::Relaxed),
            0,
            "count never dropped to the partly-empty threshold"
        );
    }

    #[test]
    fn unbounded_queue_notifications_never_fire_almost_full() {
        let queue = NotifyingBlockQueue::new(10, CountingSubject::default());
        for i in 0..50u32 {
            queue.enqueue(i);
        }
        assert_eq!(queue.subject().almost_full.load(Ordering::Relaxed), 0);
        for _ in 0..50 {
            queue.try_dequeue();
        }
        assert!(queue.subject().partly_empty.load(Ordering::Relaxed) >= 1);
    }
}
