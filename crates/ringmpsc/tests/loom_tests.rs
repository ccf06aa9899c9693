//! Loom-based concurrency tests for the micro-lock and tag-transition
//! protocols underlying `lockfree-containers`.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! The production modules (`primitives`, `bounded_stack`, `bounded_queue`,
//! `block_queue`) use `std::sync::atomic` unconditionally rather than
//! swapping in `loom::sync::atomic` behind the feature flag, so these
//! tests model the synchronization protocol in isolation with loom's own
//! atomics, small enough to keep loom's exhaustive interleaving search
//! tractable.

#![cfg(feature = "loom")]

use loom::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use loom::sync::Arc;
use loom::thread;

/// A packed `{data: u16, ref: u16}` micro-lock, the same protocol as
/// `primitives::RefPtr` scaled down to 16-bit halves so loom's state
/// space stays small.
struct LoomRefPtr(AtomicU32);

impl LoomRefPtr {
    fn new(data: u16, refv: u16) -> Self {
        Self(AtomicU32::new((u32::from(refv) << 16) | u32::from(data)))
    }

    fn load(&self, ord: Ordering) -> (u16, u16) {
        let word = self.0.load(ord);
        (word as u16, (word >> 16) as u16)
    }

    fn cas64(&self, expected: (u16, u16), new: (u16, u16)) -> Result<(), (u16, u16)> {
        let expected_word = (u32::from(expected.1) << 16) | u32::from(expected.0);
        let new_word = (u32::from(new.1) << 16) | u32::from(new.0);
        match self
            .0
            .compare_exchange(expected_word, new_word, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(actual) => Err((actual as u16, (actual >> 16) as u16)),
        }
    }

    fn cas_ref(&self, expected_ref: u16, new_ref: u16) -> Result<(), u16> {
        let mut cur = self.0.load(Ordering::Acquire);
        loop {
            let cur_data = cur as u16;
            let cur_ref = (cur >> 16) as u16;
            if cur_ref != expected_ref {
                return Err(cur_ref);
            }
            let new_word = (u32::from(new_ref) << 16) | u32::from(cur_data);
            match self
                .0
                .compare_exchange_weak(cur, new_word, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(()),
                Err(actual) => cur = actual,
            }
        }
    }
}

/// Two threads race to acquire the `ref` half of the lock; exactly one
/// must win, and the loser must observe the word unchanged.
#[test]
fn loom_micro_lock_mutual_exclusion() {
    loom::model(|| {
        let lock = Arc::new(LoomRefPtr::new(0, 0));
        let winners = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..2)
            .map(|tag| {
                let lock = Arc::clone(&lock);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    if lock.cas_ref(0, tag + 1).is_ok() {
                        winners.fetch_add(1, Ordering::SeqCst);
                        // release: advance data, clear ref
                        lock.cas64((0, tag + 1), (1, 0)).unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        // exactly one thread can win the initial ref == 0 race
        assert_eq!(winners.load(Ordering::SeqCst), 1);
        let (data, refv) = lock.load(Ordering::SeqCst);
        assert_eq!(refv, 0, "lock must end released");
        assert_eq!(data, 1);
    });
}

/// A `data`-only CAS (models `push_link`'s bare write) must never be
/// blocked by a concurrent holder of the `ref` half, and must never
/// corrupt the `ref` half it didn't touch.
#[test]
fn loom_data_cas_ignores_ref_holder() {
    loom::model(|| {
        let word = Arc::new(LoomRefPtr::new(5, 0));

        let locker = {
            let word = Arc::clone(&word);
            thread::spawn(move || {
                word.cas_ref(0, 99).unwrap();
            })
        };

        let writer = {
            let word = Arc::clone(&word);
            thread::spawn(move || {
                // retry loop mirroring `RefPtr::cas_data`
                loop {
                    let (cur_data, cur_ref) = word.load(Ordering::Acquire);
                    if cur_data != 5 {
                        break;
                    }
                    let new_word = (u32::from(cur_ref) << 16) | 7u32;
                    if word
                        .0
                        .compare_exchange_weak(
                            (u32::from(cur_ref) << 16) | u32::from(cur_data),
                            new_word,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        break;
                    }
                }
            })
        };

        locker.join().unwrap();
        writer.join().unwrap();

        let (data, _) = word.load(Ordering::SeqCst);
        assert_eq!(data, 7, "data CAS must land regardless of ref holder");
    });
}

/// Models the unbounded queue's reader/writer epoch: any number of
/// readers may hold the counter non-negative concurrently, but a writer
/// transitioning `0 -> -1` must never overlap a live reader.
#[test]
fn loom_reader_writer_epoch_excludes_writer() {
    loom::model(|| {
        let remove_count = Arc::new(AtomicI64::new(0));

        let reader = {
            let remove_count = Arc::clone(&remove_count);
            thread::spawn(move || {
                loop {
                    let cur = remove_count.load(Ordering::Acquire);
                    if cur >= 0
                        && remove_count
                            .compare_exchange_weak(
                                cur,
                                cur + 1,
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            )
                            .is_ok()
                    {
                        break;
                    }
                }
                // critical section: read the shared structure
                let observed = remove_count.load(Ordering::Acquire);
                assert!(observed >= 1, "reader must observe its own increment");
                remove_count.fetch_sub(1, Ordering::AcqRel);
            })
        };

        let writer = {
            let remove_count = Arc::clone(&remove_count);
            thread::spawn(move || {
                loop {
                    if remove_count
                        .compare_exchange_weak(0, -1, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        break;
                    }
                }
                remove_count.store(0, Ordering::Release);
            })
        };

        reader.join().unwrap();
        writer.join().unwrap();

        assert_eq!(remove_count.load(Ordering::SeqCst), 0);
    });
}
