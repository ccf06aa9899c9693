use std::hint;
use std::sync::OnceLock;
use std::thread;
use std::time::Instant;

/// Adaptive backoff strategy (Crossbeam-style).
///
/// Progressively increases wait time: spin with PAUSE → yield to OS → give up.
#[derive(Debug)]
pub struct Backoff {
    step: u32,
    spin_limit: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6; // 2^6 = 64 spins max before yielding
    const YIELD_LIMIT: u32 = 10; // Then give up

    /// Creates a new backoff instance using the static default spin limit.
    #[inline]
    pub fn new() -> Self {
        Self {
            step: 0,
            spin_limit: Self::SPIN_LIMIT,
        }
    }

    /// Creates a backoff instance using `class`'s calibrated spin limit
    /// (see [`calibrated_spin_limit`]), falling back to the static default
    /// if calibration has not yet run or measured something degenerate.
    #[inline]
    pub(crate) fn calibrated(class: SpinClass) -> Self {
        Self {
            step: 0,
            spin_limit: calibrated_spin_limit(class),
        }
    }

    /// Light spin with PAUSE hints.
    #[inline]
    pub fn spin(&mut self) {
        let spins = 1 << self.step.min(self.spin_limit);
        for _ in 0..spins {
            hint::spin_loop();
        }
        if self.step <= self.spin_limit {
            self.step += 1;
        }
    }

    /// Heavier backoff: spin then yield.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= self.spin_limit {
            self.spin();
        } else {
            thread::yield_now();
            if self.step <= Self::YIELD_LIMIT {
                self.step += 1;
            }
        }
    }

    /// Check if we've exhausted patience.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.step > Self::YIELD_LIMIT
    }

    /// Reset for next wait cycle.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Which container class a micro-lock spin belongs to. Each class
/// calibrates its own spin-loop iteration count independently, since a
/// stack's `push`/`pop` service time need not match a block queue's
/// `enqueue`/`try_dequeue` service time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpinClass {
    Stack,
    RingQueue,
    BlockQueue,
}

static STACK_CALIBRATION: OnceLock<u32> = OnceLock::new();
static RING_QUEUE_CALIBRATION: OnceLock<u32> = OnceLock::new();
static BLOCK_QUEUE_CALIBRATION: OnceLock<u32> = OnceLock::new();

impl SpinClass {
    fn cell(self) -> &'static OnceLock<u32> {
        match self {
            SpinClass::Stack => &STACK_CALIBRATION,
            SpinClass::RingQueue => &RING_QUEUE_CALIBRATION,
            SpinClass::BlockQueue => &BLOCK_QUEUE_CALIBRATION,
        }
    }
}

/// Returns `class`'s calibrated spin-loop iteration count, measuring it on
/// the first call and caching the result for every subsequent container of
/// that class for the life of the process.
///
/// The measurement is a 4-best-of-10 median wall-clock sample of a single
/// CAS-retry-loop iteration, the same shape every micro-lock acquire/
/// release loop in this crate already runs. This is a soft heuristic: if
/// the measured value is degenerate (zero, or larger than the static
/// default ever needs), the static default wins.
pub(crate) fn calibrated_spin_limit(class: SpinClass) -> u32 {
    *class.cell().get_or_init(|| {
        let mut samples = [0u64; 10];
        for sample in &mut samples {
            let start = Instant::now();
            let word = std::sync::atomic::AtomicU64::new(0);
            for _ in 0..4 {
                let _ = word.compare_exchange(
                    0,
                    0,
                    std::sync::atomic::Ordering::AcqRel,
                    std::sync::atomic::Ordering::Acquire,
                );
                hint::spin_loop();
            }
            *sample = start.elapsed().as_nanos() as u64;
        }
        samples.sort_unstable();
        let best_four = &samples[0..4];
        let median_ns = best_four.iter().sum::<u64>() / 4;

        // Scale the measured per-iteration service time into an exponent
        // for the existing `1 << step` spin schedule: slower observed CAS
        // round trips warrant a few more doublings before yielding.
        let scaled = (median_ns / 25).clamp(2, u64::from(Backoff::SPIN_LIMIT));
        scaled as u32
    })
}
