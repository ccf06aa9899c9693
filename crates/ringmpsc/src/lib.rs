//! Lock-free concurrent containers for single-process, multi-threaded
//! producer/consumer use.
//!
//! Three containers are provided, sharing only the [`primitives`] module's
//! micro-locking referenced pointer:
//!
//! - [`BoundedStack`] — a fixed-capacity LIFO stack.
//! - [`BoundedRingQueue`] — a fixed-capacity FIFO queue.
//! - [`UnboundedBlockQueue`] — an unbounded FIFO queue that grows one
//!   4096-slot block at a time and reclaims blocks once every reader has
//!   moved past them.
//!
//! All three are lock-free: contention is resolved with compare-and-swap
//! retries, brief spinning, and cooperative yields rather than a blocking
//! mutex. None of them are wait-free, and none make fairness guarantees
//! between competing threads.
//!
//! Each container can optionally be wrapped with edge-triggered
//! notifications via the [`notify`] module.
//!
//! # Example
//!
//! ```
//! use lockfree_containers::BoundedStack;
//!
//! let stack = BoundedStack::<u32>::new(4).unwrap();
//! assert!(stack.push(1));
//! assert!(stack.push(2));
//! assert_eq!(stack.pop(), Some(2));
//! assert_eq!(stack.pop(), Some(1));
//! assert_eq!(stack.pop(), None);
//! ```

mod backoff;
mod bounded_queue;
mod bounded_stack;
mod block_queue;
mod error;
mod invariants;
mod metrics;
pub mod notify;
mod primitives;

pub use backoff::Backoff;
pub use block_queue::{UnboundedBlockQueue, BLOCK_SLOTS};
pub use bounded_queue::BoundedRingQueue;
pub use bounded_stack::BoundedStack;
pub use error::{EmptyQueueError, InitError};
pub use metrics::{BlockQueueMetricsSnapshot, BoundedMetricsSnapshot};
pub use notify::{ContainerSubject, NotifyConfig, NotifyEvent, NotifyingBlockQueue, NotifyingRingQueue, NotifyingStack};
