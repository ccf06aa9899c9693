//! Error types for container construction and terminal operations.
//!
//! Full/empty on the steady-state fast path is not an error — `push`,
//! `pop`, `enqueue`, and `dequeue`-via-ring all report it with a plain
//! `bool`/`Option`. These types cover only initialization failures and
//! `UnboundedBlockQueue::dequeue`'s one domain error.

use thiserror::Error;

/// Failure constructing a bounded container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
    /// `num_elements == 0`, or the element type is zero-sized (the Rust
    /// analogue of rejecting a zero byte-size element).
    #[error("num_elements and the element size must both be non-zero")]
    InvalidInitialization,
    /// Retained for API stability and to document the alignment invariant
    /// the backing buffer must uphold; in this implementation native type
    /// alignment makes the check unreachable.
    #[error("backing buffer is not naturally aligned")]
    AlignmentFailure,
}

/// The unbounded queue was empty at the instant `dequeue` observed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue is empty")]
pub struct EmptyQueueError;
