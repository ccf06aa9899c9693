//! Debug assertion macros for this crate's invariants.
//!
//! These macros are only active in debug builds (`#[cfg(debug_assertions)]`),
//! so there is zero overhead in release builds.

// =============================================================================
// INV-STK-01: Chain Cardinality
// =============================================================================

/// Assert that the public and recycle chains of a bounded stack together
/// still account for every element.
///
/// **Invariant**: `|public_chain| + |recycle_chain| == num_elements`
macro_rules! debug_assert_chain_cardinality {
    ($public:expr, $recycle:expr, $total:expr) => {
        debug_assert!(
            $public + $recycle == $total,
            "INV-STK-01 violated: public {} + recycle {} != num_elements {}",
            $public,
            $recycle,
            $total
        )
    };
}

// =============================================================================
// INV-RING-01: Ring Cell Conservation
// =============================================================================

/// Assert that the public and recycle rings of a bounded ring queue
/// together account for every circulating payload cell (the permanent
/// separator cell excluded).
macro_rules! debug_assert_ring_conservation {
    ($public:expr, $recycle:expr, $total:expr) => {
        debug_assert!(
            $public + $recycle == $total,
            "INV-RING-01 violated: public {} + recycle {} != num_elements {}",
            $public,
            $recycle,
            $total
        )
    };
}

// =============================================================================
// INV-BLK-01: Epoch Range
// =============================================================================

/// Assert that `remove_count` stays within `{-1} ∪ [0, i32::MAX]`.
macro_rules! debug_assert_epoch_range {
    ($value:expr) => {
        debug_assert!(
            $value >= -1,
            "INV-BLK-01 violated: remove_count {} below -1",
            $value
        )
    };
}

// =============================================================================
// INV-BLK-02: Tag Transition Legality
// =============================================================================

/// Assert that a CAS-driven tag transition that the protocol assumes must
/// succeed actually did. A failure here means two threads raced on a tag
/// that only one thread should ever hold (a protocol bug, not contention).
macro_rules! debug_assert_transition_ok {
    ($result:expr, $from:literal, $to:literal) => {
        debug_assert!(
            $result.is_ok(),
            "INV-BLK-02 violated: exclusive transition {} -> {} was contended",
            $from,
            $to
        )
    };
}

pub(crate) use debug_assert_chain_cardinality;
pub(crate) use debug_assert_epoch_range;
pub(crate) use debug_assert_ring_conservation;
pub(crate) use debug_assert_transition_ok;
