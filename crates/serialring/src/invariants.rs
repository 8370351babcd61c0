//! Debug assertion macros for the byte ring.
//!
//! Active only in debug builds (`debug_assert!`), so there is zero overhead
//! in release builds. Used by the mutation paths in `ring.rs`.

/// Assert that the observed length never exceeds usable capacity.
///
/// Holds because head and tail advance modulo `capacity + 1` and each side
/// clamps against the other before advancing.
macro_rules! debug_assert_len_bounded {
    ($len:expr, $capacity:expr) => {
        debug_assert!(
            $len <= $capacity,
            "ring length {} exceeds capacity {}",
            $len,
            $capacity
        )
    };
}

/// Assert that an index stays inside the `capacity + 1` storage window.
macro_rules! debug_assert_index_in_storage {
    ($name:literal, $idx:expr, $storage:expr) => {
        debug_assert!(
            $idx < $storage,
            "{} index {} outside storage of {} slots",
            $name,
            $idx,
            $storage
        )
    };
}

/// Assert that an advance was clamped to what the opposite side allows.
///
/// The consumer may advance head by at most the used length; the producer may
/// advance tail by at most the free length.
macro_rules! debug_assert_advance_clamped {
    ($n:expr, $max:expr) => {
        debug_assert!(
            $n <= $max,
            "advance of {} exceeds available {}",
            $n,
            $max
        )
    };
}

pub(crate) use debug_assert_advance_clamped;
pub(crate) use debug_assert_index_in_storage;
pub(crate) use debug_assert_len_bounded;
