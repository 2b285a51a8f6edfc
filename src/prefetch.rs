//! Software prefetch hints
//!
//! Gathering feature values for a node and walking several trees at once both touch memory in
//! an order the hardware prefetcher cannot guess. With the `prefetch` feature enabled on x86_64
//! the hint is a `prefetcht0`, everywhere else it compiles to nothing. Results never depend on it.

/// How many observations ahead the feature gather issues its hint
pub const PREFETCH_DISTANCE: usize = 32;

/// Hints that `value` will be read soon
#[cfg(all(feature = "prefetch", target_arch = "x86_64"))]
#[inline(always)]
pub fn prefetch_read<T>(value: &T) {
    use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
    // SAFETY: prefetching is a hint and never faults, the pointer comes from a live reference
    unsafe { _mm_prefetch(value as *const T as *const i8, _MM_HINT_T0) }
}

/// Hints that `value` will be read soon
#[cfg(not(all(feature = "prefetch", target_arch = "x86_64")))]
#[inline(always)]
pub fn prefetch_read<T>(value: &T) {
    let _ = value;
}
