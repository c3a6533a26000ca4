use std::sync::atomic::{fence, AtomicI64, Ordering};

use crate::{fail_fast, fre_assert, FailFastCode};

/// An atomic reference count that fails fast on misuse instead of wrapping.
///
/// A count starts at one (or at an explicit bias). The owner of the final reference is told so
/// by [`RefCount::decrement`] returning `true`, after an acquire fence, so it can safely tear
/// down whatever the count protects.
#[derive(Debug)]
pub struct RefCount(AtomicI64);

impl RefCount {
    /// Creates a count holding a single reference.
    pub const fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    /// Creates a count that already released its last reference.
    pub const fn released() -> Self {
        Self(AtomicI64::new(0))
    }

    /// Creates a count holding `bias` references.
    pub fn with_bias(bias: i64) -> Self {
        fre_assert(bias > 0, FailFastCode::InvalidArg);
        Self(AtomicI64::new(bias))
    }

    /// Takes another reference. The caller must already hold one, otherwise fails fast with
    /// [`FailFastCode::InvalidArg`].
    #[inline]
    pub fn increment(&self) {
        let previous = self.0.fetch_add(1, Ordering::Relaxed);
        fre_assert(previous > 0, FailFastCode::InvalidArg);
    }

    /// Drops a reference. Returns `true` if it was the last one.
    #[inline]
    pub fn decrement(&self) -> bool {
        let new = self.0.fetch_sub(1, Ordering::Release) - 1;

        if new > 0 {
            false
        } else if new == 0 {
            // Whoever tears down next must observe every write made under the references.
            fence(Ordering::Acquire);
            true
        } else {
            fail_fast(FailFastCode::InvalidReferenceCount)
        }
    }

    /// Re-arms a count that dropped to zero with a single reference.
    pub fn reinitialize(&self) {
        let revived = self.0.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Relaxed);
        fre_assert(revived.is_ok(), FailFastCode::InvalidReferenceCount);
    }

    /// Current number of references. Only meaningful for diagnostics.
    #[inline]
    pub fn value(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}
