use std::sync::atomic::{AtomicU64, Ordering};

use xdp_rtl::CACHE_LINE_SIZE;

/// Counters owned by a single logical processor.
///
/// Aligned (and therefore padded) to a full cache line so neighbouring slots never share one.
#[derive(Debug, Default)]
#[repr(C, align(64))]
pub struct PerProcessorCounters {
    /// Units processed on this processor.
    processed: AtomicU64,
}

const _: () = assert!(std::mem::size_of::<PerProcessorCounters>() == CACHE_LINE_SIZE);
const _: () = assert!(std::mem::align_of::<PerProcessorCounters>() == CACHE_LINE_SIZE);

impl PerProcessorCounters {
    /// Adds `amount` to the processed count.
    ///
    /// Plain load and store, no read-modify-write: the owning processor is the only writer, so
    /// no update can be lost in between. Wraps on overflow.
    #[inline(always)]
    pub(crate) fn add(&self, amount: u64) {
        let current = self.processed.load(Ordering::Relaxed);
        self.processed.store(current.wrapping_add(amount), Ordering::Relaxed);
    }

    #[inline]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}
