//! Per-processor counters for the XDP fast path.
//!
//! Every logical processor owns one cache-line sized [`PerProcessorCounters`] slot and is its
//! only writer, so updates never contend and never share a line with another processor. Reads
//! go through [`CounterStore::aggregate`] or [`CounterStore::snapshot`] on the slow path and see
//! each slot at some recent point in time, not one global instant.

use thiserror::Error;

mod counters;
pub use counters::PerProcessorCounters;

mod store;
pub use store::{CounterInstance, CounterSnapshot, CounterStore};

pub use xdp_rtl::CACHE_LINE_SIZE;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PcwError {
    #[error("Resource exhausted: cannot allocate counters for {processor_count} processors")]
    ResourceExhausted { processor_count: usize },
}
