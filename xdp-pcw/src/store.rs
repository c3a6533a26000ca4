use xdp_rtl::{fail_fast, fre_assert, FailFastCode};

use crate::{PcwError, PerProcessorCounters};

/// One [`PerProcessorCounters`] slot per logical processor.
///
/// The processor count is fixed at creation. Dropping the store releases every slot; the
/// borrow on the store held by each fast-path caller keeps that from racing an update.
#[derive(Debug)]
pub struct CounterStore {
    slots: Box<[PerProcessorCounters]>,
}

impl CounterStore {
    /// Allocates `processor_count` zeroed slots, all or nothing.
    pub fn new(processor_count: usize) -> Result<Self, PcwError> {
        fre_assert(processor_count > 0, FailFastCode::InvalidArg);

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(processor_count)
            .map_err(|_| PcwError::ResourceExhausted { processor_count })?;
        slots.resize_with(processor_count, PerProcessorCounters::default);

        tracing::debug!(processor_count, "Created per-processor counter store");

        Ok(Self { slots: slots.into_boxed_slice() })
    }

    /// Number of processor slots.
    #[inline]
    pub fn processor_count(&self) -> usize {
        self.slots.len()
    }

    /// Adds `amount` to the slot of `processor`.
    ///
    /// The caller must be running on `processor`, or otherwise be its only writer. Nothing is
    /// locked. An index outside the store fails fast.
    #[inline]
    pub fn increment(&self, processor: usize, amount: u64) {
        match self.slots.get(processor) {
            Some(slot) => slot.add(amount),
            None => fail_fast(FailFastCode::InvalidArg),
        }
    }

    /// Returns the slot of `processor`, if it exists.
    #[inline]
    pub fn slot(&self, processor: usize) -> Option<&PerProcessorCounters> {
        self.slots.get(processor)
    }

    /// Sums every slot. Wraps on overflow.
    ///
    /// May run concurrently with [`CounterStore::increment`]. Each slot is read once, so the
    /// result is a sum of per-slot values observed at slightly different times.
    pub fn aggregate(&self) -> u64 {
        self.slots.iter().fold(0u64, |total, slot| total.wrapping_add(slot.processed()))
    }

    /// Enumerates the slots as named instances, `"CPU 0"`, `"CPU 1"`, and so on.
    pub fn instances(&self) -> impl Iterator<Item = CounterInstance> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(processor, slot)| CounterInstance { processor, processed: slot.processed() })
    }

    /// Reads every slot once and records the values along with their sum.
    pub fn snapshot(&self) -> CounterSnapshot {
        let per_processor: Vec<u64> = self.slots.iter().map(PerProcessorCounters::processed).collect();
        let total = per_processor.iter().fold(0u64, |total, value| total.wrapping_add(*value));

        CounterSnapshot { total, per_processor }
    }
}

impl Drop for CounterStore {
    fn drop(&mut self) {
        tracing::debug!(processor_count = self.slots.len(), "Released per-processor counter store");
    }
}

/// A single processor's counters as reported to a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterInstance {
    pub processor: usize,
    pub processed: u64,
}

impl CounterInstance {
    /// The instance name consumers see, `"CPU <index>"`.
    pub fn name(&self) -> String {
        format!("CPU {}", self.processor)
    }
}

/// Values read from every slot of a [`CounterStore`] in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub total: u64,
    pub per_processor: Vec<u64>,
}
