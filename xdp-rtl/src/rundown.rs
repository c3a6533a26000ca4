use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::{debug_invariant, fre_assert, FailFastCode, RefCount};

/// Rundown protection for state shared with the fast path.
///
/// While active, the rundown holds one bias reference of its own and hands out a
/// [`RundownGuard`] per in-flight operation. [`Rundown::disable`] refuses new guards and drops
/// the bias; once the last guard is gone the protected state can be released. The lock only
/// orders acquisition against disabling, guards are released without it.
#[derive(Debug)]
pub struct Rundown {
    run_down: Mutex<bool>,
    count: RefCount,
    drained: Condvar,
}

impl Rundown {
    /// Creates an active rundown.
    pub const fn new() -> Self {
        Self { run_down: Mutex::new(false), count: RefCount::new(), drained: Condvar::new() }
    }

    /// Creates a rundown that is already disabled and drained.
    pub const fn run_down() -> Self {
        Self { run_down: Mutex::new(true), count: RefCount::released(), drained: Condvar::new() }
    }

    /// Takes an in-flight reference, unless the rundown is disabled.
    #[inline]
    pub fn try_acquire(&self) -> Option<RundownGuard<'_>> {
        let run_down = self.run_down.lock();
        if *run_down {
            return None;
        }

        self.count.increment();

        Some(RundownGuard { rundown: self })
    }

    /// Refuses new references and drops the bias. Returns `true` if nothing was in flight.
    pub fn disable(&self) -> bool {
        let mut run_down = self.run_down.lock();
        debug_invariant(!*run_down);

        *run_down = true;
        self.count.decrement()
    }

    /// Blocks until every in-flight reference is released, or `timeout` elapses.
    ///
    /// Returns `true` if the rundown drained.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut run_down = self.run_down.lock();
        debug_invariant(*run_down);

        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while self.count.value() != 0 {
                self.drained.wait(&mut run_down);
            }
            return true;
        };

        while self.count.value() != 0 {
            if self.drained.wait_until(&mut run_down, deadline).timed_out() {
                return self.count.value() == 0;
            }
        }

        true
    }

    /// Re-activates a drained rundown.
    pub fn reinitialize(&self) {
        let mut run_down = self.run_down.lock();
        fre_assert(*run_down, FailFastCode::InvalidState);

        self.count.reinitialize();
        *run_down = false;
    }

    /// Returns `true` if new references are refused.
    pub fn is_run_down(&self) -> bool {
        *self.run_down.lock()
    }

    /// Number of references currently outstanding, including the bias while active.
    pub fn references(&self) -> i64 {
        self.count.value()
    }

    fn release(&self) {
        if self.count.decrement() {
            // Taken so the notification cannot slip between a waiter's check and its sleep.
            let _run_down = self.run_down.lock();
            self.drained.notify_all();
        }
    }
}

impl Default for Rundown {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-flight reference on a [`Rundown`], released on drop.
#[derive(Debug)]
#[must_use = "the reference is released as soon as the guard is dropped"]
pub struct RundownGuard<'a> {
    rundown: &'a Rundown,
}

impl Drop for RundownGuard<'_> {
    fn drop(&mut self) {
        self.rundown.release();
    }
}
