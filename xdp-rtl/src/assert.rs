use std::{fmt, panic::Location};

/// Code attached to an unrecoverable termination.
///
/// The first three values match the platform fast-fail codes so crash dumps read the same way
/// regardless of which layer detected the violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum FailFastCode {
    /// An argument or input violated the callee's contract.
    InvalidArg = 5,
    /// Deliberate termination requested by a diagnostic hook.
    FatalAppExit = 7,
    /// A reference count dropped below zero or was revived from zero.
    InvalidReferenceCount = 14,
    /// A lifecycle transition was attempted from a state that does not allow it.
    InvalidState = 0x100,
    /// In-flight operations failed to drain within the bounded wait.
    RundownTimeout = 0x101,
    /// A debug-only invariant did not hold.
    AssertionFailure = 0x102,
}

impl FailFastCode {
    /// Returns the numeric code.
    #[inline]
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for FailFastCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (0x{:x})", self, self.code())
    }
}

/// Terminates the process immediately. Nothing unwinds and no destructor runs.
#[cold]
#[inline(never)]
#[track_caller]
pub fn fail_fast(code: FailFastCode) -> ! {
    let location = Location::caller();
    tracing::error!(%code, %location, "Invariant violated, failing fast");

    std::process::abort()
}

/// Checks `condition` in every build and fails fast with `code` if it does not hold.
///
/// Only for invariants. Conditions the caller can recover from are reported as errors.
#[inline]
#[track_caller]
pub fn fre_assert(condition: bool, code: FailFastCode) {
    if !condition {
        fail_fast(code);
    }
}

/// Checks `condition` in debug builds only, halting at the violation site if it does not hold.
///
/// Release builds skip the check entirely.
#[inline(always)]
#[track_caller]
pub fn debug_invariant(condition: bool) {
    if cfg!(debug_assertions) && !condition {
        fail_fast(FailFastCode::AssertionFailure);
    }
}
