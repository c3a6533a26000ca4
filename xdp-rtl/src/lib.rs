//! Runtime support shared by the XDP crates.
//!
//! * [`assert`] holds the two-tier invariant policy: [`debug_invariant`] for debug builds and
//!   [`fre_assert`] / [`fail_fast`] for every build.
//! * [`refcount`] and [`rundown`] implement the in-flight accounting used to quiesce the fast
//!   path before shared state is torn down.

pub mod assert;
pub use assert::{debug_invariant, fail_fast, fre_assert, FailFastCode};

pub mod refcount;
pub use refcount::RefCount;

pub mod rundown;
pub use rundown::{Rundown, RundownGuard};

/// Size of a cache line on every platform we build for.
pub const CACHE_LINE_SIZE: usize = 64;
