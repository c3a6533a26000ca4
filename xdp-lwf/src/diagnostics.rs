//! Hooks for exercising crash handling. Compiled into debug builds, or with the `diagnostics`
//! feature.

use xdp_rtl::{fail_fast, FailFastCode};

/// Terminates the process through the fail-fast path, as an unrecoverable driver error would.
#[cold]
pub fn force_fail_fast() -> ! {
    tracing::warn!("Diagnostic fail-fast requested");

    fail_fast(FailFastCode::FatalAppExit)
}
