//! Binding lifecycle of the XDP lightweight filter.
//!
//! A [`BindingContext`] attaches the filter to one network interface. The host framework drives
//! it through [`driver::start`] and [`driver::stop`]; while it is bound, the fast path enters it
//! with [`BindingContext::enter`] to update the per-processor counters.

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use xdp_pcw::PcwError;

mod binding;
pub use binding::{ActiveBinding, BindingContext, BindingState};

pub mod config;
pub use config::{ConfigError, ConfigSource, MemoryRegistry, Parameters, RegValue, Watch};

pub mod driver;
pub use driver::DriverHandle;

mod fault;
pub use fault::{FaultInjection, FaultSite};

mod identity;
pub use identity::{BindingId, IdentityError, IdentitySource, OsRngIdentity};

pub mod interface;
pub use interface::{negotiate, ApiVersion, InterfaceConfig, InterfaceIdentity};

#[cfg(any(debug_assertions, feature = "diagnostics"))]
pub mod diagnostics;

pub use xdp_pcw::{CounterInstance, CounterSnapshot, CounterStore};

/// Default bound on how long stopping waits for in-flight fast-path operations.
pub const DEFAULT_RUNDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum LwfError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Binding identifier generation failed: {0}")]
    IdentityGenerationFailed(#[from] IdentityError),
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(&'static str),
}

impl From<PcwError> for LwfError {
    fn from(e: PcwError) -> Self {
        match e {
            PcwError::ResourceExhausted { processor_count } => {
                tracing::debug!(processor_count, "Counter store allocation failed");
                Self::ResourceExhausted("per-processor counter store")
            }
        }
    }
}

/// Options for a [`BindingContext`].
#[derive(Debug, Clone)]
pub struct LwfOptions {
    /// Number of counter slots. Defaults to the number of logical processors at start.
    pub processor_count: Option<usize>,
    /// Bound on the drain wait when stopping, unless the registry overrides it.
    pub rundown_timeout: Duration,
    pub fault_injection: FaultInjection,
    pub identity: Arc<dyn IdentitySource>,
}

impl LwfOptions {
    pub fn with_processor_count(mut self, processor_count: usize) -> Self {
        self.processor_count = Some(processor_count);
        self
    }

    pub fn with_rundown_timeout(mut self, timeout: Duration) -> Self {
        self.rundown_timeout = timeout;
        self
    }

    pub fn with_fault_injection(mut self, fault_injection: FaultInjection) -> Self {
        self.fault_injection = fault_injection;
        self
    }

    /// Sets the source binding identifiers are drawn from.
    pub fn with_identity_source(mut self, identity: Arc<dyn IdentitySource>) -> Self {
        self.identity = identity;
        self
    }
}

impl Default for LwfOptions {
    fn default() -> Self {
        Self {
            processor_count: None,
            rundown_timeout: DEFAULT_RUNDOWN_TIMEOUT,
            fault_injection: FaultInjection::Off,
            identity: Arc::new(OsRngIdentity),
        }
    }
}
