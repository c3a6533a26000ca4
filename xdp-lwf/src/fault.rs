use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;

use crate::LwfError;

/// Odds of an injected failure when enabled through the registry.
const REGISTRY_ONE_IN: u32 = 100;

/// A point in the start sequence where a failure can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultSite {
    /// Allocation of the per-processor counter store.
    CounterStore,
    /// Negotiation of the interface configuration handle.
    InterfaceConfig,
}

impl FaultSite {
    const fn resource(self) -> &'static str {
        match self {
            Self::CounterStore => "per-processor counter store",
            Self::InterfaceConfig => "interface configuration",
        }
    }
}

/// How failures are injected into the start sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FaultInjection {
    /// Only the registry can enable injection, and only in debug builds.
    #[default]
    Off,
    /// Every site fails with odds of one in `one_in`.
    Random { one_in: u32 },
    /// The given site always fails.
    Site(FaultSite),
}

#[derive(Debug, Default)]
pub(crate) struct FaultInjector {
    mode: FaultInjection,
    registry_enabled: AtomicBool,
}

impl FaultInjector {
    pub(crate) fn new(mode: FaultInjection) -> Self {
        Self { mode, registry_enabled: AtomicBool::new(false) }
    }

    pub(crate) fn set_registry_enabled(&self, enabled: bool) {
        self.registry_enabled.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn registry_enabled(&self) -> bool {
        self.registry_enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn should_fail(&self, site: FaultSite) -> bool {
        let fail = match self.mode {
            FaultInjection::Site(target) => target == site,
            FaultInjection::Random { one_in } => roll(one_in),
            FaultInjection::Off => self.registry_enabled() && roll(REGISTRY_ONE_IN),
        };

        if fail {
            tracing::warn!(?site, "Injecting fault");
        }

        fail
    }

    /// Fails with [`LwfError::ResourceExhausted`] if a fault is injected at `site`.
    pub(crate) fn check(&self, site: FaultSite) -> Result<(), LwfError> {
        if self.should_fail(site) {
            return Err(LwfError::ResourceExhausted(site.resource()));
        }

        Ok(())
    }
}

fn roll(one_in: u32) -> bool {
    one_in != 0 && rand::thread_rng().gen_range(0..one_in) == 0
}
