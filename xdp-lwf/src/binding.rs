use std::{
    fmt,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, error, info, warn};
use xdp_pcw::{CounterInstance, CounterSnapshot, CounterStore};
use xdp_rtl::{debug_invariant, fail_fast, FailFastCode, Rundown, RundownGuard};

use crate::{
    config::{read_fault_inject, ConfigSource, Parameters, Watch, WatchClient},
    fault::{FaultInjector, FaultSite},
    interface::{negotiate_with, InterfaceConfig, InterfaceIdentity},
    BindingId, DriverHandle, LwfError, LwfOptions,
};

/// Lifecycle of a binding: `Unbound → Starting → Bound → Stopping → Unbound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BindingState {
    Unbound = 0,
    Starting = 1,
    Bound = 2,
    Stopping = 3,
}

impl BindingState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Unbound,
            1 => Self::Starting,
            2 => Self::Bound,
            3 => Self::Stopping,
            _ => fail_fast(FailFastCode::InvalidState),
        }
    }
}

impl fmt::Display for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything a successful start publishes. Fields drop in declaration order, the reverse of
/// the order start creates them in.
#[derive(Debug)]
struct Attachment {
    config: InterfaceConfig,
    counters: CounterStore,
    id: BindingId,
    rundown_timeout: Duration,
    _watch: Option<Watch>,
}

/// One attachment of the filter to one network interface.
///
/// The host owns the context and serializes [`start`](Self::start) and [`stop`](Self::stop).
/// The fast path borrows it through [`enter`](Self::enter) for one operation at a time; every
/// such borrow is an in-flight reference that stopping waits out before it releases anything.
#[derive(Debug)]
pub struct BindingContext {
    interface: InterfaceIdentity,
    registry: Arc<dyn ConfigSource>,
    options: LwfOptions,
    faults: Arc<FaultInjector>,
    state: AtomicU8,
    /// In-flight fast-path references. Run down whenever the binding is not bound.
    rundown: Rundown,
    attachment: RwLock<Option<Attachment>>,
    /// Counter totals flushed by the last stop.
    last_snapshot: Mutex<Option<CounterSnapshot>>,
}

impl BindingContext {
    /// Creates an unbound context for `interface`, configured through `registry`.
    pub fn new(interface: InterfaceIdentity, registry: Arc<dyn ConfigSource>) -> Self {
        Self::with_options(interface, registry, LwfOptions::default())
    }

    pub fn with_options(
        interface: InterfaceIdentity,
        registry: Arc<dyn ConfigSource>,
        options: LwfOptions,
    ) -> Self {
        let faults = Arc::new(FaultInjector::new(options.fault_injection));

        Self {
            interface,
            registry,
            options,
            faults,
            state: AtomicU8::new(BindingState::Unbound as u8),
            rundown: Rundown::run_down(),
            attachment: RwLock::new(None),
            last_snapshot: Mutex::new(None),
        }
    }

    /// Binds to the interface using the configuration under `config_key`.
    ///
    /// Reads the configuration, generates the binding identifier, allocates the counter store
    /// and negotiates the interface configuration, in that order. If any step fails, the steps
    /// already completed are undone in reverse, the binding is unbound again and the error is
    /// returned.
    ///
    /// Starting a binding that is not unbound fails fast.
    pub fn start(&self, driver: &DriverHandle, config_key: &str) -> Result<(), LwfError> {
        self.transition(BindingState::Unbound, BindingState::Starting);

        let span = tracing::info_span!("start", %driver, interface = %self.interface);
        let _enter = span.enter();

        match self.attach(config_key) {
            Ok(attachment) => {
                let id = attachment.id;
                let processors = attachment.counters.processor_count();

                *self.attachment.write() = Some(attachment);
                self.rundown.reinitialize();
                self.transition(BindingState::Starting, BindingState::Bound);

                info!(%id, processors, "Binding started");
                Ok(())
            }
            Err(e) => {
                debug_invariant(self.attachment.read().is_none());
                self.faults.set_registry_enabled(false);
                self.transition(BindingState::Starting, BindingState::Unbound);

                warn!("Binding start failed and was rolled back: {e}");
                Err(e)
            }
        }
    }

    /// Runs the start steps. An early return drops whatever was already created, newest first.
    fn attach(&self, config_key: &str) -> Result<Attachment, LwfError> {
        let parameters = Parameters::read(&*self.registry, config_key)?;
        self.faults.set_registry_enabled(parameters.fault_inject);
        let watch = self.registry.watch(config_key, self.fault_inject_client(config_key));
        debug!(?parameters, watched = watch.is_some(), "Read binding parameters");

        let id = self.options.identity.generate()?;
        debug!(%id, "Generated binding identifier");

        self.faults.check(FaultSite::CounterStore)?;
        let counters = CounterStore::new(self.processor_count())?;

        let config = negotiate_with(&self.interface, &self.faults)?;

        let rundown_timeout = parameters.rundown_timeout.unwrap_or(self.options.rundown_timeout);

        Ok(Attachment { config, counters, id, rundown_timeout, _watch: watch })
    }

    /// Unbinds from the interface.
    ///
    /// Refuses new fast-path entries, waits for the ones in flight, flushes the counter totals
    /// and releases the counter store and interface configuration. Does nothing if the binding
    /// is already unbound. A drain that outlasts the rundown timeout fails fast, as does a stop
    /// issued while the binding is starting or stopping.
    pub fn stop(&self) {
        match self.state() {
            BindingState::Unbound => {
                debug!(interface = %self.interface, "Binding already unbound");
                return;
            }
            BindingState::Bound => {}
            state => {
                error!(%state, interface = %self.interface, "Stop requested mid-transition");
                fail_fast(FailFastCode::InvalidState);
            }
        }

        let span = tracing::info_span!("stop", interface = %self.interface);
        let _enter = span.enter();

        self.transition(BindingState::Bound, BindingState::Stopping);

        let timeout = self
            .attachment
            .read()
            .as_ref()
            .map_or(self.options.rundown_timeout, |attachment| attachment.rundown_timeout);

        if !self.rundown.disable() {
            debug!(in_flight = self.rundown.references(), "Waiting for the fast path to drain");

            if !self.rundown.wait(timeout) {
                error!(in_flight = self.rundown.references(), ?timeout, "Fast path failed to drain");
                fail_fast(FailFastCode::RundownTimeout);
            }
        }

        let Some(attachment) = self.attachment.write().take() else {
            fail_fast(FailFastCode::InvalidState);
        };

        let snapshot = attachment.counters.snapshot();
        info!(id = %attachment.id, processed = snapshot.total, "Binding stopped");
        *self.last_snapshot.lock() = Some(snapshot);

        drop(attachment);
        self.faults.set_registry_enabled(false);

        self.transition(BindingState::Stopping, BindingState::Unbound);
    }

    /// Enters the binding on the fast path.
    ///
    /// Returns `None` unless the binding is bound and not being stopped. The binding cannot be
    /// torn down while the returned guard is alive.
    #[inline]
    pub fn enter(&self) -> Option<ActiveBinding<'_>> {
        let rundown = self.rundown.try_acquire()?;

        // The rundown is re-armed just before the binding turns bound.
        if self.state() != BindingState::Bound {
            return None;
        }

        let attachment = RwLockReadGuard::try_map(self.attachment.read(), Option::as_ref)
            .unwrap_or_else(|_| fail_fast(FailFastCode::InvalidState));

        Some(ActiveBinding { attachment, _rundown: rundown })
    }

    #[inline]
    pub fn state(&self) -> BindingState {
        BindingState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn interface(&self) -> &InterfaceIdentity {
        &self.interface
    }

    /// Identifier of the current binding, if bound.
    pub fn id(&self) -> Option<BindingId> {
        self.attachment.read().as_ref().map(|attachment| attachment.id)
    }

    /// Sum of the per-processor counters, if bound.
    pub fn aggregate(&self) -> Option<u64> {
        self.attachment.read().as_ref().map(|attachment| attachment.counters.aggregate())
    }

    /// Per-processor counter instances, empty unless bound.
    pub fn instances(&self) -> Vec<CounterInstance> {
        self.attachment
            .read()
            .as_ref()
            .map(|attachment| attachment.counters.instances().collect())
            .unwrap_or_default()
    }

    /// Handle to the negotiated interface configuration, if bound.
    pub fn interface_config(&self) -> Option<InterfaceConfig> {
        self.attachment.read().as_ref().map(|attachment| attachment.config.clone())
    }

    /// Counter totals flushed by the most recent stop.
    pub fn last_snapshot(&self) -> Option<CounterSnapshot> {
        self.last_snapshot.lock().clone()
    }

    fn transition(&self, from: BindingState, to: BindingState) {
        if let Err(actual) =
            self.state.compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            error!(%from, %to, actual = %BindingState::from_raw(actual), "Illegal binding transition");
            fail_fast(FailFastCode::InvalidState);
        }

        tracing::trace!(%from, %to, "Binding transition");
    }

    fn processor_count(&self) -> usize {
        self.options.processor_count.unwrap_or_else(logical_processor_count)
    }

    /// Re-reads the fault injection switch whenever the configuration key changes.
    fn fault_inject_client(&self, config_key: &str) -> WatchClient {
        let faults = Arc::clone(&self.faults);
        let key = config_key.to_string();

        Arc::new(move |source: &dyn ConfigSource| {
            let enabled = read_fault_inject(source, &key);
            debug!(enabled, "Configuration changed, updated fault injection");
            faults.set_registry_enabled(enabled);
        })
    }
}

/// Logical processors configured on the host, including ones this process is not allowed to
/// run on. A fast path can be invoked on any of them.
pub(crate) fn logical_processor_count() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions.
        let configured = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
        if configured > 0 {
            return configured as usize;
        }

        warn!("Failed to query configured processors, falling back to available parallelism");
    }

    match std::thread::available_parallelism() {
        Ok(count) => count.get(),
        Err(e) => {
            warn!("Failed to query processor count, assuming one: {e}");
            1
        }
    }
}

impl Drop for BindingContext {
    fn drop(&mut self) {
        if self.state() == BindingState::Bound {
            warn!(interface = %self.interface, "Binding dropped while bound, stopping");
            self.stop();
        }
    }
}

/// A fast-path borrow of a bound [`BindingContext`]. Holds one in-flight reference.
#[derive(Debug)]
pub struct ActiveBinding<'a> {
    attachment: MappedRwLockReadGuard<'a, Attachment>,
    _rundown: RundownGuard<'a>,
}

impl ActiveBinding<'_> {
    #[inline]
    pub fn id(&self) -> BindingId {
        self.attachment.id
    }

    /// Adds `amount` to the counters of `processor`. The caller must be running on it.
    #[inline]
    pub fn increment(&self, processor: usize, amount: u64) {
        self.attachment.counters.increment(processor, amount);
    }

    #[inline]
    pub fn counters(&self) -> &CounterStore {
        &self.attachment.counters
    }

    #[inline]
    pub fn interface_config(&self) -> &InterfaceConfig {
        &self.attachment.config
    }
}
