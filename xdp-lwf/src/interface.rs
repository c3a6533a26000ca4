use std::{fmt, sync::Arc};

use crate::{
    fault::{FaultInjector, FaultSite},
    LwfError,
};

/// Version of the driver API exposed through [`InterfaceConfig`].
pub const DRIVER_API_VERSION: ApiVersion = ApiVersion { major: 1, minor: 0, patch: 0 };

/// The network interface a binding attaches to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceIdentity {
    pub if_index: u32,
    pub name: String,
}

impl InterfaceIdentity {
    pub fn new(if_index: u32, name: impl Into<String>) -> Self {
        Self { if_index, name: name.into() }
    }
}

impl fmt::Display for InterfaceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (ifindex {})", self.name, self.if_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Option table shared by every handle of this driver version. New options are appended, and
/// `size` tells a caller how much of the table it was built against.
#[derive(Debug)]
struct Dispatch {
    size: u32,
}

static DISPATCH: Dispatch = Dispatch { size: std::mem::size_of::<Dispatch>() as u32 };

#[derive(Debug)]
struct Details {
    interface: InterfaceIdentity,
    version: ApiVersion,
    dispatch: &'static Dispatch,
}

impl Drop for Details {
    fn drop(&mut self) {
        tracing::debug!(interface = %self.interface, "Released interface configuration");
    }
}

/// Opaque handle to the options negotiated for one interface.
///
/// The handle has no public fields and never changes once issued. Clones refer to the same
/// negotiated configuration.
#[derive(Debug, Clone)]
pub struct InterfaceConfig {
    details: Arc<Details>,
}

impl InterfaceConfig {
    /// The interface the options were negotiated for.
    pub fn interface(&self) -> &InterfaceIdentity {
        &self.details.interface
    }

    /// The driver API version the handle was issued under.
    pub fn driver_api_version(&self) -> ApiVersion {
        self.details.version
    }

    /// Size of the option table behind the handle.
    pub fn dispatch_size(&self) -> u32 {
        self.details.dispatch.size
    }

    /// Returns `true` if both handles expose the same options.
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.details.version == other.details.version &&
            self.details.dispatch.size == other.details.dispatch.size &&
            self.details.interface == other.details.interface
    }

    /// Returns `true` if both values are clones of one handle.
    pub fn same_handle(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.details, &other.details)
    }
}

/// Negotiates the options for `interface`.
///
/// No option can be refused yet, so the only failure is running out of resources.
pub fn negotiate(interface: &InterfaceIdentity) -> Result<InterfaceConfig, LwfError> {
    negotiate_with(interface, &FaultInjector::default())
}

pub(crate) fn negotiate_with(
    interface: &InterfaceIdentity,
    faults: &FaultInjector,
) -> Result<InterfaceConfig, LwfError> {
    faults.check(FaultSite::InterfaceConfig)?;

    let details =
        Details { interface: interface.clone(), version: DRIVER_API_VERSION, dispatch: &DISPATCH };
    tracing::debug!(%interface, version = %details.version, "Negotiated interface configuration");

    Ok(InterfaceConfig { details: Arc::new(details) })
}
