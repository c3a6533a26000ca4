//! Entry points the host framework calls to attach and detach the filter.

use std::fmt;

use tracing::info;

use crate::{BindingContext, LwfError};

/// Name of the subkey holding the driver's parameters.
pub const PARAMETERS_SUBKEY: &str = "Parameters";

/// The loaded driver, as handed to the filter by the host framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverHandle {
    name: String,
}

impl DriverHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DriverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The parameters key under a driver's service `registry_path`.
pub fn parameters_key(registry_path: &str) -> String {
    format!("{}\\{PARAMETERS_SUBKEY}", registry_path.trim_end_matches('\\'))
}

/// Attaches `binding` to its interface, reading configuration from the parameters key under
/// the driver's `registry_path`.
pub fn start(
    binding: &BindingContext,
    driver: &DriverHandle,
    registry_path: &str,
) -> Result<(), LwfError> {
    info!(%driver, interface = %binding.interface(), "Starting binding");

    binding.start(driver, &parameters_key(registry_path))
}

/// Detaches `binding` from its interface. Does nothing if it is not attached.
pub fn stop(binding: &BindingContext) {
    info!(interface = %binding.interface(), state = %binding.state(), "Stopping binding");

    binding.stop();
}
