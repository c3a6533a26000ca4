mod drain;
mod failfast;

use std::sync::Arc;

use xdp_lwf::{BindingContext, DriverHandle, InterfaceIdentity, LwfOptions, MemoryRegistry};

/// Service key of the driver under test.
const SERVICE: &str = r"\Registry\Machine\System\CurrentControlSet\Services\xdp";

fn driver() -> DriverHandle {
    DriverHandle::new("xdp")
}

/// An unbound context with `processors` counter slots and its backing registry.
fn unbound(options: LwfOptions, processors: usize) -> (Arc<MemoryRegistry>, BindingContext) {
    let _ = tracing_subscriber::fmt::try_init();

    let registry = Arc::new(MemoryRegistry::new());
    let binding = BindingContext::with_options(
        InterfaceIdentity::new(4, "eth0"),
        registry.clone(),
        options.with_processor_count(processors),
    );

    (registry, binding)
}
