//! Fail-fast paths terminate the process, so each test reruns itself in a child process and
//! checks how the child died.

use std::{
    process::{Command, Stdio},
    sync::{Arc, OnceLock, Weak},
    time::Duration,
};

use xdp_lwf::{
    config::WatchClient, driver, BindingContext, ConfigError, ConfigSource, InterfaceIdentity,
    LwfOptions, MemoryRegistry, Watch,
};

use crate::{unbound, SERVICE};

const CHILD_ENV: &str = "XDP_LWF_FAILFAST_CHILD";

/// Runs `body` in a child process and asserts it aborts.
fn assert_fails_fast(test: &str, body: impl FnOnce()) {
    if std::env::var_os(CHILD_ENV).is_some() {
        body();
        return;
    }

    let status = Command::new(std::env::current_exe().unwrap())
        .args([test, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, "1")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap();

    assert!(!status.success(), "{test} completed without failing fast");

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        // SIGABRT
        assert_eq!(status.signal(), Some(6), "{test} exited with {status}");
    }
}

/// Stops the binding from inside its own start, while it is still starting.
#[derive(Debug, Default)]
struct StopDuringStart {
    registry: MemoryRegistry,
    binding: OnceLock<Weak<BindingContext>>,
}

impl ConfigSource for StopDuringStart {
    fn query_dword(&self, key: &str, value: &str) -> Result<u32, ConfigError> {
        if let Some(binding) = self.binding.get().and_then(Weak::upgrade) {
            binding.stop();
        }

        self.registry.query_dword(key, value)
    }

    fn watch(&self, key: &str, client: WatchClient) -> Option<Watch> {
        self.registry.watch(key, client)
    }
}

#[test]
fn stop_while_starting() {
    assert_fails_fast("failfast::stop_while_starting", || {
        let source = Arc::new(StopDuringStart::default());
        let binding = Arc::new(BindingContext::with_options(
            InterfaceIdentity::new(4, "eth0"),
            source.clone(),
            LwfOptions::default().with_processor_count(2),
        ));
        let _ = source.binding.set(Arc::downgrade(&binding));

        let _ = driver::start(&binding, &crate::driver(), SERVICE);
    });
}

#[test]
fn start_while_bound() {
    assert_fails_fast("failfast::start_while_bound", || {
        let (_, binding) = unbound(LwfOptions::default(), 2);
        driver::start(&binding, &crate::driver(), SERVICE).unwrap();

        let _ = driver::start(&binding, &crate::driver(), SERVICE);
    });
}

#[test]
fn drain_exceeding_rundown_timeout() {
    assert_fails_fast("failfast::drain_exceeding_rundown_timeout", || {
        let (_, binding) =
            unbound(LwfOptions::default().with_rundown_timeout(Duration::from_millis(50)), 2);
        driver::start(&binding, &crate::driver(), SERVICE).unwrap();

        let _active = binding.enter().unwrap();
        driver::stop(&binding);
    });
}

#[test]
fn increment_on_unknown_processor() {
    assert_fails_fast("failfast::increment_on_unknown_processor", || {
        let (_, binding) = unbound(LwfOptions::default(), 2);
        driver::start(&binding, &crate::driver(), SERVICE).unwrap();

        binding.enter().unwrap().increment(2, 1);
    });
}

#[test]
fn zero_processors() {
    assert_fails_fast("failfast::zero_processors", || {
        let (_, binding) = unbound(LwfOptions::default(), 0);

        let _ = driver::start(&binding, &crate::driver(), SERVICE);
    });
}

#[cfg(any(debug_assertions, feature = "diagnostics"))]
#[test]
fn diagnostic_hook() {
    assert_fails_fast("failfast::diagnostic_hook", || {
        xdp_lwf::diagnostics::force_fail_fast();
    });
}
