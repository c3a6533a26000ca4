//! Typed access to the configuration subsystem.
//!
//! The binding core only ever asks a [`ConfigSource`] for typed values under a key path, the
//! way a driver queries its `Parameters` registry key. [`MemoryRegistry`] is the in-process
//! source used by hosts that keep their configuration in memory, and by tests.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Boolean value enabling random fault injection in debug builds.
pub const FAULT_INJECT_VALUE: &str = "XdpFaultInject";
/// DWORD value overriding the fast-path drain bound, in milliseconds.
pub const RUNDOWN_TIMEOUT_VALUE: &str = "RundownTimeoutMs";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Value {value} not found under {key}")]
    NotFound { key: String, value: String },
    #[error("Value {value} under {key} is {actual}, expected {expected}")]
    TypeMismatch { key: String, value: String, expected: &'static str, actual: &'static str },
    #[error("Configuration source unavailable: {0}")]
    Unavailable(String),
}

/// Called with the source whenever a watched key changes.
pub type WatchClient = Arc<dyn Fn(&dyn ConfigSource) + Send + Sync>;

/// A source of typed configuration values.
pub trait ConfigSource: fmt::Debug + Send + Sync {
    /// Reads a DWORD `value` under `key`.
    fn query_dword(&self, key: &str, value: &str) -> Result<u32, ConfigError>;

    /// Reads a boolean `value` under `key`. Any non-zero DWORD is `true`.
    fn query_bool(&self, key: &str, value: &str) -> Result<bool, ConfigError> {
        self.query_dword(key, value).map(|data| data != 0)
    }

    /// Registers `client` for change notifications on `key`. The registration lasts as long as
    /// the returned [`Watch`]. Sources without change notification return `None`.
    fn watch(&self, _key: &str, _client: WatchClient) -> Option<Watch> {
        None
    }
}

/// A change-notification registration. Dropping it unregisters the client.
pub struct Watch {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Watch {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch").field("active", &self.cancel.is_some()).finish()
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Values the binding reads from its configuration key at start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Parameters {
    /// Random fault injection requested through [`FAULT_INJECT_VALUE`]. Always `false` in
    /// release builds.
    pub fault_inject: bool,
    /// Drain bound requested through [`RUNDOWN_TIMEOUT_VALUE`], if present.
    pub rundown_timeout: Option<Duration>,
}

impl Parameters {
    /// Reads every parameter under `key`. Missing values fall back to their defaults.
    pub fn read(source: &dyn ConfigSource, key: &str) -> Result<Self, ConfigError> {
        let rundown_timeout = optional(source.query_dword(key, RUNDOWN_TIMEOUT_VALUE))?
            .map(|ms| Duration::from_millis(ms.into()));

        Ok(Self { fault_inject: read_fault_inject(source, key), rundown_timeout })
    }
}

/// Reads [`FAULT_INJECT_VALUE`]. Any failure, or a release build, means disabled.
pub(crate) fn read_fault_inject(source: &dyn ConfigSource, key: &str) -> bool {
    if !cfg!(debug_assertions) {
        return false;
    }

    match source.query_bool(key, FAULT_INJECT_VALUE) {
        Ok(enabled) => enabled,
        Err(e) => {
            tracing::trace!("Fault injection disabled: {e}");
            false
        }
    }
}

fn optional<T>(result: Result<T, ConfigError>) -> Result<Option<T>, ConfigError> {
    match result {
        Ok(data) => Ok(Some(data)),
        Err(ConfigError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// A typed registry value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegValue {
    Dword(u32),
    String(String),
}

impl RegValue {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::Dword(_) => "REG_DWORD",
            Self::String(_) => "REG_SZ",
        }
    }
}

/// An in-memory registry. Key paths and value names are case-insensitive.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    values: RwLock<FxHashMap<(String, String), RegValue>>,
    watcher: Arc<RegWatcher>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `data` and notifies every client watching `key`.
    pub fn set(&self, key: &str, value: &str, data: RegValue) {
        self.values.write().insert(entry(key, value), data);
        self.notify(key);
    }

    pub fn set_dword(&self, key: &str, value: &str, data: u32) {
        self.set(key, value, RegValue::Dword(data));
    }

    /// Deletes `value` under `key`, notifying watchers if it existed.
    pub fn remove(&self, key: &str, value: &str) -> Option<RegValue> {
        let removed = self.values.write().remove(&entry(key, value));
        if removed.is_some() {
            self.notify(key);
        }

        removed
    }

    /// Number of live watch registrations.
    pub fn watcher_count(&self) -> usize {
        self.watcher.clients.read().len()
    }

    fn notify(&self, key: &str) {
        // Clients run without any registry lock held so they can query us again.
        let clients: Vec<WatchClient> = self
            .watcher
            .clients
            .read()
            .iter()
            .filter(|entry| entry.key.eq_ignore_ascii_case(key))
            .map(|entry| Arc::clone(&entry.client))
            .collect();

        for client in clients {
            client(self);
        }
    }
}

impl ConfigSource for MemoryRegistry {
    fn query_dword(&self, key: &str, value: &str) -> Result<u32, ConfigError> {
        match self.values.read().get(&entry(key, value)) {
            Some(RegValue::Dword(data)) => Ok(*data),
            Some(other) => Err(ConfigError::TypeMismatch {
                key: key.to_string(),
                value: value.to_string(),
                expected: "REG_DWORD",
                actual: other.type_name(),
            }),
            None => Err(ConfigError::NotFound { key: key.to_string(), value: value.to_string() }),
        }
    }

    fn watch(&self, key: &str, client: WatchClient) -> Option<Watch> {
        let id = self.watcher.next_id.fetch_add(1, Ordering::Relaxed);
        self.watcher.clients.write().push(WatchEntry { id, key: key.to_string(), client });

        let watcher: Weak<RegWatcher> = Arc::downgrade(&self.watcher);
        Some(Watch::new(move || {
            if let Some(watcher) = watcher.upgrade() {
                watcher.clients.write().retain(|entry| entry.id != id);
            }
        }))
    }
}

fn entry(key: &str, value: &str) -> (String, String) {
    (key.to_ascii_lowercase(), value.to_ascii_lowercase())
}

#[derive(Default)]
struct RegWatcher {
    next_id: AtomicU64,
    clients: RwLock<Vec<WatchEntry>>,
}

impl fmt::Debug for RegWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegWatcher").field("clients", &self.clients.read().len()).finish()
    }
}

struct WatchEntry {
    id: u64,
    key: String,
    client: WatchClient,
}
