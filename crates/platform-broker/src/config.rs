//! Broker configuration
//!
//! Topic matching (`.` delimiter, `*` and `#` wildcards) is fixed. The only
//! tunables concern listener leak detection.

use serde::{Deserialize, Serialize};

/// Default number of registrations on one pattern before a leak warning.
pub const DEFAULT_MAX_LISTENERS: usize = 10;

/// Broker configuration.
///
/// Deserializable with every field optional, so host applications can embed
/// it in their own configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Registrations on a single pattern above which a warning is logged.
    /// `0` disables the check.
    pub max_listeners: usize,

    /// Log a warning when `max_listeners` is exceeded (default: true).
    pub verbose_memory_leak: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_listeners: DEFAULT_MAX_LISTENERS,
            verbose_memory_leak: true,
        }
    }
}

impl BrokerConfig {
    /// Set the per-pattern listener threshold.
    pub fn with_max_listeners(mut self, max_listeners: usize) -> Self {
        self.max_listeners = max_listeners;
        self
    }

    /// Enable or disable the leak warning.
    pub fn with_verbose_memory_leak(mut self, enabled: bool) -> Self {
        self.verbose_memory_leak = enabled;
        self
    }

    /// Whether `count` registrations on one pattern should trigger a warning.
    pub(crate) fn exceeds_max_listeners(&self, count: usize) -> bool {
        self.verbose_memory_leak && self.max_listeners > 0 && count > self.max_listeners
    }
}
