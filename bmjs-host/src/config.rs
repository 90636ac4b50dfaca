//! Host configuration.

use bmjs_engine::RealmConfig;

/// Host-side settings for a context.
#[derive(Debug, Clone, Copy)]
pub struct HostConfig {
    /// Milliseconds for `Date.now()` and `performance.now()`.
    pub clock: fn() -> f64,
    /// Maximum nesting of script function calls.
    pub max_call_depth: usize,
    /// Heap bytes allocated between automatic collections.
    pub gc_threshold: usize,
}

/// No time source: always zero.
pub fn no_clock() -> f64 {
    0.0
}

impl Default for HostConfig {
    fn default() -> Self {
        let realm = RealmConfig::default();
        Self {
            clock: no_clock,
            max_call_depth: realm.max_call_depth,
            gc_threshold: realm.gc_threshold,
        }
    }
}

impl HostConfig {
    /// The engine half of the configuration.
    pub fn realm_config(&self) -> RealmConfig {
        RealmConfig {
            max_call_depth: self.max_call_depth,
            gc_threshold: self.gc_threshold,
        }
    }
}
