//! Configuration types for the bridge.

use serde::Deserialize;

/// Bridge behavior switches.
///
/// Deserializes from the `[bridge]` table of `ferry.toml`; missing keys take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Send interned strings already held by the foreign side as references.
    /// When disabled every string is copied.
    /// Default: true
    pub intern_fast_path: bool,

    /// Fix the per-position tags of an auto-signature binding from the
    /// method's declared parameter types at bind time.
    /// Default: true
    pub stabilize_auto_signatures: bool,

    /// Convert panics in managed targets into faulted calls.
    /// Default: true
    pub catch_panics: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            intern_fast_path: true,
            stabilize_auto_signatures: true,
            catch_panics: true,
        }
    }
}

impl BridgeConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config that copies every string and infers every auto argument per call.
    pub fn conservative() -> Self {
        Self {
            intern_fast_path: false,
            stabilize_auto_signatures: false,
            ..Default::default()
        }
    }

    pub fn intern_fast_path(mut self, enabled: bool) -> Self {
        self.intern_fast_path = enabled;
        self
    }

    pub fn stabilize_auto_signatures(mut self, enabled: bool) -> Self {
        self.stabilize_auto_signatures = enabled;
        self
    }

    pub fn catch_panics(mut self, enabled: bool) -> Self {
        self.catch_panics = enabled;
        self
    }
}
