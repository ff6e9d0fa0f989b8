//! Engine configuration (§6, §9): a closed struct, not a string-keyed map.
//! Unknown fields are rejected at deserialisation; out-of-range values are
//! rejected at construction.

use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};
use crate::types::Effect;

/// Configuration consumed at engine construction. Every field is one of
/// §6's six enumerated knobs -- there is no escape hatch for additional,
/// string-keyed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct EngineConfig {
    pub cache_enabled: bool,
    pub cache_size: usize,
    pub cache_ttl_millis: u64,
    pub parallel_workers: usize,
    pub default_effect: Effect,
    pub max_scope_depth: usize,
}

impl EngineConfig {
    /// Validates the numeric bounds §6 requires (`cacheSize >= 1`,
    /// `parallelWorkers >= 1`, `maxScopeDepth >= 1`; `cacheTtlMillis` may be
    /// zero, meaning "no TTL").
    pub fn validate(&self) -> Result<()> {
        if self.cache_size == 0 {
            return Err(AuthzError::InvalidRequest("cacheSize must be at least 1".to_string()));
        }
        if self.parallel_workers == 0 {
            return Err(AuthzError::InvalidRequest("parallelWorkers must be at least 1".to_string()));
        }
        if self.max_scope_depth == 0 {
            return Err(AuthzError::InvalidRequest("maxScopeDepth must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_size: 100_000,
            cache_ttl_millis: 300_000,
            parallel_workers: num_cpus_fallback(),
            default_effect: Effect::Deny,
            max_scope_depth: 10,
        }
    }
}

/// `num_cpus` is a dev-dependency only; the engine's own default must not
/// depend on it, so this mirrors its `get()` behaviour with a safe fallback.
fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder(EngineConfig::default())
    }
}

/// Builds an [`EngineConfig`] one field at a time, validating only at
/// `build()` -- in the style of `rayon::ThreadPoolBuilder`, which this
/// crate's dispatcher already uses.
pub struct EngineConfigBuilder(EngineConfig);

impl EngineConfigBuilder {
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.0.cache_enabled = enabled;
        self
    }

    pub fn cache_size(mut self, size: usize) -> Self {
        self.0.cache_size = size;
        self
    }

    pub fn cache_ttl_millis(mut self, millis: u64) -> Self {
        self.0.cache_ttl_millis = millis;
        self
    }

    pub fn parallel_workers(mut self, workers: usize) -> Self {
        self.0.parallel_workers = workers;
        self
    }

    pub fn default_effect(mut self, effect: Effect) -> Self {
        self.0.default_effect = effect;
        self
    }

    pub fn max_scope_depth(mut self, depth: usize) -> Self {
        self.0.max_scope_depth = depth;
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        self.0.validate()?;
        Ok(self.0)
    }
}
