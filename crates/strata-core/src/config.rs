use std::sync::OnceLock;

use crate::dtype::DType;
use crate::error::{Error, Result};

// EngineConfig — Process-wide engine settings
//
// A small immutable settings record, installed at most once per process:
//
//   parallel_threshold  minimum number of independent lanes before an axis
//                       reduction fans out over the rayon pool
//   default_dtype       element kind used by constructors that take none
//
// `current()` falls back to `EngineConfig::from_env()` the first time it is
// read, so binaries may either call `install` early or rely on:
//
//   STRATA_PARALLEL_THRESHOLD=4096
//   STRATA_DEFAULT_DTYPE=f64

/// Environment variable overriding [`EngineConfig::parallel_threshold`].
pub const ENV_PARALLEL_THRESHOLD: &str = "STRATA_PARALLEL_THRESHOLD";
/// Environment variable overriding [`EngineConfig::default_dtype`].
pub const ENV_DEFAULT_DTYPE: &str = "STRATA_DEFAULT_DTYPE";

static CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Lanes needed before axis reductions run in parallel (default: 1024).
    pub parallel_threshold: usize,
    /// Element kind for constructors without an explicit one (default: F32).
    pub default_dtype: DType,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: 1024,
            default_dtype: DType::F32,
        }
    }
}

impl EngineConfig {
    /// Set the parallel lane threshold.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Set the default dtype.
    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.default_dtype = dtype;
        self
    }

    /// Defaults overridden by the `STRATA_*` environment variables.
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(raw) = lookup(ENV_PARALLEL_THRESHOLD) {
            match raw.trim().parse::<usize>() {
                Ok(v) => cfg.parallel_threshold = v,
                Err(_) => tracing::warn!(var = ENV_PARALLEL_THRESHOLD, value = %raw, "ignoring invalid value"),
            }
        }
        if let Some(raw) = lookup(ENV_DEFAULT_DTYPE) {
            match DType::parse(&raw) {
                Some(dt) => cfg.default_dtype = dt,
                None => tracing::warn!(var = ENV_DEFAULT_DTYPE, value = %raw, "ignoring invalid value"),
            }
        }
        cfg
    }
}

/// Install the process-wide configuration. Fails if one is already in
/// effect, including one created implicitly by [`current`].
pub fn install(cfg: EngineConfig) -> Result<()> {
    CONFIG
        .set(cfg)
        .map_err(|_| Error::msg("engine configuration already installed"))?;
    tracing::debug!(config = ?CONFIG.get(), "engine configuration installed");
    Ok(())
}

/// The configuration in effect.
pub fn current() -> &'static EngineConfig {
    CONFIG.get_or_init(EngineConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let cfg = EngineConfig::default()
            .with_parallel_threshold(8)
            .with_dtype(DType::F64);
        assert_eq!(cfg.parallel_threshold, 8);
        assert_eq!(cfg.default_dtype, DType::F64);
    }

    #[test]
    fn test_lookup_overrides_and_ignores_garbage() {
        let cfg = EngineConfig::from_lookup(|key| match key {
            ENV_PARALLEL_THRESHOLD => Some("16".to_string()),
            ENV_DEFAULT_DTYPE => Some("f64".to_string()),
            _ => None,
        });
        assert_eq!(cfg.parallel_threshold, 16);
        assert_eq!(cfg.default_dtype, DType::F64);

        let cfg = EngineConfig::from_lookup(|_| Some("nope".to_string()));
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn test_second_install_fails() {
        // the first call may race with other tests reading `current()`
        let _ = install(EngineConfig::default());
        assert!(install(EngineConfig::default()).is_err());
        assert!(current().parallel_threshold > 0);
    }
}
