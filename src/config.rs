//! Runtime configuration
//!
//! Sources, lowest priority first:
//! 1. built-in defaults
//! 2. a TOML file: `--config <path>` / `JURIST_CONFIG_PATH`, else `jurist.toml` if present
//! 3. `JURIST_*` environment variables (a `.env` file is loaded first)
//! 4. values set programmatically on [`ConfigBuilder`]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on background worker threads
    pub max_workers: usize,

    /// A worker with no tasks for this long retires
    pub worker_idle_ttl_ms: u64,

    /// How long an idle worker blocks waiting for a new task
    pub worker_poll_timeout_ms: u64,

    /// `wait` sleeps once every this many polls
    pub wait_sleep_every: u32,

    pub wait_sleep_us: u64,

    /// Maximum procedure call depth
    pub recursion_limit: usize,

    /// Re-raise host panics instead of converting them to errors
    pub debug: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            worker_idle_ttl_ms: 5_000,
            worker_poll_timeout_ms: 50,
            wait_sleep_every: 64,
            wait_sleep_us: 200,
            recursion_limit: 512,
            debug: false,
        }
    }
}

impl RuntimeConfig {
    /// Load from the default sources
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be at least 1".into()));
        }
        if self.recursion_limit == 0 {
            return Err(ConfigError::Invalid(
                "recursion_limit must be at least 1".into(),
            ));
        }
        if self.wait_sleep_every == 0 {
            return Err(ConfigError::Invalid(
                "wait_sleep_every must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/* ===================== Builder ===================== */

#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    use_env: bool,
    max_workers: Option<usize>,
    recursion_limit: Option<usize>,
    worker_idle_ttl_ms: Option<u64>,
    debug: Option<bool>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            config_path: None,
            use_env: true,
            max_workers: None,
            recursion_limit: None,
            worker_idle_ttl_ms: None,
            debug: None,
        }
    }
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Ignore `.env` and `JURIST_*` variables
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = Some(limit);
        self
    }

    pub fn worker_idle_ttl_ms(mut self, ttl: u64) -> Self {
        self.worker_idle_ttl_ms = Some(ttl);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        if self.use_env {
            dotenvy::dotenv().ok();
        }

        let path = self.config_path.or_else(|| {
            self.use_env
                .then(|| std::env::var("JURIST_CONFIG_PATH").ok())
                .flatten()
                .map(PathBuf::from)
        });

        let mut sources = config::Config::builder();
        sources = match &path {
            Some(path) => sources.add_source(config::File::from(path.as_path()).required(true)),
            None => sources.add_source(config::File::with_name("jurist").required(false)),
        };
        if self.use_env {
            sources = sources.add_source(config::Environment::with_prefix("JURIST").try_parsing(true));
        }

        let mut config: RuntimeConfig = sources.build()?.try_deserialize()?;

        if let Some(max_workers) = self.max_workers {
            config.max_workers = max_workers;
        }
        if let Some(limit) = self.recursion_limit {
            config.recursion_limit = limit;
        }
        if let Some(ttl) = self.worker_idle_ttl_ms {
            config.worker_idle_ttl_ms = ttl;
        }
        if let Some(debug) = self.debug {
            config.debug = debug;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_toml(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("jurist-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::builder().without_env().build().unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.recursion_limit, 512);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = temp_toml("max_workers = 2\nwait_sleep_us = 10\ndebug = true\n");
        let config = RuntimeConfig::builder()
            .without_env()
            .config_path(Some(path.clone()))
            .build()
            .unwrap();
        fs::remove_file(path).ok();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.wait_sleep_us, 10);
        assert!(config.debug);
        assert_eq!(config.recursion_limit, 512);
    }

    #[test]
    fn test_builder_wins_over_file() {
        let path = temp_toml("recursion_limit = 64\n");
        let config = RuntimeConfig::builder()
            .without_env()
            .config_path(Some(path.clone()))
            .recursion_limit(8)
            .build()
            .unwrap();
        fs::remove_file(path).ok();
        assert_eq!(config.recursion_limit, 8);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let missing = std::env::temp_dir().join("jurist-does-not-exist.toml");
        let result = RuntimeConfig::builder()
            .without_env()
            .config_path(Some(missing))
            .build();
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let result = RuntimeConfig::builder().without_env().max_workers(0).build();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
