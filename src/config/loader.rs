//! Config struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables
//! 3. `.revq.toml` in the working directory
//! 4. `~/.config/revq/config.toml` (global defaults)
//! 5. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::constants;
use crate::env::Env;
use crate::models::ProviderName;

/// Errors during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub admission: AdmissionConfig,
    pub retry: RetryConfig,
    pub analyzer: AnalyzerConfig,
    pub host: HostConfig,
}

/// Rate limiting and result caching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Requests allowed per client within one window.
    pub rate_limit: u32,
    pub rate_window_secs: u64,
    /// Lifetime of cached completed reviews.
    pub cache_ttl_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            rate_limit: constants::DEFAULT_RATE_LIMIT,
            rate_window_secs: constants::DEFAULT_RATE_WINDOW.as_secs(),
            cache_ttl_secs: constants::DEFAULT_CACHE_TTL.as_secs(),
        }
    }
}

impl AdmissionConfig {
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Attempt budget and backoff tuning for the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub analyze_timeout_secs: u64,
    pub max_concurrent_files: usize,
    pub workers: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            initial_backoff_secs: constants::DEFAULT_INITIAL_BACKOFF.as_secs(),
            max_backoff_secs: constants::DEFAULT_MAX_BACKOFF.as_secs(),
            analyze_timeout_secs: constants::DEFAULT_ANALYZE_TIMEOUT.as_secs(),
            max_concurrent_files: constants::DEFAULT_MAX_CONCURRENT_FILES,
            workers: constants::DEFAULT_WORKERS,
        }
    }
}

impl RetryConfig {
    /// Project into the executor's runtime tunables.
    pub fn executor_config(&self, cache_ttl: Duration) -> crate::executor::ExecutorConfig {
        crate::executor::ExecutorConfig {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_secs(self.initial_backoff_secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            analyze_timeout: Duration::from_secs(self.analyze_timeout_secs),
            max_concurrent_files: self.max_concurrent_files,
            cache_ttl,
        }
    }
}

/// LLM analyzer configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub name: ProviderName,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            name: ProviderName::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

/// VCS host configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Token for private repositories.
    pub github_token: Option<String>,
}

impl std::fmt::Debug for HostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostConfig")
            .field(
                "github_token",
                &self.github_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Config {
    /// Load configuration with proper layering.
    ///
    /// Reads from global config, directory-local config, then applies
    /// environment variable overrides.
    pub fn load(local_root: Option<&Path>, env: &Env) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Layer 4: global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let global = Self::load_file(&global_path)?;
                config.merge(global);
            }
        }

        // Layer 3: local config
        if let Some(root) = local_root {
            let local_path = root.join(constants::CONFIG_FILENAME);
            if local_path.exists() {
                let local = Self::load_file(&local_path)?;
                config.merge(local);
            }
        }

        // Layer 2: environment variables
        config.apply_env_vars(env);

        Ok(config)
    }

    /// Load a config from a specific file.
    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the global config file path.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(constants::CONFIG_DIR).join("config.toml"))
    }

    /// Merge another config into this one (other takes precedence for non-default values).
    fn merge(&mut self, other: Config) {
        let default_admission = AdmissionConfig::default();
        if other.admission.rate_limit != default_admission.rate_limit {
            self.admission.rate_limit = other.admission.rate_limit;
        }
        if other.admission.rate_window_secs != default_admission.rate_window_secs {
            self.admission.rate_window_secs = other.admission.rate_window_secs;
        }
        if other.admission.cache_ttl_secs != default_admission.cache_ttl_secs {
            self.admission.cache_ttl_secs = other.admission.cache_ttl_secs;
        }

        let default_retry = RetryConfig::default();
        if other.retry.max_attempts != default_retry.max_attempts {
            self.retry.max_attempts = other.retry.max_attempts;
        }
        if other.retry.initial_backoff_secs != default_retry.initial_backoff_secs {
            self.retry.initial_backoff_secs = other.retry.initial_backoff_secs;
        }
        if other.retry.max_backoff_secs != default_retry.max_backoff_secs {
            self.retry.max_backoff_secs = other.retry.max_backoff_secs;
        }
        if other.retry.analyze_timeout_secs != default_retry.analyze_timeout_secs {
            self.retry.analyze_timeout_secs = other.retry.analyze_timeout_secs;
        }
        if other.retry.max_concurrent_files != default_retry.max_concurrent_files {
            self.retry.max_concurrent_files = other.retry.max_concurrent_files;
        }
        if other.retry.workers != default_retry.workers {
            self.retry.workers = other.retry.workers;
        }

        let default_analyzer = AnalyzerConfig::default();
        if other.analyzer.name != default_analyzer.name {
            self.analyzer.name = other.analyzer.name;
        }
        if other.analyzer.model != default_analyzer.model {
            self.analyzer.model = other.analyzer.model;
        }
        if other.analyzer.base_url.is_some() {
            self.analyzer.base_url = other.analyzer.base_url;
        }
        if other.analyzer.api_key.is_some() {
            self.analyzer.api_key = other.analyzer.api_key;
        }

        if other.host.github_token.is_some() {
            self.host.github_token = other.host.github_token;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_vars(&mut self, env: &Env) {
        if let Ok(val) = env.var(constants::ENV_PROVIDER) {
            if let Ok(name) = val.parse::<ProviderName>() {
                self.analyzer.name = name;
            } else {
                eprintln!(
                    "Warning: ignoring invalid {} value: {val}",
                    constants::ENV_PROVIDER
                );
            }
        }
        if let Ok(val) = env.var(constants::ENV_MODEL) {
            self.analyzer.model = val;
        }
        if let Ok(val) = env.var(constants::ENV_BASE_URL) {
            self.analyzer.base_url = Some(val);
        }

        // Provider-specific API key resolution
        let api_key = env
            .var(constants::ENV_API_KEY)
            .or_else(|_| env.var(self.analyzer.name.api_key_env_var()))
            .ok();
        if api_key.is_some() {
            self.analyzer.api_key = api_key;
        }

        if let Ok(val) = env.var(constants::ENV_GITHUB_TOKEN) {
            self.host.github_token = Some(val);
        }

        self.apply_numeric_env(env, constants::ENV_RATE_LIMIT, |config, n| {
            config.admission.rate_limit = n as u32;
        });
        self.apply_numeric_env(env, constants::ENV_RATE_WINDOW_SECS, |config, n| {
            config.admission.rate_window_secs = n;
        });
        self.apply_numeric_env(env, constants::ENV_CACHE_TTL_SECS, |config, n| {
            config.admission.cache_ttl_secs = n;
        });
        self.apply_numeric_env(env, constants::ENV_MAX_ATTEMPTS, |config, n| {
            config.retry.max_attempts = n as u32;
        });
    }

    fn apply_numeric_env(&mut self, env: &Env, name: &str, apply: impl FnOnce(&mut Self, u64)) {
        if let Ok(val) = env.var(name) {
            match val.parse::<u64>() {
                Ok(n) => apply(self, n),
                Err(_) => eprintln!("Warning: ignoring invalid {name} value: {val}"),
            }
        }
    }
}
