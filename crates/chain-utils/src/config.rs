//! Engine configuration

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Invalid configuration value
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_steps must be greater than 0")]
    ZeroMaxSteps,

    #[error("cache_ttl must be greater than 0")]
    ZeroCacheTtl,

    #[error("cache_key_prefix must not be empty")]
    EmptyKeyPrefix,
}

/// Configuration for the execution engine and its result cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long a cached result stays retrievable
    pub cache_ttl: Duration,

    /// Prefix of generated cache keys
    pub cache_key_prefix: String,

    /// Record count above which a result counts as large
    pub large_result_threshold: usize,

    /// Records included in a cached result's summary snippet
    pub snippet_len: usize,

    /// Longest batch accepted by the executor
    pub max_steps: usize,

    /// Delete every cache entry a run created once the run ends; turn off
    /// to let a later turn reference preserved intermediate results
    pub cleanup_on_completion: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(30 * 60),
            cache_key_prefix: "fc_".to_string(),
            large_result_threshold: 20,
            snippet_len: 3,
            max_steps: 10,
            cleanup_on_completion: true,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load overrides from `CHAIN_*` environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(secs) = env_parse::<u64>("CHAIN_CACHE_TTL_SECS")? {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Ok(prefix) = std::env::var("CHAIN_CACHE_KEY_PREFIX") {
            config.cache_key_prefix = prefix;
        }
        if let Some(threshold) = env_parse::<usize>("CHAIN_LARGE_RESULT_THRESHOLD")? {
            config.large_result_threshold = threshold;
        }
        if let Some(max_steps) = env_parse::<usize>("CHAIN_MAX_STEPS")? {
            config.max_steps = max_steps;
        }
        if let Some(cleanup) = env_parse::<bool>("CHAIN_CLEANUP_ON_COMPLETION")? {
            config.cleanup_on_completion = cleanup;
        }

        config.validate().context("invalid engine configuration from environment")?;
        debug!("Engine configuration from environment: {:?}", config);
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::ZeroMaxSteps);
        }
        if self.cache_ttl.is_zero() {
            return Err(ConfigError::ZeroCacheTtl);
        }
        if self.cache_key_prefix.is_empty() {
            return Err(ConfigError::EmptyKeyPrefix);
        }
        Ok(())
    }
}

fn env_parse<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{name} has invalid value '{raw}'")),
        Err(_) => Ok(None),
    }
}

/// Builder for EngineConfig
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    cache_ttl: Option<Duration>,
    cache_key_prefix: Option<String>,
    large_result_threshold: Option<usize>,
    snippet_len: Option<usize>,
    max_steps: Option<usize>,
    cleanup_on_completion: Option<bool>,
}

impl EngineConfigBuilder {
    /// Set the cache entry lifespan
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Set the cache key prefix
    pub fn cache_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_key_prefix = Some(prefix.into());
        self
    }

    /// Set the large-result threshold
    pub fn large_result_threshold(mut self, threshold: usize) -> Self {
        self.large_result_threshold = Some(threshold);
        self
    }

    /// Set the summary snippet length
    pub fn snippet_len(mut self, len: usize) -> Self {
        self.snippet_len = Some(len);
        self
    }

    /// Set the maximum batch length
    pub fn max_steps(mut self, max: usize) -> Self {
        self.max_steps = Some(max);
        self
    }

    /// Enable or disable post-run cache cleanup
    pub fn cleanup_on_completion(mut self, cleanup: bool) -> Self {
        self.cleanup_on_completion = Some(cleanup);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let defaults = EngineConfig::default();

        let config = EngineConfig {
            cache_ttl: self.cache_ttl.unwrap_or(defaults.cache_ttl),
            cache_key_prefix: self.cache_key_prefix.unwrap_or(defaults.cache_key_prefix),
            large_result_threshold: self
                .large_result_threshold
                .unwrap_or(defaults.large_result_threshold),
            snippet_len: self.snippet_len.unwrap_or(defaults.snippet_len),
            max_steps: self.max_steps.unwrap_or(defaults.max_steps),
            cleanup_on_completion: self
                .cleanup_on_completion
                .unwrap_or(defaults.cleanup_on_completion),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_key_prefix, "fc_");
        assert_eq!(config.max_steps, 10);
        assert!(config.cleanup_on_completion);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::builder()
            .max_steps(4)
            .cache_ttl(Duration::from_secs(5))
            .cleanup_on_completion(false)
            .build()
            .unwrap();

        assert_eq!(config.max_steps, 4);
        assert_eq!(config.cache_ttl, Duration::from_secs(5));
        assert!(!config.cleanup_on_completion);
        assert_eq!(config.snippet_len, 3);
    }

    #[test]
    fn test_validation_rejects_zero_steps() {
        let err = EngineConfig::builder().max_steps(0).build().unwrap_err();
        assert_eq!(err, ConfigError::ZeroMaxSteps);
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        unsafe {
            std::env::set_var("CHAIN_MAX_STEPS", "many");
        }
        let err = EngineConfig::from_env().unwrap_err();
        unsafe {
            std::env::remove_var("CHAIN_MAX_STEPS");
        }
        assert!(err.to_string().contains("CHAIN_MAX_STEPS"));
    }

    #[test]
    fn test_serde_round_trip() {
        let config = EngineConfig::builder().snippet_len(5).build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validation_rejects_empty_prefix() {
        let config = EngineConfig {
            cache_key_prefix: String::new(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyKeyPrefix));
    }
}
