//! # Generation Configuration Module
//!
//! This module defines configuration structures for shopping-list generation,
//! including provider recovery settings, cache hygiene, job lifecycle and
//! quantity validation parameters.

use log::warn;
use std::env;
use std::time::Duration;

// Constants for generation configuration
pub const DEFAULT_PROVIDER_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_PROVIDER_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_DEADBAND_RATIO: f64 = 1.25;
pub const MAX_PROVIDER_RETRIES: u32 = 1;
pub const DEFAULT_CACHE_DIR: &str = ".shopping-list-cache";

/// Recovery configuration for the text-generation provider
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Retries after the first failed attempt (clamped to `MAX_PROVIDER_RETRIES`)
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Timeout for a single provider call in seconds
    pub operation_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_retry_delay_ms: 500,
            max_retry_delay_ms: 5000,
            operation_timeout_secs: 30,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

impl RecoveryConfig {
    /// Retries actually allowed, never more than one before falling back
    pub fn effective_retries(&self) -> u32 {
        self.max_retries.min(MAX_PROVIDER_RETRIES)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Connection settings for the text-generation provider
#[derive(Clone)]
pub struct ProviderConfig {
    /// API key; AI classification is disabled when absent
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible chat-completions API
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Recovery and error handling configuration
    pub recovery: RecoveryConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_PROVIDER_BASE_URL.to_string(),
            model: DEFAULT_PROVIDER_MODEL.to_string(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("recovery", &self.recovery)
            .finish()
    }
}

/// Cache hygiene settings
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Entries older than this read as misses. `None` keeps entries until invalidated.
    pub ttl_secs: Option<u64>,
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Job lifecycle settings
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Deadline for a whole generation job, provider call included
    pub job_timeout_secs: u64,
    /// How long terminal jobs stay queryable for late pollers
    pub history_retention_secs: u64,
    /// How long `generate` waits for a job before answering "processing"
    pub sync_wait_ms: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: 90,
            history_retention_secs: 300, // 5 minutes
            sync_wait_ms: 0,
        }
    }
}

impl JobConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn history_retention(&self) -> Duration {
        Duration::from_secs(self.history_retention_secs)
    }

    pub fn sync_wait(&self) -> Duration {
        Duration::from_millis(self.sync_wait_ms)
    }

    /// How often the background reaper sweeps job history
    pub fn reaper_interval(&self) -> Duration {
        (self.history_retention() / 2).clamp(Duration::from_millis(250), Duration::from_secs(60))
    }
}

/// Quantity target checking
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Largest tolerated `actual / target` ratio, inclusive
    pub deadband_ratio: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            deadband_ratio: DEFAULT_DEADBAND_RATIO,
        }
    }
}

/// Configuration structure for shopping-list generation
#[derive(Debug, Clone, Default)]
pub struct GenerationConfig {
    pub provider: ProviderConfig,
    pub cache: CacheConfig,
    pub jobs: JobConfig,
    pub validation: ValidationConfig,
}

impl GenerationConfig {
    /// Build a configuration from defaults overridden by environment variables.
    ///
    /// Call `dotenv::dotenv().ok()` first to pick up a local `.env` file.
    /// Unparseable numeric values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.provider.api_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        if let Ok(url) = env::var("SHOPPING_LIST_PROVIDER_URL") {
            config.provider.base_url = url;
        }
        if let Ok(model) = env::var("SHOPPING_LIST_PROVIDER_MODEL") {
            config.provider.model = model;
        }

        let recovery = &mut config.provider.recovery;
        override_from_env("SHOPPING_LIST_PROVIDER_TIMEOUT_SECS", &mut recovery.operation_timeout_secs);
        override_from_env("SHOPPING_LIST_PROVIDER_RETRIES", &mut recovery.max_retries);
        override_from_env("SHOPPING_LIST_BREAKER_THRESHOLD", &mut recovery.circuit_breaker_threshold);
        override_from_env("SHOPPING_LIST_BREAKER_RESET_SECS", &mut recovery.circuit_breaker_reset_secs);

        let mut ttl = 0u64;
        override_from_env("SHOPPING_LIST_CACHE_TTL_SECS", &mut ttl);
        if ttl > 0 {
            config.cache.ttl_secs = Some(ttl);
        }

        override_from_env("SHOPPING_LIST_JOB_TIMEOUT_SECS", &mut config.jobs.job_timeout_secs);
        override_from_env("SHOPPING_LIST_HISTORY_SECS", &mut config.jobs.history_retention_secs);
        override_from_env("SHOPPING_LIST_SYNC_WAIT_MS", &mut config.jobs.sync_wait_ms);
        override_from_env("SHOPPING_LIST_DEADBAND_RATIO", &mut config.validation.deadband_ratio);

        config
    }
}

fn override_from_env<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = env::var(name) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!("Ignoring unparseable value for {}: '{}'", name, raw),
        }
    }
}
