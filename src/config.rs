//! Configuration for a `MessagingSystemContainer`
//!
//! `MessagingConfig` carries the tunables every sub-component needs at
//! construction time. `development()`/`production()`/`testing()` presets
//! provide sane defaults; `MessagingConfig::builder()` offers a validating
//! fluent builder for callers who need custom values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain_types::{
    CircuitBreakerThreshold, MaxAgents, MaxConcurrentDeliveries, PatternCacheSize,
    PendingRequestLimit, RequestTimeoutMs, SubscriptionLimit,
};
use crate::error::ConfigError;

/// Tunables shared by every component a `MessagingSystemContainer` wires
/// together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Maximum agents a single `AgentManager` may hold
    pub max_agents: MaxAgents,
    /// Maximum subscription patterns a single agent may hold
    pub subscription_limit: SubscriptionLimit,
    /// Pending-request cap for the `CorrelationManager`
    pub pending_request_limit: PendingRequestLimit,
    /// LRU capacity for the Pattern Matcher's compiled-regex cache
    pub pattern_cache_size: PatternCacheSize,
    /// Concurrency cap for the Delivery Engine
    pub max_concurrent_deliveries: MaxConcurrentDeliveries,
    /// Default request timeout used when a caller doesn't specify one
    pub default_request_timeout_ms: RequestTimeoutMs,
    /// Consecutive failures before a component's circuit breaker trips open
    pub circuit_breaker_threshold: CircuitBreakerThreshold,
    /// Whether components should emit `tracing::debug!` timing events for
    /// every operation, not just ones that exceed their budget
    pub enable_performance_logging: bool,
}

impl MessagingConfig {
    /// A configuration tuned for local development: small caps, verbose
    /// logging, short timeouts for fast feedback.
    ///
    /// # Panics
    /// Never panics; every literal below is within its newtype's valid range.
    #[must_use]
    pub fn development() -> Self {
        Self {
            max_agents: MaxAgents::try_new(10).unwrap(),
            subscription_limit: SubscriptionLimit::try_new(100).unwrap(),
            pending_request_limit: PendingRequestLimit::try_new(1_000).unwrap(),
            pattern_cache_size: PatternCacheSize::try_new(100).unwrap(),
            max_concurrent_deliveries: MaxConcurrentDeliveries::try_new(100).unwrap(),
            default_request_timeout_ms: RequestTimeoutMs::try_new(5_000).unwrap(),
            circuit_breaker_threshold: CircuitBreakerThreshold::try_new(3).unwrap(),
            enable_performance_logging: true,
        }
    }

    /// A configuration tuned for production: full caps, quiet logging.
    ///
    /// # Panics
    /// Never panics; every literal below is within its newtype's valid range.
    #[must_use]
    pub fn production() -> Self {
        Self {
            max_agents: MaxAgents::try_new(10).unwrap(),
            subscription_limit: SubscriptionLimit::try_new(100).unwrap(),
            pending_request_limit: PendingRequestLimit::try_new(10_000).unwrap(),
            pattern_cache_size: PatternCacheSize::try_new(1_000).unwrap(),
            max_concurrent_deliveries: MaxConcurrentDeliveries::try_new(1_000).unwrap(),
            default_request_timeout_ms: RequestTimeoutMs::try_new(5_000).unwrap(),
            circuit_breaker_threshold: CircuitBreakerThreshold::try_new(10).unwrap(),
            enable_performance_logging: false,
        }
    }

    /// A configuration suitable for automated tests: minimal caps, short
    /// timeouts, verbose logging.
    ///
    /// # Panics
    /// Never panics; every literal below is within its newtype's valid range.
    #[must_use]
    pub fn testing() -> Self {
        Self {
            max_agents: MaxAgents::try_new(10).unwrap(),
            subscription_limit: SubscriptionLimit::try_new(10).unwrap(),
            pending_request_limit: PendingRequestLimit::try_new(100).unwrap(),
            pattern_cache_size: PatternCacheSize::try_new(10).unwrap(),
            max_concurrent_deliveries: MaxConcurrentDeliveries::try_new(10).unwrap(),
            default_request_timeout_ms: RequestTimeoutMs::try_new(1_000).unwrap(),
            circuit_breaker_threshold: CircuitBreakerThreshold::try_new(3).unwrap(),
            enable_performance_logging: true,
        }
    }

    /// Creates a configuration builder for custom settings.
    #[must_use]
    pub fn builder() -> MessagingConfigBuilder {
        MessagingConfigBuilder::new()
    }

    /// Validates cross-field consistency beyond what each `nutype` newtype
    /// already enforces on its own.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidConfiguration`] if the default request
    /// timeout is shorter than the delivery engine could plausibly need to
    /// exhaust its retries, or if the pattern cache is implausibly smaller
    /// than the subscription limit for a single agent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_request_timeout_ms.as_u64() < 50 {
            return Err(ConfigError::InvalidConfiguration {
                field: "default_request_timeout_ms".to_string(),
                reason: "must be at least 50ms to allow for at least one delivery retry round"
                    .to_string(),
            });
        }

        if (self.pattern_cache_size.as_usize() as u64) < self.subscription_limit.as_usize() as u64
        {
            return Err(ConfigError::InvalidConfiguration {
                field: "pattern_cache_size".to_string(),
                reason: "should be at least as large as the per-agent subscription limit"
                    .to_string(),
            });
        }

        if self.max_concurrent_deliveries.as_usize() == 0 {
            return Err(ConfigError::InvalidConfiguration {
                field: "max_concurrent_deliveries".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Serializes this configuration as pretty JSON and writes it to `path`.
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file can't be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Reads and validates a configuration previously written with
    /// [`MessagingConfig::save_to_file`].
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file can't be read,
    /// [`ConfigError::Parse`] if it isn't valid JSON, or
    /// [`ConfigError::InvalidConfiguration`] if it fails [`Self::validate`].
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Self =
            serde_json::from_str(&json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Fluent builder for [`MessagingConfig`], starting from the `production`
/// preset.
#[derive(Debug, Clone)]
pub struct MessagingConfigBuilder {
    config: MessagingConfig,
}

impl MessagingConfigBuilder {
    /// Starts a builder seeded with [`MessagingConfig::production`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: MessagingConfig::production(),
        }
    }

    /// Overrides the agent cap.
    #[must_use]
    pub fn max_agents(mut self, value: MaxAgents) -> Self {
        self.config.max_agents = value;
        self
    }

    /// Overrides the per-agent subscription cap.
    #[must_use]
    pub fn subscription_limit(mut self, value: SubscriptionLimit) -> Self {
        self.config.subscription_limit = value;
        self
    }

    /// Overrides the pending-request cap.
    #[must_use]
    pub fn pending_request_limit(mut self, value: PendingRequestLimit) -> Self {
        self.config.pending_request_limit = value;
        self
    }

    /// Overrides the pattern cache capacity.
    #[must_use]
    pub fn pattern_cache_size(mut self, value: PatternCacheSize) -> Self {
        self.config.pattern_cache_size = value;
        self
    }

    /// Overrides the delivery concurrency cap.
    #[must_use]
    pub fn max_concurrent_deliveries(mut self, value: MaxConcurrentDeliveries) -> Self {
        self.config.max_concurrent_deliveries = value;
        self
    }

    /// Overrides the default request timeout.
    #[must_use]
    pub fn default_request_timeout_ms(mut self, value: RequestTimeoutMs) -> Self {
        self.config.default_request_timeout_ms = value;
        self
    }

    /// Overrides the circuit breaker threshold.
    #[must_use]
    pub fn circuit_breaker_threshold(mut self, value: CircuitBreakerThreshold) -> Self {
        self.config.circuit_breaker_threshold = value;
        self
    }

    /// Enables or disables verbose performance logging.
    #[must_use]
    pub fn enable_performance_logging(mut self, value: bool) -> Self {
        self.config.enable_performance_logging = value;
        self
    }

    /// Validates and returns the built configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidConfiguration`] if [`MessagingConfig::validate`] fails.
    pub fn build(self) -> Result<MessagingConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for MessagingConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_individually_valid() {
        assert!(MessagingConfig::development().validate().is_ok());
        assert!(MessagingConfig::production().validate().is_ok());
        assert!(MessagingConfig::testing().validate().is_ok());
    }

    #[test]
    fn builder_produces_a_valid_default_config() {
        assert!(MessagingConfig::builder().build().is_ok());
    }

    #[test]
    fn builder_rejects_too_short_timeout() {
        let result = MessagingConfig::builder()
            .default_request_timeout_ms(RequestTimeoutMs::try_new(10).unwrap())
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn builder_rejects_undersized_pattern_cache() {
        let result = MessagingConfig::builder()
            .subscription_limit(SubscriptionLimit::try_new(1_000).unwrap())
            .pattern_cache_size(PatternCacheSize::try_new(10).unwrap())
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = MessagingConfig::testing();

        config.save_to_file(&path).unwrap();
        let loaded = MessagingConfig::load_from_file(&path).unwrap();

        assert_eq!(loaded.max_agents, config.max_agents);
        assert_eq!(loaded.circuit_breaker_threshold, config.circuit_breaker_threshold);
    }
}
