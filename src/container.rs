//! Dependency-injected factory producing fully-wired messaging systems
//!
//! Each call to [`MessagingSystemContainer::create`] produces an
//! independent set of components — no state is shared across containers —
//! wired in dependency order: Pattern Matcher → Subscription Registry →
//! Health Monitor → Delivery Engine → Correlation Manager → Message
//! Router.

use std::sync::Arc;

use crate::config::MessagingConfig;
use crate::correlation_manager::SharedCorrelationManager;
use crate::correlation_manager::CorrelationManager;
use crate::delivery_engine::DeliveryEngine;
use crate::health_monitor::{HealthMonitor, SharedHealthMonitor};
use crate::pattern_matcher::{PatternMatcher, SharedPatternMatcher};
use crate::router::{MessageRouter, SharedMessageRouter};
use crate::subscription_registry::{SharedSubscriptionRegistry, SubscriptionRegistry};
use crate::time_provider::{production_time_provider, SharedTimeProvider};

/// A fully-wired, independent set of messaging components.
#[derive(Debug, Clone)]
pub struct MessagingSystemContainer {
    pattern_matcher: SharedPatternMatcher,
    subscriptions: SharedSubscriptionRegistry,
    health: SharedHealthMonitor,
    router: SharedMessageRouter,
    correlation: SharedCorrelationManager,
}

impl MessagingSystemContainer {
    /// Wires a new, independent messaging system from `config`, using the
    /// real `TimeProvider`.
    #[must_use]
    pub fn create(config: &MessagingConfig) -> Self {
        Self::create_with_time_provider(config, production_time_provider())
    }

    /// Wires a new, independent messaging system from `config`, using the
    /// supplied `TimeProvider` — lets tests collapse correlation timeouts
    /// and delivery retry backoff.
    #[must_use]
    pub fn create_with_time_provider(
        config: &MessagingConfig,
        time_provider: SharedTimeProvider,
    ) -> Self {
        let pattern_matcher = Arc::new(PatternMatcher::new(config.pattern_cache_size));

        let subscriptions = Arc::new(SubscriptionRegistry::new(
            Arc::clone(&pattern_matcher),
            config.subscription_limit,
        ));

        let health = Arc::new(HealthMonitor::new(config.circuit_breaker_threshold));

        let delivery = Arc::new(DeliveryEngine::new(
            config.max_concurrent_deliveries,
            Arc::clone(&time_provider),
        ));

        let correlation = Arc::new(CorrelationManager::new(
            config.pending_request_limit,
            config.default_request_timeout_ms,
            time_provider,
        ));
        correlation.start_sweep();

        let router = Arc::new(MessageRouter::new(
            Arc::clone(&subscriptions),
            delivery,
            Arc::clone(&health),
        ));

        Self {
            pattern_matcher,
            subscriptions,
            health,
            router,
            correlation,
        }
    }

    /// The pattern matcher this container wired.
    #[must_use]
    pub fn pattern_matcher(&self) -> &SharedPatternMatcher {
        &self.pattern_matcher
    }

    /// The subscription registry this container wired.
    #[must_use]
    pub fn subscriptions(&self) -> &SharedSubscriptionRegistry {
        &self.subscriptions
    }

    /// The health monitor this container wired.
    #[must_use]
    pub fn health(&self) -> &SharedHealthMonitor {
        &self.health
    }

    /// The message router this container wired.
    #[must_use]
    pub fn router(&self) -> &SharedMessageRouter {
        &self.router
    }

    /// The correlation manager this container wired.
    #[must_use]
    pub fn correlation(&self) -> &SharedCorrelationManager {
        &self.correlation
    }

    /// Stops every background task this container spawned (currently the
    /// Correlation Manager's stale-request sweep), for graceful shutdown.
    pub fn shutdown(&self) {
        self.correlation.stop_sweep();
    }
}
