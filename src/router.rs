//! Looks up subscribers for a message and hands it to the delivery engine
//!
//! `route()` is the five-step pipeline every published message goes
//! through: look up subscribers, exclude the sender for broadcast-style
//! publishes when requested, deliver, record component health, and report
//! timing.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{instrument, warn};

use crate::delivery_engine::{DeliveryResult, RecipientHandler, SharedDeliveryEngine};
use crate::domain_types::AgentId;
use crate::health_monitor::SharedHealthMonitor;
use crate::message::Message;
use crate::subscription_registry::SharedSubscriptionRegistry;

const ROUTING_WARN_THRESHOLD_MS: u128 = 30;

const COMPONENT_ID: &str = "message_router";

/// Aggregate counters describing the router's lifetime activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouterStats {
    /// Messages routed since the router was created
    pub messages_routed: u64,
    /// Recipient deliveries that succeeded
    pub deliveries_succeeded: u64,
    /// Recipient deliveries that failed terminally
    pub deliveries_failed: u64,
}

/// Outcome of routing a single message.
#[derive(Debug, Clone)]
pub struct RoutingResult {
    /// Whether routing completed without the subscriber lookup itself
    /// failing. `true` even when individual deliveries fail.
    pub success: bool,
    /// Agents the message was actually, successfully delivered to.
    pub routed_to: Vec<AgentId>,
    /// Number of subscribers the lookup matched, before delivery.
    pub subscriber_count: usize,
    /// `true` when the lookup matched no subscribers at all.
    pub no_subscribers_found: bool,
    /// Time spent on the whole routing pipeline.
    pub routing_time: Duration,
    /// Time spent looking up subscribers.
    pub lookup_time: Duration,
    /// Time spent handing the message to the delivery engine.
    pub delivery_time: Duration,
    /// Number of subscribers the pattern lookup matched (same as
    /// `subscriber_count`; kept distinct since they answer different
    /// questions — one about delivery, one about matching).
    pub pattern_matches_found: usize,
    /// Number of deliveries that failed terminally.
    pub delivery_failures: usize,
    /// Subscribers the message matched, before delivery was attempted.
    pub subscribers: HashSet<AgentId>,
    /// Delivery outcome for each matched subscriber.
    pub delivery: DeliveryResult,
    /// Set when the subscriber lookup itself failed; routing never reached
    /// delivery.
    pub error: Option<String>,
}

/// Routes published messages to their subscribers via the delivery engine.
#[derive(Debug)]
pub struct MessageRouter {
    subscriptions: SharedSubscriptionRegistry,
    delivery: SharedDeliveryEngine,
    health: SharedHealthMonitor,
    stats_routed: std::sync::atomic::AtomicU64,
    stats_succeeded: std::sync::atomic::AtomicU64,
    stats_failed: std::sync::atomic::AtomicU64,
}

impl MessageRouter {
    /// Creates a router wired to its subscription registry, delivery
    /// engine, and health monitor.
    #[must_use]
    pub fn new(
        subscriptions: SharedSubscriptionRegistry,
        delivery: SharedDeliveryEngine,
        health: SharedHealthMonitor,
    ) -> Self {
        Self {
            subscriptions,
            delivery,
            health,
            stats_routed: std::sync::atomic::AtomicU64::new(0),
            stats_succeeded: std::sync::atomic::AtomicU64::new(0),
            stats_failed: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Routes `message` to every matching subscriber, optionally excluding
    /// the sender (used for broadcast, which never echoes to the sender).
    #[instrument(skip(self, handler, message))]
    pub async fn route(
        &self,
        handler: &dyn RecipientHandler,
        message: &Message,
        exclude_sender: bool,
    ) -> RoutingResult {
        let start = Instant::now();

        let lookup_start = Instant::now();
        let mut subscribers = self
            .subscriptions
            .get_subscribers(message.message_type().as_ref())
            .await;
        if exclude_sender {
            subscribers.remove(&message.from());
        }
        let lookup_time = lookup_start.elapsed();
        let subscriber_count = subscribers.len();

        if subscribers.is_empty() {
            self.stats_routed
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            self.health.record_health(COMPONENT_ID, None);
            return RoutingResult {
                success: true,
                routed_to: Vec::new(),
                subscriber_count,
                no_subscribers_found: true,
                routing_time: start.elapsed(),
                lookup_time,
                delivery_time: Duration::ZERO,
                pattern_matches_found: subscriber_count,
                delivery_failures: 0,
                subscribers,
                delivery: DeliveryResult {
                    delivered: Vec::new(),
                    failed: Vec::new(),
                    duration: Duration::ZERO,
                },
                error: None,
            };
        }

        let delivery_start = Instant::now();
        let delivery = self.delivery.deliver(handler, &subscribers, message).await;
        let delivery_time = delivery_start.elapsed();

        self.stats_routed
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.stats_succeeded.fetch_add(
            delivery.delivered.len() as u64,
            std::sync::atomic::Ordering::Relaxed,
        );
        self.stats_failed.fetch_add(
            delivery.failed.len() as u64,
            std::sync::atomic::Ordering::Relaxed,
        );

        if delivery.failed.is_empty() {
            self.health.record_health(COMPONENT_ID, None);
        } else {
            self.health.record_failure(
                COMPONENT_ID,
                format!("{} of {} deliveries failed", delivery.failed.len(), subscribers.len()),
            );
        }

        let routing_time = start.elapsed();
        let elapsed = routing_time.as_millis();
        if elapsed > ROUTING_WARN_THRESHOLD_MS {
            warn!(elapsed_ms = elapsed, "routing exceeded budget");
        }

        RoutingResult {
            success: true,
            routed_to: delivery.delivered.clone(),
            subscriber_count,
            no_subscribers_found: false,
            routing_time,
            lookup_time,
            delivery_time,
            pattern_matches_found: subscriber_count,
            delivery_failures: delivery.failed.len(),
            subscribers,
            delivery,
            error: None,
        }
    }

    /// A snapshot of the router's lifetime counters.
    #[must_use]
    pub fn get_stats(&self) -> RouterStats {
        RouterStats {
            messages_routed: self.stats_routed.load(std::sync::atomic::Ordering::Relaxed),
            deliveries_succeeded: self
                .stats_succeeded
                .load(std::sync::atomic::Ordering::Relaxed),
            deliveries_failed: self.stats_failed.load(std::sync::atomic::Ordering::Relaxed),
        }
    }
}

/// Shared handle to a [`MessageRouter`].
pub type SharedMessageRouter = Arc<MessageRouter>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery_engine::DeliveryEngine;
    use crate::domain_types::{
        CircuitBreakerThreshold, MaxConcurrentDeliveries, PatternCacheSize, SubscriptionLimit,
    };
    use crate::error::DeliveryError;
    use crate::health_monitor::HealthMonitor;
    use crate::message::MessageFactory;
    use crate::pattern_matcher::PatternMatcher;
    use crate::subscription_registry::SubscriptionRegistry;
    use crate::time_provider::test_time_provider;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct RecordingHandler {
        received: Mutex<Vec<AgentId>>,
    }

    #[async_trait]
    impl RecipientHandler for RecordingHandler {
        async fn deliver_to(
            &self,
            agent_id: AgentId,
            _message: &Message,
        ) -> Result<(), DeliveryError> {
            self.received.lock().unwrap().push(agent_id);
            Ok(())
        }
    }

    fn router() -> (MessageRouter, Arc<SubscriptionRegistry>) {
        let matcher = Arc::new(PatternMatcher::new(PatternCacheSize::try_new(100).unwrap()));
        let subscriptions = Arc::new(SubscriptionRegistry::new(
            matcher,
            SubscriptionLimit::try_new(100).unwrap(),
        ));
        let delivery = Arc::new(DeliveryEngine::new(
            MaxConcurrentDeliveries::try_new(10).unwrap(),
            test_time_provider(),
        ));
        let health = Arc::new(HealthMonitor::new(CircuitBreakerThreshold::try_new(5).unwrap()));
        (
            MessageRouter::new(Arc::clone(&subscriptions), delivery, health),
            subscriptions,
        )
    }

    #[tokio::test]
    async fn routes_to_matching_subscribers() {
        let (router, subscriptions) = router();
        let subscriber = AgentId::generate();
        subscriptions
            .subscribe(subscriber, crate::domain_types::MessagePattern::try_new("task.*".to_string()).unwrap())
            .unwrap();

        let handler = RecordingHandler {
            received: Mutex::new(Vec::new()),
        };
        let factory = MessageFactory::new();
        let sender = AgentId::generate();
        let message = factory
            .create(sender, sender, "task.created", json!({}))
            .unwrap();

        let result = router.route(&handler, &message, false).await;

        assert!(result.subscribers.contains(&subscriber));
        assert!(handler.received.lock().unwrap().contains(&subscriber));
        assert!(result.success);
        assert!(!result.no_subscribers_found);
        assert_eq!(result.subscriber_count, 1);
        assert_eq!(result.pattern_matches_found, 1);
        assert_eq!(result.delivery_failures, 0);
        assert_eq!(result.routed_to, vec![subscriber]);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn no_subscribers_is_reported_as_a_successful_empty_route() {
        let (router, _subscriptions) = router();
        let handler = RecordingHandler {
            received: Mutex::new(Vec::new()),
        };
        let factory = MessageFactory::new();
        let sender = AgentId::generate();
        let message = factory
            .create(sender, sender, "nobody.listens", json!({}))
            .unwrap();

        let result = router.route(&handler, &message, false).await;

        assert!(result.success);
        assert!(result.no_subscribers_found);
        assert_eq!(result.subscriber_count, 0);
        assert!(result.routed_to.is_empty());
    }

    #[tokio::test]
    async fn broadcast_excludes_sender() {
        let (router, subscriptions) = router();
        let sender = AgentId::generate();
        subscriptions
            .subscribe(sender, crate::domain_types::MessagePattern::try_new("task.*".to_string()).unwrap())
            .unwrap();

        let handler = RecordingHandler {
            received: Mutex::new(Vec::new()),
        };
        let factory = MessageFactory::new();
        let message = factory
            .create(sender, sender, "task.created", json!({}))
            .unwrap();

        let result = router.route(&handler, &message, true).await;

        assert!(!result.subscribers.contains(&sender));
    }

    #[tokio::test]
    async fn stats_accumulate_across_routes() {
        let (router, subscriptions) = router();
        let subscriber = AgentId::generate();
        subscriptions
            .subscribe(subscriber, crate::domain_types::MessagePattern::try_new("task.*".to_string()).unwrap())
            .unwrap();

        let handler = RecordingHandler {
            received: Mutex::new(Vec::new()),
        };
        let factory = MessageFactory::new();
        let sender = AgentId::generate();
        let message = factory
            .create(sender, sender, "task.created", json!({}))
            .unwrap();

        router.route(&handler, &message, false).await;
        router.route(&handler, &message, false).await;

        assert_eq!(router.get_stats().messages_routed, 2);
    }
}
