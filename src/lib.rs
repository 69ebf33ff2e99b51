//! # `multi_agent_network`
//!
//! An in-process multi-agent messaging runtime: isolated agents with
//! private memory, publish/subscribe over wildcard patterns, direct send
//! and broadcast, request/response correlation, and per-component circuit
//! breakers — all wired together by a small dependency-injection
//! container so independent containers never share state.
//!
//! ## Architecture
//!
//! ```rust
//! use multi_agent_network::{AgentManager, MessagingConfig};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = MessagingConfig::development();
//! let manager = AgentManager::new(&config);
//!
//! let a1 = manager.create_agent(None, None).unwrap();
//! let a2 = manager.create_agent(None, None).unwrap();
//!
//! manager
//!     .send_message(a1, a2, "greeting", json!({"text": "hi"}))
//!     .await
//!     .unwrap();
//! # }
//! ```

pub mod agent;
pub mod agent_manager;
pub mod config;
pub mod container;
pub mod correlation_manager;
pub mod delivery_engine;
pub mod domain_types;
pub mod error;
pub mod health_monitor;
pub mod message;
pub mod observability;
pub mod pattern_matcher;
pub mod router;
pub mod subscription_registry;
pub mod time_provider;

pub use crate::agent::{Agent, MessageHandler};
pub use crate::agent_manager::{AgentManager, CreateAgentOpts, MessagingStats};
pub use crate::config::{MessagingConfig, MessagingConfigBuilder};
pub use crate::container::MessagingSystemContainer;
pub use crate::correlation_manager::{CorrelationManager, CorrelationStats, SharedCorrelationManager};
pub use crate::delivery_engine::{DeliveryEngine, DeliveryResult, RecipientHandler, SharedDeliveryEngine};
pub use crate::domain_types::{
    AgentId, CircuitBreakerThreshold, MaxAgents, MaxConcurrentDeliveries, MessageId,
    MessagePattern, MessageTimestamp, PatternCacheSize, PendingRequestLimit, RequestTimeoutMs,
    SubscriptionLimit, ValidatedMessageType,
};
pub use crate::error::{
    AgentError, ConfigError, CorrelationError, DeliveryError, HealthError, ManagerError,
    MessageError, MessagingError, PatternError, RouterError, SubscriptionError,
};
pub use crate::health_monitor::{CircuitState, ComponentHealthReport, HealthMonitor, HealthStats, SharedHealthMonitor};
pub use crate::message::{Message, MessageFactory};
pub use crate::observability::{Metrics, NoopMetrics, SharedMetrics, TracingMetrics};
pub use crate::pattern_matcher::{CacheStats, PatternMatcher, SharedPatternMatcher};
pub use crate::router::{MessageRouter, RouterStats, RoutingResult, SharedMessageRouter};
pub use crate::subscription_registry::{SharedSubscriptionRegistry, SubscriptionRegistry};
pub use crate::time_provider::{
    production_time_provider, test_time_provider, SharedTimeProvider, TimeProvider,
};
