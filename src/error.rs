//! Error types for the messaging runtime
//!
//! Every public error enum carries a stable `code()` string matching the
//! external contract exactly, so host applications can match on identity
//! rather than on `Display` text.

use thiserror::Error;

use crate::domain_types::{AgentId, MessageId};

/// Errors raised by the Pattern Matcher
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// Pattern exceeded the 1000-character compile-time cap
    #[error("pattern too long: {len} characters (max 1000)")]
    PatternTooLong {
        /// Observed pattern length in characters
        len: usize,
    },

    /// Pattern failed to compile to a regular expression
    #[error("invalid pattern: {reason}")]
    InvalidPattern {
        /// Why the pattern was rejected
        reason: String,
    },
}

impl PatternError {
    /// Stable error code for this variant
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PatternTooLong { .. } | Self::InvalidPattern { .. } => "INVALID_PATTERN",
        }
    }
}

/// Errors raised by the Subscription Registry
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The agent already has the maximum of 100 subscription patterns
    #[error("subscription limit exceeded for agent {agent_id}")]
    SubscriptionLimitExceeded {
        /// The agent that hit its subscription cap
        agent_id: AgentId,
    },

    /// Underlying pattern compilation failed
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

impl SubscriptionError {
    /// Stable error code for this variant
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SubscriptionLimitExceeded { .. } => "SUBSCRIPTION_LIMIT_EXCEEDED",
            Self::Pattern(inner) => inner.code(),
        }
    }
}

/// Errors raised by the Correlation Manager
#[derive(Debug, Error, Clone)]
pub enum CorrelationError {
    /// The pending-request table is at its 10,000-entry cap
    #[error("resource exhausted: pending request slots")]
    ResourceExhausted,

    /// No response arrived before the registered deadline
    #[error("request {correlation_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Correlation id of the timed-out request
        correlation_id: MessageId,
        /// Agent that issued the request
        requester_id: AgentId,
        /// Configured timeout that elapsed
        timeout_ms: u64,
    },

    /// The response carried an error payload
    #[error("request {correlation_id} failed")]
    RequestFailed {
        /// Correlation id of the failed request
        correlation_id: MessageId,
        /// Error payload returned by the responder
        payload: serde_json::Value,
    },

    /// The request was cancelled explicitly or by agent destruction
    #[error("request {correlation_id} cancelled")]
    RequestCancelled {
        /// Correlation id of the cancelled request
        correlation_id: MessageId,
    },
}

impl CorrelationError {
    /// Stable error code for this variant
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::RequestTimeout { .. } => "REQUEST_TIMEOUT",
            Self::RequestFailed { .. } => "REQUEST_FAILED",
            Self::RequestCancelled { .. } => "REQUEST_CANCELLED",
        }
    }
}

/// Errors raised by the Health Monitor
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HealthError {
    /// `attemptRecovery` was called on a component that was not Open
    #[error("component {component_id} is not open, cannot attempt recovery")]
    NotOpen {
        /// Component the caller tried to recover
        component_id: String,
    },

    /// Threshold must be >= 1
    #[error("circuit breaker threshold must be >= 1")]
    InvalidThreshold,
}

impl HealthError {
    /// Stable error code for this variant
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotOpen { .. } => "INVALID_STATE_TRANSITION",
            Self::InvalidThreshold => "INVALID_CONFIGURATION",
        }
    }
}

/// Errors raised by the Delivery Engine for a single recipient
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The recipient agent has been destroyed; never retried
    #[error("agent {agent_id} has been destroyed")]
    AgentDestroyed {
        /// The destroyed recipient
        agent_id: AgentId,
    },

    /// The recipient was transiently unavailable; retried up to twice
    #[error("agent {agent_id} unavailable: {reason}")]
    AgentUnavailable {
        /// The unreachable recipient
        agent_id: AgentId,
        /// Why delivery failed this attempt
        reason: String,
    },

    /// A handler invocation panicked or returned an error
    #[error("handler for agent {agent_id} failed: {reason}")]
    HandlerFailed {
        /// The recipient whose handler failed
        agent_id: AgentId,
        /// Failure description
        reason: String,
    },
}

impl DeliveryError {
    /// Stable error code for this variant
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AgentDestroyed { .. } => "AGENT_DESTROYED",
            Self::AgentUnavailable { .. } | Self::HandlerFailed { .. } => "AGENT_UNAVAILABLE",
        }
    }

    /// Whether this failure mode is eligible for the Delivery Engine's retry
    /// policy (`AgentDestroyed` is never retried).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::AgentDestroyed { .. })
    }
}

/// Errors raised by the Message Router
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// Subscriber lookup raised an exception
    #[error("subscriber lookup failed: {reason}")]
    LookupFailed {
        /// Underlying failure description
        reason: String,
    },
}

impl RouterError {
    /// Stable error code for this variant
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::LookupFailed { .. } => "ROUTING_FAILED",
        }
    }
}

/// Errors raised validating a `MessagingConfig`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// One of the container's tunables was out of range, or a cross-field
    /// consistency rule was violated
    #[error("invalid configuration: {field} - {reason}")]
    InvalidConfiguration {
        /// The field that failed validation
        field: String,
        /// Why it failed
        reason: String,
    },

    /// Loading or saving the config file failed
    #[error("config io error: {0}")]
    Io(String),

    /// The config file contents could not be parsed
    #[error("config parse error: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Stable error code for this variant
    #[must_use]
    pub fn code(&self) -> &'static str {
        "INVALID_CONFIGURATION"
    }
}

/// Errors raised by Agent operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// The agent has already been destroyed
    #[error("agent {agent_id} has been destroyed")]
    AgentDestroyed {
        /// The destroyed agent
        agent_id: AgentId,
    },

    /// Messaging facet could not be enabled
    #[error(transparent)]
    InvalidConfiguration(#[from] ConfigError),

    /// Subscription operation failed
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// Messaging is not enabled on this agent
    #[error("messaging is not enabled for agent {agent_id}")]
    MessagingDisabled {
        /// The agent without an active messaging facet
        agent_id: AgentId,
    },
}

impl AgentError {
    /// Stable error code for this variant
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AgentDestroyed { .. } => "AGENT_DESTROYED",
            Self::InvalidConfiguration(inner) => inner.code(),
            Self::Subscription(inner) => inner.code(),
            Self::MessagingDisabled { .. } => "AGENT_UNAVAILABLE",
        }
    }
}

/// Errors raised by the Agent Manager
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManagerError {
    /// A caller-supplied agent id collided with one already registered
    #[error("agent id {agent_id} already exists")]
    DuplicateAgentId {
        /// The colliding id
        agent_id: AgentId,
    },

    /// Lookup on an id not currently present in the manager
    #[error("agent {agent_id} not found")]
    AgentNotFound {
        /// The missing id
        agent_id: AgentId,
    },

    /// The manager already holds its configured maximum of agents
    #[error("agent limit exceeded")]
    AgentLimitExceeded,

    /// Payload exceeded the 1 MiB cap for direct `sendMessage`/broadcast
    #[error("message too large: {size} bytes (max {max} bytes)")]
    MessageTooLarge {
        /// Observed payload size in bytes
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Delegated agent-level failure
    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl ManagerError {
    /// Stable error code for this variant
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateAgentId { .. } => "DUPLICATE_AGENT_ID",
            Self::AgentNotFound { .. } => "AGENT_NOT_FOUND",
            Self::AgentLimitExceeded => "AGENT_LIMIT_EXCEEDED",
            Self::MessageTooLarge { .. } => "MESSAGE_TOO_LARGE",
            Self::Agent(inner) => inner.code(),
        }
    }
}

/// Errors raised constructing or validating a `Message`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Serialized payload exceeded the 1 MiB cap
    #[error("message too large: {size} bytes (max {max} bytes)")]
    TooLarge {
        /// Observed payload size in bytes
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// The message type failed validation (empty, too long, or bad chars)
    #[error("invalid message type: {reason}")]
    InvalidType {
        /// Why the type was rejected
        reason: String,
    },

    /// The payload could not be serialized to measure its size
    #[error("payload serialization failed: {reason}")]
    SerializationFailed {
        /// Underlying serde error message
        reason: String,
    },

    /// The payload was JSON `null`
    #[error("message payload must not be null")]
    NullPayload,
}

impl MessageError {
    /// Stable error code for this variant
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::TooLarge { .. } => "MESSAGE_TOO_LARGE",
            Self::InvalidType { .. } | Self::SerializationFailed { .. } => "INVALID_MESSAGE",
            Self::NullPayload => "NULL_PAYLOAD",
        }
    }
}

/// Umbrella error type composing every component error for consumers that
/// don't need to match on which component failed.
#[derive(Debug, Error, Clone)]
pub enum MessagingError {
    /// Pattern Matcher failure
    #[error(transparent)]
    Pattern(#[from] PatternError),
    /// Subscription Registry failure
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    /// Correlation Manager failure
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    /// Health Monitor failure
    #[error(transparent)]
    Health(#[from] HealthError),
    /// Delivery Engine failure
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    /// Message Router failure
    #[error(transparent)]
    Router(#[from] RouterError),
    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Agent-level failure
    #[error(transparent)]
    Agent(#[from] AgentError),
    /// Agent Manager failure
    #[error(transparent)]
    Manager(#[from] ManagerError),
    /// Message construction/validation failure
    #[error(transparent)]
    Message(#[from] MessageError),
}

impl MessagingError {
    /// Stable error code for this variant
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Pattern(e) => e.code(),
            Self::Subscription(e) => e.code(),
            Self::Correlation(e) => e.code(),
            Self::Health(e) => e.code(),
            Self::Delivery(e) => e.code(),
            Self::Router(e) => e.code(),
            Self::Config(e) => e.code(),
            Self::Agent(e) => e.code(),
            Self::Manager(e) => e.code(),
            Self::Message(e) => e.code(),
        }
    }
}
