//! Domain types for the messaging runtime
//!
//! Strongly-typed wrappers around the primitive values that flow through the
//! system, so that an `AgentId` can never be mistaken for a `MessageId` and a
//! subscription cap can never be constructed out of range.

use nutype::nutype;

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Unique identifier for an agent (RFC 4122 v4)
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct AgentId(Uuid);

impl AgentId {
    /// Generates a new random agent id
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Unique identifier for a message (RFC 4122 v4)
///
/// Also used as the correlation id of a request: the responder echoes the
/// request's `MessageId` back as the reply's `id`.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generates a new random message id
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// A subscription pattern: literal segments separated by `.`, with `*` as a
/// wildcard that matches any sequence of characters.
///
/// Validated at construction to the `[A-Za-z0-9._*-]+` alphabet and a
/// 1000-character length cap (spec: `PatternTooLong`).
#[nutype(
    validate(len_char_max = 1000, predicate = |p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-' | b'*'))),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef)
)]
pub struct MessagePattern(String);

impl MessagePattern {
    /// A pattern is a wildcard pattern iff it contains at least one `*`.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.as_ref().contains('*')
    }
}

/// A validated message type (routing key): 1-100 chars, `[A-Za-z0-9._-]+`.
#[nutype(
    validate(len_char_min = 1, len_char_max = 100, predicate = |t| t.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef)
)]
pub struct ValidatedMessageType(String);

/// Wall-clock timestamp, milliseconds since the Unix epoch.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    Into
))]
pub struct MessageTimestamp(u64);

impl MessageTimestamp {
    /// Captures the current wall-clock time.
    ///
    /// # Panics
    /// Panics if the system clock is set before the Unix epoch.
    #[must_use]
    pub fn now() -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_millis() as u64;
        Self::new(millis)
    }

    /// Gets the value as milliseconds since the epoch.
    #[must_use]
    pub fn as_millis(&self) -> u64 {
        self.into_inner()
    }
}

/// Maximum number of agents a single `AgentManager` may hold at once.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 10
)]
pub struct MaxAgents(usize);

impl MaxAgents {
    /// Gets the value as usize
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Maximum number of subscription patterns a single agent may hold.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 100_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 100
)]
pub struct SubscriptionLimit(usize);

impl SubscriptionLimit {
    /// Gets the value as usize
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Maximum number of pending correlated requests a `CorrelationManager` may
/// track at once.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 10_000
)]
pub struct PendingRequestLimit(usize);

impl PendingRequestLimit {
    /// Gets the value as usize
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// LRU capacity for the pattern matcher's compiled-regex cache.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 1000
)]
pub struct PatternCacheSize(usize);

impl PatternCacheSize {
    /// Gets the value as usize
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Upper bound on in-flight handler invocations a `DeliveryEngine` will run
/// concurrently for a single `deliver` call.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 1000
)]
pub struct MaxConcurrentDeliveries(usize);

impl MaxConcurrentDeliveries {
    /// Gets the value as usize
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Default timeout, in milliseconds, for a `request`/`registerRequest` call
/// that does not specify its own.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 3_600_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 5000
)]
pub struct RequestTimeoutMs(u64);

impl RequestTimeoutMs {
    /// Converts to a `Duration`
    #[must_use]
    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.into_inner())
    }

    /// Gets the value as u64
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.into_inner()
    }
}

/// Number of consecutive failures a component may accrue before its circuit
/// breaker trips from Closed to Open.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 10
)]
pub struct CircuitBreakerThreshold(u32);

impl CircuitBreakerThreshold {
    /// Gets the value as u32
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.into_inner()
    }
}

/// Maximum serialized payload size, in bytes, for a single message (1 MiB).
pub const MAX_MESSAGE_PAYLOAD_BYTES: usize = 1_048_576;
