//! Maps subscription patterns to subscribing agents
//!
//! Exact (non-wildcard) patterns are indexed for O(1) lookup; wildcard
//! patterns are scanned linearly (O(p) in the number of distinct wildcard
//! patterns registered) since they can't be hashed by the type they'll
//! eventually match.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::instrument;

use crate::domain_types::{AgentId, MessagePattern, SubscriptionLimit};
use crate::error::SubscriptionError;
use crate::pattern_matcher::SharedPatternMatcher;

/// Tracks, per agent, which patterns it's subscribed to, and answers
/// "who should receive a message of this type" queries.
///
/// `by_agent` and the `exact`/`wildcard` indexes are three independently
/// lockable `DashMap`s, but every subscribe/unsubscribe must update all of
/// them as one atomic step — otherwise a reader between the two updates
/// could observe an agent present in one index and absent from the other,
/// or (worse) a writer racing another writer on the same pattern could leave
/// an index entry orphaned forever. `mutation_lock` serializes every
/// mutating call across all three maps; lookups (`get_subscribers`) stay
/// lock-free on the `DashMap`s directly.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    matcher: SharedPatternMatcher,
    exact: DashMap<String, HashSet<AgentId>>,
    wildcard: DashMap<MessagePattern, HashSet<AgentId>>,
    by_agent: DashMap<AgentId, HashSet<MessagePattern>>,
    subscription_limit: SubscriptionLimit,
    mutation_lock: Mutex<()>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry bound to a pattern matcher and a per-agent
    /// subscription cap.
    #[must_use]
    pub fn new(matcher: SharedPatternMatcher, subscription_limit: SubscriptionLimit) -> Self {
        Self {
            matcher,
            exact: DashMap::new(),
            wildcard: DashMap::new(),
            by_agent: DashMap::new(),
            subscription_limit,
            mutation_lock: Mutex::new(()),
        }
    }

    /// Registers an agent with the registry without subscribing it to
    /// anything. Idempotent.
    pub fn register_agent(&self, agent_id: AgentId) {
        self.by_agent.entry(agent_id).or_default();
    }

    /// Subscribes `agent_id` to `pattern`. Idempotent: subscribing to a
    /// pattern the agent already holds is a no-op and does not count twice
    /// against the subscription cap.
    ///
    /// # Errors
    /// Returns [`SubscriptionError::SubscriptionLimitExceeded`] if the agent
    /// is already subscribed to 100 distinct patterns.
    ///
    /// # Panics
    /// Panics if `mutation_lock` is poisoned by another thread having
    /// panicked while holding it.
    #[instrument(skip(self))]
    pub fn subscribe(
        &self,
        agent_id: AgentId,
        pattern: MessagePattern,
    ) -> Result<(), SubscriptionError> {
        let _guard = self.mutation_lock.lock().unwrap();

        let mut patterns = self.by_agent.entry(agent_id).or_default();

        if patterns.contains(&pattern) {
            return Ok(());
        }

        if patterns.len() >= self.subscription_limit.as_usize() {
            return Err(SubscriptionError::SubscriptionLimitExceeded { agent_id });
        }

        patterns.insert(pattern.clone());
        drop(patterns);

        self.insert_index(agent_id, pattern);

        Ok(())
    }

    /// Unsubscribes `agent_id` from `pattern`. Idempotent: unsubscribing
    /// from a pattern the agent never held is a no-op.
    ///
    /// # Panics
    /// Panics if `mutation_lock` is poisoned by another thread having
    /// panicked while holding it.
    pub fn unsubscribe(&self, agent_id: AgentId, pattern: &MessagePattern) {
        let _guard = self.mutation_lock.lock().unwrap();

        if let Some(mut patterns) = self.by_agent.get_mut(&agent_id) {
            patterns.remove(pattern);
        }

        self.remove_index(agent_id, pattern);
    }

    /// Removes every subscription and registry entry for `agent_id`.
    ///
    /// # Panics
    /// Panics if `mutation_lock` is poisoned by another thread having
    /// panicked while holding it.
    pub fn cleanup(&self, agent_id: AgentId) {
        let _guard = self.mutation_lock.lock().unwrap();

        if let Some((_, patterns)) = self.by_agent.remove(&agent_id) {
            for pattern in &patterns {
                self.remove_index(agent_id, pattern);
            }
        }
    }

    /// Inserts `agent_id` into the exact/wildcard index for `pattern`.
    /// Callers must already hold `mutation_lock`.
    fn insert_index(&self, agent_id: AgentId, pattern: MessagePattern) {
        if pattern.is_wildcard() {
            self.wildcard.entry(pattern).or_default().insert(agent_id);
        } else {
            self.exact
                .entry(pattern.as_ref().to_string())
                .or_default()
                .insert(agent_id);
        }
    }

    /// Removes `agent_id` from the exact/wildcard index for `pattern`,
    /// dropping the index entry entirely once its subscriber set is empty.
    /// Callers must already hold `mutation_lock`.
    fn remove_index(&self, agent_id: AgentId, pattern: &MessagePattern) {
        if pattern.is_wildcard() {
            if let Some(mut subscribers) = self.wildcard.get_mut(pattern) {
                subscribers.remove(&agent_id);
                if subscribers.is_empty() {
                    drop(subscribers);
                    self.wildcard.remove(pattern);
                }
            }
        } else if let Some(mut subscribers) = self.exact.get_mut(pattern.as_ref()) {
            subscribers.remove(&agent_id);
            if subscribers.is_empty() {
                drop(subscribers);
                self.exact.remove(pattern.as_ref());
            }
        }
    }

    /// Every agent subscribed to a pattern that matches `message_type`:
    /// exact-pattern subscribers looked up in O(1), plus every wildcard
    /// subscriber whose pattern matches.
    #[instrument(skip(self))]
    pub async fn get_subscribers(&self, message_type: &str) -> HashSet<AgentId> {
        let mut subscribers = HashSet::new();

        if let Some(entry) = self.exact.get(message_type) {
            subscribers.extend(entry.iter().copied());
        }

        for entry in &self.wildcard {
            let pattern = entry.key();
            if self
                .matcher
                .matches(pattern, message_type)
                .await
                .unwrap_or(false)
            {
                subscribers.extend(entry.value().iter().copied());
            }
        }

        subscribers
    }

    /// The patterns `agent_id` is currently subscribed to.
    #[must_use]
    pub fn get_agent_subscriptions(&self, agent_id: AgentId) -> HashSet<MessagePattern> {
        self.by_agent
            .get(&agent_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Every agent id known to the registry (registered, even with zero
    /// subscriptions).
    #[must_use]
    pub fn get_all_active_agents(&self) -> HashSet<AgentId> {
        self.by_agent.iter().map(|entry| *entry.key()).collect()
    }

    /// Total number of distinct (agent, pattern) subscription pairs.
    #[must_use]
    pub fn get_subscription_count(&self) -> usize {
        self.by_agent.iter().map(|entry| entry.value().len()).sum()
    }
}

/// Shared handle to a [`SubscriptionRegistry`].
pub type SharedSubscriptionRegistry = Arc<SubscriptionRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::PatternCacheSize;
    use crate::pattern_matcher::PatternMatcher;

    fn registry() -> SubscriptionRegistry {
        let matcher = Arc::new(PatternMatcher::new(PatternCacheSize::try_new(100).unwrap()));
        SubscriptionRegistry::new(matcher, SubscriptionLimit::try_new(100).unwrap())
    }

    fn pattern(s: &str) -> MessagePattern {
        MessagePattern::try_new(s.to_string()).unwrap()
    }

    #[tokio::test]
    async fn exact_subscription_matches_only_exact_type() {
        let reg = registry();
        let agent = AgentId::generate();
        reg.subscribe(agent, pattern("task.created")).unwrap();

        let subs = reg.get_subscribers("task.created").await;
        assert!(subs.contains(&agent));

        let other = reg.get_subscribers("task.updated").await;
        assert!(!other.contains(&agent));
    }

    #[tokio::test]
    async fn wildcard_subscription_matches_multiple_types() {
        let reg = registry();
        let agent = AgentId::generate();
        reg.subscribe(agent, pattern("task.*")).unwrap();

        assert!(reg.get_subscribers("task.created").await.contains(&agent));
        assert!(reg.get_subscribers("task.updated").await.contains(&agent));
        assert!(!reg.get_subscribers("job.created").await.contains(&agent));
    }

    #[tokio::test]
    async fn subscribe_is_idempotent() {
        let reg = registry();
        let agent = AgentId::generate();
        reg.subscribe(agent, pattern("task.created")).unwrap();
        reg.subscribe(agent, pattern("task.created")).unwrap();
        assert_eq!(reg.get_agent_subscriptions(agent).len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let reg = registry();
        let agent = AgentId::generate();
        reg.unsubscribe(agent, &pattern("task.created"));
        reg.subscribe(agent, pattern("task.created")).unwrap();
        reg.unsubscribe(agent, &pattern("task.created"));
        reg.unsubscribe(agent, &pattern("task.created"));
        assert_eq!(reg.get_agent_subscriptions(agent).len(), 0);
    }

    #[tokio::test]
    async fn subscription_cap_is_enforced() {
        let matcher = Arc::new(PatternMatcher::new(PatternCacheSize::try_new(10).unwrap()));
        let reg = SubscriptionRegistry::new(matcher, SubscriptionLimit::try_new(2).unwrap());
        let agent = AgentId::generate();

        reg.subscribe(agent, pattern("a")).unwrap();
        reg.subscribe(agent, pattern("b")).unwrap();
        let result = reg.subscribe(agent, pattern("c"));
        assert!(matches!(
            result,
            Err(SubscriptionError::SubscriptionLimitExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn cleanup_removes_all_of_an_agents_subscriptions() {
        let reg = registry();
        let agent = AgentId::generate();
        reg.subscribe(agent, pattern("task.*")).unwrap();
        reg.subscribe(agent, pattern("job.created")).unwrap();

        reg.cleanup(agent);

        assert!(!reg.get_subscribers("task.created").await.contains(&agent));
        assert!(!reg.get_subscribers("job.created").await.contains(&agent));
        assert!(!reg.get_all_active_agents().contains(&agent));
    }
}
