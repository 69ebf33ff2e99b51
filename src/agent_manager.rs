//! Singleton-scoped lifecycle coordinator for agents
//!
//! `AgentManager` exclusively owns every `Agent` it creates, enforces the
//! global agent cap, and offers direct send/broadcast that bypass the
//! router's subscription lookup entirely — a direct send always goes
//! straight to its named recipient.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{instrument, warn};

use crate::agent::Agent;
use crate::config::MessagingConfig;
use crate::container::MessagingSystemContainer;
use crate::delivery_engine::RecipientHandler;
use crate::domain_types::AgentId;
use crate::error::{AgentError, ConfigError, DeliveryError, ManagerError};
use crate::message::{Message, MessageFactory};
use crate::observability::{
    tracing_metrics, SharedMetrics, METRIC_AGENT_CREATION_MS, METRIC_AGENT_DESTRUCTION_MS,
    METRIC_MESSAGE_DELIVERY_MS,
};

const AGENT_CREATION_WARN_THRESHOLD_MS: f64 = 50.0;
const AGENT_DESTRUCTION_WARN_THRESHOLD_MS: f64 = 100.0;
const MESSAGE_DELIVERY_WARN_THRESHOLD_MS: f64 = 10.0;

/// Aggregate counters describing the manager's messaging-enabled agents.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagingStats {
    /// Agents currently registered
    pub agent_count: usize,
    /// Agents with an enabled messaging facet
    pub messaging_enabled_count: usize,
}

/// Optional knobs for [`AgentManager::create_agent`].
#[derive(Debug, Clone, Copy)]
pub struct CreateAgentOpts {
    /// Whether the created agent should start with its messaging facet
    /// attached. Defaults to `true`; set `false` to create an isolated agent
    /// that can be wired up later via
    /// [`AgentManager::enable_agent_messaging`].
    pub enable_messaging: bool,
}

impl Default for CreateAgentOpts {
    fn default() -> Self {
        Self {
            enable_messaging: true,
        }
    }
}

/// Owns every agent in the system: creation, lookup, destruction, direct
/// send, and broadcast.
#[derive(Debug)]
pub struct AgentManager {
    agents: DashMap<AgentId, Arc<Agent>>,
    container: Arc<MessagingSystemContainer>,
    max_agents: usize,
    factory: MessageFactory,
    metrics: SharedMetrics,
}

#[async_trait]
impl RecipientHandler for AgentManager {
    async fn deliver_to(&self, agent_id: AgentId, message: &Message) -> Result<(), DeliveryError> {
        if self.container.correlation().requester_for(message.id()) == Some(agent_id) {
            self.container.correlation().handle_response(message.clone());
            return Ok(());
        }

        let Some(agent) = self.agents.get(&agent_id).map(|entry| Arc::clone(&entry)) else {
            return Err(DeliveryError::AgentUnavailable {
                agent_id,
                reason: "not registered".to_string(),
            });
        };
        agent
            .receive_message(message)
            .await
            .map_err(|_| DeliveryError::AgentDestroyed { agent_id })
    }
}

impl AgentManager {
    /// Creates a manager wired to its own `MessagingSystemContainer` built
    /// from `config`.
    #[must_use]
    pub fn new(config: &MessagingConfig) -> Self {
        Self::with_container(config, Arc::new(MessagingSystemContainer::create(config)))
    }

    /// Creates a manager around an already-wired container (used by tests
    /// that need a deterministic `TimeProvider`).
    #[must_use]
    pub fn with_container(config: &MessagingConfig, container: Arc<MessagingSystemContainer>) -> Self {
        Self::with_metrics(config, container, tracing_metrics())
    }

    /// Creates a manager around an already-wired container and a
    /// caller-supplied metrics sink (used by embedders that want their own
    /// telemetry backend, and by tests asserting on recorded observations).
    #[must_use]
    pub fn with_metrics(
        config: &MessagingConfig,
        container: Arc<MessagingSystemContainer>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            agents: DashMap::new(),
            container,
            max_agents: config.max_agents.as_usize(),
            factory: MessageFactory::new(),
            metrics,
        }
    }

    /// Creates a new agent, optionally with a caller-supplied id and
    /// creation options. Messaging is enabled by default; pass
    /// `opts.enable_messaging = false` to create an isolated agent and wire
    /// it up later with [`AgentManager::enable_agent_messaging`].
    ///
    /// # Errors
    /// Returns [`ManagerError::AgentLimitExceeded`] if the manager is
    /// already at its configured agent cap, or
    /// [`ManagerError::DuplicateAgentId`] if `id` is already registered.
    #[instrument(skip(self))]
    pub fn create_agent(
        &self,
        id: Option<AgentId>,
        opts: Option<CreateAgentOpts>,
    ) -> Result<AgentId, ManagerError> {
        let start = Instant::now();

        if self.agents.len() >= self.max_agents {
            return Err(ManagerError::AgentLimitExceeded);
        }

        let id = id.unwrap_or_else(AgentId::generate);
        if self.agents.contains_key(&id) {
            return Err(ManagerError::DuplicateAgentId { agent_id: id });
        }

        let opts = opts.unwrap_or_default();
        let agent = if opts.enable_messaging {
            Arc::new(Agent::with_messaging(id, Arc::clone(&self.container)))
        } else {
            Arc::new(Agent::new(id))
        };
        self.agents.insert(id, agent);

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let id_label = id.to_string();
        self.metrics
            .observe(METRIC_AGENT_CREATION_MS, &[("agent_id", &id_label)], elapsed_ms);
        if elapsed_ms > AGENT_CREATION_WARN_THRESHOLD_MS {
            warn!(agent_id = %id, elapsed_ms, "agent creation exceeded budget");
        }

        Ok(id)
    }

    /// Looks up an agent by id.
    #[must_use]
    pub fn get_agent(&self, agent_id: AgentId) -> Option<Arc<Agent>> {
        self.agents.get(&agent_id).map(|entry| Arc::clone(&entry))
    }

    /// Whether `agent_id` is currently registered.
    #[must_use]
    pub fn has_agent(&self, agent_id: AgentId) -> bool {
        self.agents.contains_key(&agent_id)
    }

    /// Every agent id currently registered.
    #[must_use]
    pub fn list_agents(&self) -> HashSet<AgentId> {
        self.agents.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of agents currently registered.
    #[must_use]
    pub fn get_agent_count(&self) -> usize {
        self.agents.len()
    }

    /// The messaging system container every agent here is wired through.
    #[must_use]
    pub fn container(&self) -> &Arc<MessagingSystemContainer> {
        &self.container
    }

    /// Destroys `agent_id`: marks it terminal, cancels its pending
    /// requests, and removes it from the manager.
    ///
    /// # Errors
    /// Returns [`ManagerError::AgentNotFound`] if no such agent is
    /// registered.
    #[instrument(skip(self))]
    pub fn destroy_agent(&self, agent_id: AgentId) -> Result<(), ManagerError> {
        let start = Instant::now();

        let (_, agent) = self
            .agents
            .remove(&agent_id)
            .ok_or(ManagerError::AgentNotFound { agent_id })?;
        agent.destroy();

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let id_label = agent_id.to_string();
        self.metrics.observe(
            METRIC_AGENT_DESTRUCTION_MS,
            &[("agent_id", &id_label)],
            elapsed_ms,
        );
        if elapsed_ms > AGENT_DESTRUCTION_WARN_THRESHOLD_MS {
            warn!(agent_id = %agent_id, elapsed_ms, "agent destruction exceeded budget");
        }

        Ok(())
    }

    /// Destroys every registered agent.
    pub fn destroy_all(&self) {
        let ids: Vec<AgentId> = self.agents.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            let _ = self.destroy_agent(id);
        }
    }

    fn build_message(
        &self,
        from: AgentId,
        to: AgentId,
        message_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<Message, ManagerError> {
        self.factory.create(from, to, message_type, payload).map_err(|e| {
            ManagerError::Agent(AgentError::InvalidConfiguration(
                ConfigError::InvalidConfiguration {
                    field: "message".to_string(),
                    reason: e.to_string(),
                },
            ))
        })
    }

    /// Sends `payload` directly to `to`, bypassing subscription lookup
    /// entirely.
    ///
    /// # Errors
    /// Returns [`ManagerError::AgentNotFound`] if `to` isn't registered, or
    /// wraps the underlying message construction or delivery failure.
    #[instrument(skip(self, payload, message_type))]
    pub async fn send_message(
        &self,
        from: AgentId,
        to: AgentId,
        message_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<(), ManagerError> {
        let start = Instant::now();

        if !self.has_agent(to) {
            return Err(ManagerError::AgentNotFound { agent_id: to });
        }

        let message = self.build_message(from, to, message_type, payload)?;

        let result = <Self as RecipientHandler>::deliver_to(self, to, &message)
            .await
            .map_err(|error| ManagerError::Agent(AgentError::InvalidConfiguration(
                ConfigError::InvalidConfiguration {
                    field: "delivery".to_string(),
                    reason: error.to_string(),
                },
            )));

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let to_label = to.to_string();
        self.metrics.observe(
            METRIC_MESSAGE_DELIVERY_MS,
            &[("agent_id", &to_label)],
            elapsed_ms,
        );
        if elapsed_ms > MESSAGE_DELIVERY_WARN_THRESHOLD_MS {
            warn!(to = %to, elapsed_ms, "message delivery exceeded budget");
        }

        result
    }

    /// Broadcasts `payload` to every registered agent except `from`.
    ///
    /// # Errors
    /// Returns a wrapped message-construction failure; individual recipient
    /// delivery failures are swallowed in the returned recipient list, not
    /// surfaced as an error.
    #[instrument(skip(self, payload, message_type))]
    pub async fn broadcast_message(
        &self,
        from: AgentId,
        message_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<Vec<AgentId>, ManagerError> {
        let message = self.build_message(from, from, message_type, payload)?;

        let recipients: Vec<AgentId> = self
            .agents
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| *id != from)
            .collect();

        for recipient in &recipients {
            let _ = <Self as RecipientHandler>::deliver_to(self, *recipient, &message).await;
        }

        Ok(recipients)
    }

    /// Enables messaging on an agent that was created without it.
    ///
    /// # Errors
    /// Returns [`ManagerError::AgentNotFound`] if `agent_id` isn't
    /// registered, or wraps the underlying [`AgentError`] if the agent has
    /// since been destroyed.
    pub fn enable_agent_messaging(&self, agent_id: AgentId) -> Result<(), ManagerError> {
        let agent = self
            .agents
            .get(&agent_id)
            .map(|entry| Arc::clone(&entry))
            .ok_or(ManagerError::AgentNotFound { agent_id })?;
        agent
            .enable_messaging(Arc::clone(&self.container))
            .map_err(ManagerError::Agent)
    }

    /// Aggregate counters across every registered agent.
    #[must_use]
    pub fn get_messaging_stats(&self) -> MessagingStats {
        let agent_count = self.agents.len();
        let messaging_enabled_count = self
            .agents
            .iter()
            .filter(|entry| entry.value().is_messaging_enabled())
            .count();
        MessagingStats {
            agent_count,
            messaging_enabled_count,
        }
    }
}
