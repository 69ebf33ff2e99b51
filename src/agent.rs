//! Agent: an isolated private store, message handlers, and an optional
//! messaging facet
//!
//! An `Agent` owns a private key/value memory store and a set of handlers
//! registered per message type. Handlers for a matching type are invoked in
//! parallel. Once `destroy()`'d, an agent is terminal: every further
//! operation returns [`AgentError::AgentDestroyed`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::instrument;

use crate::container::MessagingSystemContainer;
use crate::error::CorrelationError;
use crate::domain_types::{AgentId, MessagePattern};
use crate::error::{AgentError, ConfigError};
use crate::message::{Message, MessageFactory};

/// Handles every message delivered to an agent.
#[async_trait]
pub trait MessageHandler: Send + Sync + std::fmt::Debug {
    /// Invoked once per message received, regardless of the message's type.
    async fn handle(&self, message: Message);
}

/// The messaging-enabled facet of an agent: a reference to the container
/// it's attached to, plus whether the facet is currently active.
#[derive(Debug)]
struct MessagingFacet {
    container: Arc<MessagingSystemContainer>,
    enabled: AtomicBool,
}

/// An isolated agent: private memory, message handlers, and (optionally) a
/// live messaging facet.
#[derive(Debug)]
pub struct Agent {
    id: AgentId,
    memory: DashMap<String, Value>,
    handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
    destroyed: AtomicBool,
    messaging: RwLock<Option<MessagingFacet>>,
    factory: MessageFactory,
}

impl Agent {
    /// Creates a new, non-messaging-enabled agent.
    #[must_use]
    pub fn new(id: AgentId) -> Self {
        Self {
            id,
            memory: DashMap::new(),
            handlers: RwLock::new(Vec::new()),
            destroyed: AtomicBool::new(false),
            messaging: RwLock::new(None),
            factory: MessageFactory::new(),
        }
    }

    /// Creates a new agent with messaging enabled from the start, attached
    /// to `container`.
    #[must_use]
    pub fn with_messaging(id: AgentId, container: Arc<MessagingSystemContainer>) -> Self {
        container.subscriptions().register_agent(id);
        Self {
            id,
            memory: DashMap::new(),
            handlers: RwLock::new(Vec::new()),
            destroyed: AtomicBool::new(false),
            messaging: RwLock::new(Some(MessagingFacet {
                container,
                enabled: AtomicBool::new(true),
            })),
            factory: MessageFactory::new(),
        }
    }

    /// This agent's id.
    #[must_use]
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Whether the agent has not yet been destroyed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire)
    }

    fn ensure_active(&self) -> Result<(), AgentError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(AgentError::AgentDestroyed { agent_id: self.id })
        }
    }

    /// Reads a value from this agent's private memory store.
    ///
    /// # Errors
    /// Returns [`AgentError::AgentDestroyed`] if the agent has been
    /// destroyed.
    pub fn get_memory(&self, key: &str) -> Result<Option<Value>, AgentError> {
        self.ensure_active()?;
        Ok(self.memory.get(key).map(|entry| entry.clone()))
    }

    /// Writes a value into this agent's private memory store.
    ///
    /// # Errors
    /// Returns [`AgentError::AgentDestroyed`] if the agent has been
    /// destroyed.
    pub fn set_memory(&self, key: impl Into<String>, value: Value) -> Result<(), AgentError> {
        self.ensure_active()?;
        self.memory.insert(key.into(), value);
        Ok(())
    }

    /// Registers `handler` to run for every message this agent receives,
    /// regardless of its type.
    ///
    /// # Errors
    /// Returns [`AgentError::AgentDestroyed`] if the agent has been
    /// destroyed.
    ///
    /// # Panics
    /// Panics if the handler list's lock is poisoned by another thread
    /// having panicked while holding it.
    pub fn on_message(&self, handler: Arc<dyn MessageHandler>) -> Result<(), AgentError> {
        self.ensure_active()?;
        self.handlers.write().unwrap().push(handler);
        Ok(())
    }

    /// Invokes every registered handler in parallel, regardless of
    /// `message`'s type.
    ///
    /// # Errors
    /// Returns [`AgentError::AgentDestroyed`] if the agent has been
    /// destroyed.
    ///
    /// # Panics
    /// Panics if the handler list's lock is poisoned by another thread
    /// having panicked while holding it.
    #[instrument(skip(self, message))]
    pub async fn receive_message(&self, message: &Message) -> Result<(), AgentError> {
        self.ensure_active()?;

        let handlers = self.handlers.read().unwrap().clone();
        let futures = handlers.iter().map(|handler| handler.handle(message.clone()));
        futures::future::join_all(futures).await;
        Ok(())
    }

    /// Marks the agent as permanently destroyed, clearing its memory and
    /// unsubscribing it from its messaging facet, if any.
    ///
    /// # Panics
    /// Panics if the messaging facet's lock is poisoned by another thread
    /// having panicked while holding it.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.memory.clear();
        if let Some(facet) = self.messaging.read().unwrap().as_ref() {
            facet.container.subscriptions().cleanup(self.id);
            facet.container.correlation().cancel_pending_requests(self.id);
        }
    }

    /// Whether this agent currently has an enabled messaging facet.
    ///
    /// # Panics
    /// Panics if the messaging facet's lock is poisoned by another thread
    /// having panicked while holding it.
    #[must_use]
    pub fn is_messaging_enabled(&self) -> bool {
        self.messaging
            .read()
            .unwrap()
            .as_ref()
            .is_some_and(|facet| facet.enabled.load(Ordering::Acquire))
    }

    /// Attaches (or re-enables) a messaging facet bound to `container`.
    /// Takes `&self` rather than `&mut self` since agents are shared behind
    /// an `Arc` once registered with an `AgentManager`.
    ///
    /// # Errors
    /// Returns [`AgentError::AgentDestroyed`] if the agent has been
    /// destroyed.
    ///
    /// # Panics
    /// Panics if the messaging facet's lock is poisoned by another thread
    /// having panicked while holding it.
    pub fn enable_messaging(
        &self,
        container: Arc<MessagingSystemContainer>,
    ) -> Result<(), AgentError> {
        self.ensure_active()?;
        container.subscriptions().register_agent(self.id);
        *self.messaging.write().unwrap() = Some(MessagingFacet {
            container,
            enabled: AtomicBool::new(true),
        });
        Ok(())
    }

    /// The messaging container behind this agent's enabled facet, cloned out
    /// so it can be used across an `.await` without holding the facet lock.
    fn facet(&self) -> Result<Arc<MessagingSystemContainer>, AgentError> {
        self.messaging
            .read()
            .unwrap()
            .as_ref()
            .filter(|facet| facet.enabled.load(Ordering::Acquire))
            .map(|facet| Arc::clone(&facet.container))
            .ok_or(AgentError::MessagingDisabled { agent_id: self.id })
    }

    /// Subscribes this agent to `pattern` through its messaging facet.
    ///
    /// # Errors
    /// Returns [`AgentError::MessagingDisabled`] if messaging isn't
    /// enabled, or [`AgentError::Subscription`] if the subscription cap is
    /// exceeded.
    pub fn subscribe_to_messages(&self, pattern: MessagePattern) -> Result<(), AgentError> {
        self.ensure_active()?;
        let container = self.facet()?;
        container
            .subscriptions()
            .subscribe(self.id, pattern)
            .map_err(AgentError::from)
    }

    /// Unsubscribes this agent from `pattern`. Idempotent.
    ///
    /// # Errors
    /// Returns [`AgentError::MessagingDisabled`] if messaging isn't
    /// enabled.
    pub fn unsubscribe_from_messages(&self, pattern: &MessagePattern) -> Result<(), AgentError> {
        self.ensure_active()?;
        let container = self.facet()?;
        container.subscriptions().unsubscribe(self.id, pattern);
        Ok(())
    }

    /// The patterns this agent is currently subscribed to.
    ///
    /// # Errors
    /// Returns [`AgentError::MessagingDisabled`] if messaging isn't
    /// enabled.
    pub fn get_active_subscriptions(&self) -> Result<HashSet<MessagePattern>, AgentError> {
        let container = self.facet()?;
        Ok(container.subscriptions().get_agent_subscriptions(self.id))
    }

    /// Publishes a message of `message_type` to every matching subscriber.
    ///
    /// # Errors
    /// Returns [`AgentError::MessagingDisabled`] if messaging isn't
    /// enabled, or wraps a [`crate::error::MessageError`] surfaced as
    /// [`ConfigError`] via the top-level error if construction fails — see
    /// [`MessageFactory::create`].
    pub async fn publish_message(
        &self,
        message_type: impl Into<String>,
        payload: Value,
        handler: &dyn crate::delivery_engine::RecipientHandler,
    ) -> Result<(), AgentError> {
        self.ensure_active()?;
        let container = self.facet()?;

        let message = self
            .factory
            .create(self.id, self.id, message_type, payload)
            .map_err(|e| AgentError::InvalidConfiguration(ConfigError::InvalidConfiguration {
                field: "message".to_string(),
                reason: e.to_string(),
            }))?;

        container.router().route(handler, &message, false).await;
        Ok(())
    }

    /// Sends a request directly to `to` and awaits its correlated response
    /// (or timeout). Bypasses subscription lookup, like
    /// [`crate::agent_manager::AgentManager::send_message`].
    ///
    /// # Errors
    /// Returns [`AgentError::MessagingDisabled`] if messaging isn't
    /// enabled, or propagates the underlying [`CorrelationError`].
    pub async fn request(
        &self,
        to: AgentId,
        message_type: impl Into<String>,
        payload: Value,
        handler: &dyn crate::delivery_engine::RecipientHandler,
        timeout_ms: Option<u64>,
    ) -> Result<Message, AgentError> {
        self.ensure_active()?;
        let container = self.facet()?;

        let message = self
            .factory
            .create(self.id, to, message_type, payload)
            .map_err(|e| AgentError::InvalidConfiguration(ConfigError::InvalidConfiguration {
                field: "message".to_string(),
                reason: e.to_string(),
            }))?;

        let rx = container
            .correlation()
            .register_request(message.id(), self.id, timeout_ms)
            .map_err(|e| correlation_into_agent_error(&e))?;

        let _ = handler.deliver_to(to, &message).await;

        match rx.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(correlation_error)) => Err(correlation_into_agent_error(&correlation_error)),
            Err(_recv_error) => Err(AgentError::MessagingDisabled { agent_id: self.id }),
        }
    }

    /// Replies to `request`, echoing its id so the Correlation Manager can
    /// match the reply back to the original waiter.
    ///
    /// # Errors
    /// Returns [`AgentError::MessagingDisabled`] if messaging isn't enabled.
    pub async fn reply(
        &self,
        request: &Message,
        message_type: impl Into<String>,
        payload: Value,
        handler: &dyn crate::delivery_engine::RecipientHandler,
    ) -> Result<(), AgentError> {
        self.ensure_active()?;
        self.facet()?;

        let reply = self
            .factory
            .create_reply(request.id(), self.id, request.from(), message_type, payload)
            .map_err(|e| AgentError::InvalidConfiguration(ConfigError::InvalidConfiguration {
                field: "message".to_string(),
                reason: e.to_string(),
            }))?;

        let _ = handler.deliver_to(request.from(), &reply).await;
        Ok(())
    }
}

fn correlation_into_agent_error(error: &CorrelationError) -> AgentError {
    AgentError::InvalidConfiguration(ConfigError::InvalidConfiguration {
        field: "correlation".to_string(),
        reason: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(&self, _message: Message) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn memory_round_trips() {
        let agent = Agent::new(AgentId::generate());
        agent.set_memory("count", serde_json::json!(1)).unwrap();
        assert_eq!(agent.get_memory("count").unwrap(), Some(serde_json::json!(1)));
    }

    #[test]
    fn destroyed_agent_rejects_memory_access() {
        let agent = Agent::new(AgentId::generate());
        agent.destroy();
        assert!(agent.get_memory("count").is_err());
        assert!(agent.set_memory("count", serde_json::json!(1)).is_err());
    }

    #[tokio::test]
    async fn receive_message_invokes_every_handler_in_parallel() {
        let agent = Agent::new(AgentId::generate());
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        agent.on_message(handler.clone()).unwrap();

        let factory = MessageFactory::new();
        let message = factory
            .create(agent.id(), agent.id(), "task.created", serde_json::json!({}))
            .unwrap();

        agent.receive_message(&message).await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handlers_fire_regardless_of_the_message_type_received() {
        let agent = Agent::new(AgentId::generate());
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        agent.on_message(handler.clone()).unwrap();

        let factory = MessageFactory::new();
        let different_type = factory
            .create(agent.id(), agent.id(), "something.else", serde_json::json!({}))
            .unwrap();

        agent.receive_message(&different_type).await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn destroy_is_terminal() {
        let agent = Agent::new(AgentId::generate());
        assert!(agent.is_active());
        agent.destroy();
        assert!(!agent.is_active());
    }

    #[test]
    fn new_agent_has_no_messaging_facet() {
        let agent = Agent::new(AgentId::generate());
        assert!(!agent.is_messaging_enabled());
        assert!(agent.get_active_subscriptions().is_err());
    }
}
