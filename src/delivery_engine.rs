//! Delivers a message to a set of recipient handlers with bounded
//! concurrency and per-recipient retry
//!
//! Delivery to distinct recipients runs concurrently, capped by a
//! semaphore. A transient failure (`AgentUnavailable`/handler error) is
//! retried up to twice with exponential backoff (10ms, then 40ms);
//! `AgentDestroyed` is never retried.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{instrument, warn};

use crate::domain_types::{AgentId, MaxConcurrentDeliveries};
use crate::error::DeliveryError;
use crate::message::Message;
use crate::time_provider::SharedTimeProvider;

const RETRY_DELAYS_MS: [u64; 2] = [10, 40];

/// Delivers a message to a single agent's handler. Implemented by whatever
/// holds the actual agent handle (the `AgentManager`, in practice).
#[async_trait]
pub trait RecipientHandler: Send + Sync + std::fmt::Debug {
    /// Invokes the recipient's handler with `message`.
    ///
    /// # Errors
    /// Returns a [`DeliveryError`] describing why delivery failed.
    async fn deliver_to(&self, agent_id: AgentId, message: &Message) -> Result<(), DeliveryError>;
}

/// Outcome of delivering one message to a set of recipients.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    /// Recipients the message was successfully delivered to
    pub delivered: Vec<AgentId>,
    /// Recipients delivery failed for, with the terminal error
    pub failed: Vec<(AgentId, DeliveryError)>,
    /// Wall-clock time the whole delivery took
    pub duration: Duration,
}

/// Delivers messages to recipient sets with a concurrency cap and retry.
#[derive(Debug)]
pub struct DeliveryEngine {
    semaphore: Arc<Semaphore>,
    time_provider: SharedTimeProvider,
}

impl DeliveryEngine {
    /// Creates an engine bounded to `max_concurrent` simultaneous handler
    /// invocations.
    #[must_use]
    pub fn new(max_concurrent: MaxConcurrentDeliveries, time_provider: SharedTimeProvider) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.as_usize())),
            time_provider,
        }
    }

    /// Delivers `message` to every id in `recipients` through `handler`,
    /// running deliveries concurrently up to the engine's cap.
    ///
    /// # Panics
    /// Never panics; the internal semaphore is never closed.
    #[instrument(skip(self, handler, message))]
    pub async fn deliver(
        &self,
        handler: &dyn RecipientHandler,
        recipients: &HashSet<AgentId>,
        message: &Message,
    ) -> DeliveryResult {
        let start = Instant::now();

        let futures = recipients.iter().map(|agent_id| {
            let agent_id = *agent_id;
            let semaphore = Arc::clone(&self.semaphore);
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                let result = self.deliver_with_retry(handler, agent_id, message).await;
                (agent_id, result)
            }
        });

        let outcomes = futures::future::join_all(futures).await;

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for (agent_id, result) in outcomes {
            match result {
                Ok(()) => delivered.push(agent_id),
                Err(error) => failed.push((agent_id, error)),
            }
        }

        DeliveryResult {
            delivered,
            failed,
            duration: start.elapsed(),
        }
    }

    async fn deliver_with_retry(
        &self,
        handler: &dyn RecipientHandler,
        agent_id: AgentId,
        message: &Message,
    ) -> Result<(), DeliveryError> {
        let mut last_error = handler.deliver_to(agent_id, message).await;

        for delay_ms in RETRY_DELAYS_MS {
            let Err(error) = &last_error else {
                return Ok(());
            };
            if !error.is_retryable() {
                break;
            }
            warn!(%agent_id, delay_ms, "retrying delivery after transient failure");
            self.time_provider
                .sleep(Duration::from_millis(delay_ms))
                .await;
            last_error = handler.deliver_to(agent_id, message).await;
        }

        last_error
    }
}

/// Shared handle to a [`DeliveryEngine`].
pub type SharedDeliveryEngine = Arc<DeliveryEngine>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageFactory;
    use crate::time_provider::test_time_provider;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct FlakyHandler {
        fail_times: AtomicUsize,
        destroyed: HashSet<AgentId>,
        calls: Mutex<Vec<AgentId>>,
    }

    #[async_trait]
    impl RecipientHandler for FlakyHandler {
        async fn deliver_to(
            &self,
            agent_id: AgentId,
            _message: &Message,
        ) -> Result<(), DeliveryError> {
            self.calls.lock().unwrap().push(agent_id);
            if self.destroyed.contains(&agent_id) {
                return Err(DeliveryError::AgentDestroyed { agent_id });
            }
            let remaining = self.fail_times.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(DeliveryError::AgentUnavailable {
                    agent_id,
                    reason: "busy".to_string(),
                });
            }
            Ok(())
        }
    }

    fn engine() -> DeliveryEngine {
        DeliveryEngine::new(
            MaxConcurrentDeliveries::try_new(10).unwrap(),
            test_time_provider(),
        )
    }

    #[tokio::test]
    async fn delivers_to_all_recipients_on_success() {
        let engine = engine();
        let handler = FlakyHandler {
            fail_times: AtomicUsize::new(0),
            destroyed: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        };
        let factory = MessageFactory::new();
        let sender = AgentId::generate();
        let message = factory.create(sender, sender, "ping", json!({})).unwrap();
        let recipients: HashSet<_> = (0..3).map(|_| AgentId::generate()).collect();

        let result = engine.deliver(&handler, &recipients, &message).await;

        assert_eq!(result.delivered.len(), 3);
        assert!(result.failed.is_empty());
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let engine = engine();
        let handler = FlakyHandler {
            fail_times: AtomicUsize::new(2),
            destroyed: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        };
        let factory = MessageFactory::new();
        let sender = AgentId::generate();
        let message = factory.create(sender, sender, "ping", json!({})).unwrap();
        let mut recipients = HashSet::new();
        recipients.insert(AgentId::generate());

        let result = engine.deliver(&handler, &recipients, &message).await;

        assert_eq!(result.delivered.len(), 1);
        assert_eq!(handler.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn does_not_retry_destroyed_agents() {
        let engine = engine();
        let agent_id = AgentId::generate();
        let mut destroyed = HashSet::new();
        destroyed.insert(agent_id);
        let handler = FlakyHandler {
            fail_times: AtomicUsize::new(0),
            destroyed,
            calls: Mutex::new(Vec::new()),
        };
        let factory = MessageFactory::new();
        let sender = AgentId::generate();
        let message = factory.create(sender, sender, "ping", json!({})).unwrap();
        let mut recipients = HashSet::new();
        recipients.insert(agent_id);

        let result = engine.deliver(&handler, &recipients, &message).await;

        assert_eq!(result.failed.len(), 1);
        assert_eq!(handler.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_retries() {
        let engine = engine();
        let handler = FlakyHandler {
            fail_times: AtomicUsize::new(10),
            destroyed: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        };
        let factory = MessageFactory::new();
        let sender = AgentId::generate();
        let message = factory.create(sender, sender, "ping", json!({})).unwrap();
        let mut recipients = HashSet::new();
        recipients.insert(AgentId::generate());

        let result = engine.deliver(&handler, &recipients, &message).await;

        assert_eq!(result.failed.len(), 1);
        assert_eq!(handler.calls.lock().unwrap().len(), 3);
    }
}
