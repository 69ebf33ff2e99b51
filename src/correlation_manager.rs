//! Tracks pending request/response pairs and resolves or times them out
//!
//! A requester calls [`CorrelationManager::register_request`] before
//! publishing its request message, receiving a future that resolves when a
//! matching response arrives (matched by the request's [`MessageId`] echoed
//! back as the response's id), when the deadline elapses, or when the
//! request is cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{instrument, warn};

use crate::domain_types::{AgentId, MessageId, PendingRequestLimit, RequestTimeoutMs};
use crate::error::CorrelationError;
use crate::message::Message;
use crate::time_provider::SharedTimeProvider;

/// How often the background sweep scans for stale pending requests.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// A pending request is force-removed by the sweep once it's been sitting
/// this long, regardless of its own registered timeout — a backstop against
/// a waiter whose per-request timer was itself lost (e.g. the runtime was
/// under enough load that the spawned timer task starved).
const MAX_PENDING_AGE: Duration = Duration::from_mins(5);
const MAX_PENDING_AGE_MS: u64 = MAX_PENDING_AGE.as_secs() * 1000;

#[derive(Debug)]
struct PendingRequest {
    requester_id: AgentId,
    created_at: Instant,
    resolver: oneshot::Sender<Result<Message, CorrelationError>>,
}

/// Aggregate counters describing the manager's current load.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationStats {
    /// Number of requests currently awaiting a response
    pub pending_count: usize,
    /// Configured cap on pending requests
    pub limit: usize,
}

/// Owns the pending-request table and the timers that expire them.
#[derive(Debug)]
pub struct CorrelationManager {
    pending: DashMap<MessageId, PendingRequest>,
    limit: PendingRequestLimit,
    default_timeout: RequestTimeoutMs,
    time_provider: SharedTimeProvider,
    sweep_stopped: Arc<AtomicBool>,
}

impl CorrelationManager {
    /// Creates an empty manager. Call [`CorrelationManager::start_sweep`]
    /// once it's wrapped in an `Arc` to begin the background cleanup sweep.
    #[must_use]
    pub fn new(
        limit: PendingRequestLimit,
        default_timeout: RequestTimeoutMs,
        time_provider: SharedTimeProvider,
    ) -> Self {
        Self {
            pending: DashMap::new(),
            limit,
            default_timeout,
            time_provider,
            sweep_stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A fresh correlation id. Equivalent to `MessageId::generate()` —
    /// exposed here so callers that need a correlation id before they've
    /// built the request message itself don't have to reach into
    /// `domain_types` directly.
    #[must_use]
    pub fn generate_correlation_id() -> MessageId {
        MessageId::generate()
    }

    /// Spawns the periodic background sweep: every [`SWEEP_INTERVAL`], scans
    /// every pending request and force-removes any older than
    /// [`MAX_PENDING_AGE`], independent of its own per-request timeout timer
    /// (a backstop for a waiter whose timer task was itself lost). Call once
    /// per manager, after wrapping it in an `Arc`. Stop the task for a
    /// graceful shutdown with [`CorrelationManager::stop_sweep`].
    pub fn start_sweep(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let time_provider = Arc::clone(&self.time_provider);
        let stopped = Arc::clone(&self.sweep_stopped);
        tokio::spawn(async move {
            loop {
                time_provider.sleep(SWEEP_INTERVAL).await;
                if stopped.load(Ordering::Acquire) {
                    break;
                }
                manager.sweep_stale();
            }
        });
    }

    /// Signals the background sweep task to stop at its next wakeup, for
    /// graceful shutdown.
    pub fn stop_sweep(&self) {
        self.sweep_stopped.store(true, Ordering::Release);
    }

    fn sweep_stale(&self) {
        let stale_ids: Vec<MessageId> = self
            .pending
            .iter()
            .filter(|entry| entry.value().created_at.elapsed() >= MAX_PENDING_AGE)
            .map(|entry| *entry.key())
            .collect();

        for correlation_id in stale_ids {
            if let Some((_, pending)) = self.pending.remove(&correlation_id) {
                warn!(%correlation_id, "sweep force-removed stale pending request");
                let _ = pending.resolver.send(Err(CorrelationError::RequestTimeout {
                    correlation_id,
                    requester_id: pending.requester_id,
                    timeout_ms: MAX_PENDING_AGE_MS,
                }));
            }
        }
    }

    /// Registers a pending request keyed by `correlation_id` (normally the
    /// request message's own id) and spawns the timer that will time it out
    /// after `timeout_ms` (or the manager's default if `None`).
    ///
    /// # Errors
    /// Returns [`CorrelationError::ResourceExhausted`] if the manager is
    /// already tracking its configured maximum of pending requests.
    #[instrument(skip(self))]
    pub fn register_request(
        self: &Arc<Self>,
        correlation_id: MessageId,
        requester_id: AgentId,
        timeout_ms: Option<u64>,
    ) -> Result<oneshot::Receiver<Result<Message, CorrelationError>>, CorrelationError> {
        if self.pending.len() >= self.limit.as_usize() {
            return Err(CorrelationError::ResourceExhausted);
        }

        let timeout_ms = timeout_ms.unwrap_or_else(|| self.default_timeout.as_u64());
        let (tx, rx) = oneshot::channel();

        self.pending.insert(
            correlation_id,
            PendingRequest {
                requester_id,
                created_at: Instant::now(),
                resolver: tx,
            },
        );

        let manager = Arc::clone(self);
        let time_provider = Arc::clone(&self.time_provider);
        tokio::spawn(async move {
            time_provider
                .sleep(std::time::Duration::from_millis(timeout_ms))
                .await;
            manager.expire(correlation_id, timeout_ms);
        });

        Ok(rx)
    }

    /// Delivers `response` to the waiter registered under its id, if any.
    /// Responses whose type contains "error" resolve the waiter with
    /// [`CorrelationError::RequestFailed`] rather than success.
    #[instrument(skip(self, response))]
    pub fn handle_response(&self, response: Message) {
        if let Some((_, pending)) = self.pending.remove(&response.id()) {
            let result = if response.is_error_response() {
                Err(CorrelationError::RequestFailed {
                    correlation_id: response.id(),
                    payload: response.payload().clone(),
                })
            } else {
                Ok(response)
            };
            let _ = pending.resolver.send(result);
        }
    }

    /// Cancels a single pending request, resolving its waiter with
    /// [`CorrelationError::RequestCancelled`].
    pub fn cancel_request(&self, correlation_id: MessageId) {
        if let Some((_, pending)) = self.pending.remove(&correlation_id) {
            let _ = pending
                .resolver
                .send(Err(CorrelationError::RequestCancelled { correlation_id }));
        }
    }

    /// Cancels every pending request issued by `requester_id` — called when
    /// an agent is destroyed so its in-flight requests don't leak.
    pub fn cancel_pending_requests(&self, requester_id: AgentId) {
        let ids: Vec<MessageId> = self
            .pending
            .iter()
            .filter(|entry| entry.value().requester_id == requester_id)
            .map(|entry| *entry.key())
            .collect();
        for id in ids {
            self.cancel_request(id);
        }
    }

    /// Whether `correlation_id` currently has a pending waiter.
    #[must_use]
    pub fn has_pending_request(&self, correlation_id: MessageId) -> bool {
        self.pending.contains_key(&correlation_id)
    }

    /// The agent that registered `correlation_id`, if it's still pending.
    ///
    /// Used to tell a request message apart from its reply when both carry
    /// the same id: only a delivery addressed to the original requester is
    /// the response being awaited.
    #[must_use]
    pub fn requester_for(&self, correlation_id: MessageId) -> Option<AgentId> {
        self.pending.get(&correlation_id).map(|entry| entry.requester_id)
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn get_pending_request_count(&self) -> usize {
        self.pending.len()
    }

    /// How long `correlation_id` has been pending, if it still is.
    #[must_use]
    pub fn get_request_age(&self, correlation_id: MessageId) -> Option<std::time::Duration> {
        self.pending
            .get(&correlation_id)
            .map(|entry| entry.created_at.elapsed())
    }

    /// A snapshot of the manager's current load.
    #[must_use]
    pub fn get_stats(&self) -> CorrelationStats {
        CorrelationStats {
            pending_count: self.pending.len(),
            limit: self.limit.as_usize(),
        }
    }

    fn expire(&self, correlation_id: MessageId, timeout_ms: u64) {
        if let Some((_, pending)) = self.pending.remove(&correlation_id) {
            warn!(%correlation_id, timeout_ms, "request timed out");
            let _ = pending.resolver.send(Err(CorrelationError::RequestTimeout {
                correlation_id,
                requester_id: pending.requester_id,
                timeout_ms,
            }));
        }
    }
}

/// Shared handle to a [`CorrelationManager`].
pub type SharedCorrelationManager = Arc<CorrelationManager>;
