//! Per-component health tracking and circuit breakers
//!
//! Each tracked component moves through a three-state circuit breaker:
//! `Closed` (healthy, requests flow), `Open` (tripped after too many
//! consecutive failures, requests should be rejected), and `HalfOpen`
//! (recovery attempt in progress — one probe is allowed through).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::{instrument, warn};

use crate::domain_types::CircuitBreakerThreshold;
use crate::error::HealthError;

/// Health-check evaluation should complete within this budget; exceeding it
/// only logs a warning.
const HEALTH_CHECK_WARN_THRESHOLD_MS: u128 = 1;

/// The three states a component's circuit breaker can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Healthy: requests are allowed through.
    Closed,
    /// Tripped: requests should be rejected until recovery is attempted.
    Open,
    /// A single recovery probe is in flight.
    HalfOpen,
}

#[derive(Debug, Clone)]
struct ComponentHealth {
    healthy: bool,
    failure_count: u32,
    last_message: Option<String>,
    last_error: Option<String>,
    last_check_time: Instant,
    state: CircuitState,
    threshold: u32,
}

impl ComponentHealth {
    fn new(threshold: u32) -> Self {
        Self {
            healthy: true,
            failure_count: 0,
            last_message: None,
            last_error: None,
            last_check_time: Instant::now(),
            state: CircuitState::Closed,
            threshold,
        }
    }
}

/// A point-in-time snapshot of one component's health, returned to callers.
#[derive(Debug, Clone)]
pub struct ComponentHealthReport {
    /// Whether the component is currently considered healthy
    pub healthy: bool,
    /// Consecutive failures accrued since the last success
    pub failure_count: u32,
    /// Last status message recorded, if any
    pub last_message: Option<String>,
    /// Last error recorded, if any
    pub last_error: Option<String>,
    /// Current circuit breaker state
    pub state: CircuitState,
}

/// Aggregate counters describing the monitor's tracked components.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthStats {
    /// Number of components currently tracked
    pub component_count: usize,
    /// Number of components whose circuit is Open
    pub open_count: usize,
}

/// Tracks health and circuit-breaker state for an arbitrary set of named
/// components.
#[derive(Debug)]
pub struct HealthMonitor {
    components: DashMap<String, ComponentHealth>,
    default_threshold: CircuitBreakerThreshold,
}

impl HealthMonitor {
    /// Creates a monitor with no components yet registered.
    #[must_use]
    pub fn new(default_threshold: CircuitBreakerThreshold) -> Self {
        Self {
            components: DashMap::new(),
            default_threshold,
        }
    }

    /// Records a successful health check for `component_id`, clearing its
    /// failure count and, if it was `HalfOpen`, closing the circuit.
    #[instrument(skip(self))]
    pub fn record_health(&self, component_id: &str, message: Option<String>) {
        let start = Instant::now();
        let mut entry = self
            .components
            .entry(component_id.to_string())
            .or_insert_with(|| ComponentHealth::new(self.default_threshold.as_u32()));

        entry.healthy = true;
        entry.failure_count = 0;
        entry.last_message = message;
        entry.last_check_time = Instant::now();
        entry.state = CircuitState::Closed;

        Self::warn_if_slow(start);
    }

    /// Records a failure for `component_id`, tripping the circuit breaker
    /// open once `failure_count` reaches the configured threshold.
    #[instrument(skip(self))]
    pub fn record_failure(&self, component_id: &str, error: String) {
        let start = Instant::now();
        let mut entry = self
            .components
            .entry(component_id.to_string())
            .or_insert_with(|| ComponentHealth::new(self.default_threshold.as_u32()));

        entry.healthy = false;
        entry.failure_count += 1;
        entry.last_error = Some(error);
        entry.last_check_time = Instant::now();

        if entry.state == CircuitState::HalfOpen {
            warn!(component_id, "recovery probe failed, circuit breaker re-opened");
            entry.state = CircuitState::Open;
        } else if entry.failure_count >= entry.threshold {
            if entry.state != CircuitState::Open {
                warn!(component_id, failures = entry.failure_count, "circuit breaker opened");
            }
            entry.state = CircuitState::Open;
        }

        Self::warn_if_slow(start);
    }

    /// Moves an `Open` component to `HalfOpen`, allowing a single recovery
    /// probe through.
    ///
    /// # Errors
    /// Returns [`HealthError::NotOpen`] if the component isn't currently
    /// `Open`.
    pub fn attempt_recovery(&self, component_id: &str) -> Result<(), HealthError> {
        let mut entry = self
            .components
            .get_mut(component_id)
            .ok_or_else(|| HealthError::NotOpen {
                component_id: component_id.to_string(),
            })?;

        if entry.state != CircuitState::Open {
            return Err(HealthError::NotOpen {
                component_id: component_id.to_string(),
            });
        }

        entry.state = CircuitState::HalfOpen;
        Ok(())
    }

    /// Changes the failure threshold for a component's circuit breaker. The
    /// component is created with default health if it doesn't exist yet.
    ///
    /// # Errors
    /// Returns [`HealthError::InvalidThreshold`] if `threshold` is zero.
    pub fn set_circuit_breaker_threshold(
        &self,
        component_id: &str,
        threshold: CircuitBreakerThreshold,
    ) -> Result<(), HealthError> {
        if threshold.as_u32() == 0 {
            return Err(HealthError::InvalidThreshold);
        }
        let mut entry = self
            .components
            .entry(component_id.to_string())
            .or_insert_with(|| ComponentHealth::new(self.default_threshold.as_u32()));
        entry.threshold = threshold.as_u32();
        Ok(())
    }

    /// Stops tracking `component_id` entirely.
    pub fn remove_component(&self, component_id: &str) {
        self.components.remove(component_id);
    }

    /// The current circuit state of `component_id`, `None` if untracked.
    #[must_use]
    pub fn circuit_state(&self, component_id: &str) -> Option<CircuitState> {
        self.components.get(component_id).map(|e| e.state)
    }

    /// A snapshot of `component_id`'s health, `None` if untracked.
    #[must_use]
    pub fn get_component_health(&self, component_id: &str) -> Option<ComponentHealthReport> {
        self.components.get(component_id).map(|e| ComponentHealthReport {
            healthy: e.healthy,
            failure_count: e.failure_count,
            last_message: e.last_message.clone(),
            last_error: e.last_error.clone(),
            state: e.state,
        })
    }

    /// A report of every tracked component's health, keyed by component id.
    #[must_use]
    pub fn get_health_report(&self) -> HashMap<String, ComponentHealthReport> {
        self.components
            .iter()
            .map(|entry| {
                let health = entry.value();
                (
                    entry.key().clone(),
                    ComponentHealthReport {
                        healthy: health.healthy,
                        failure_count: health.failure_count,
                        last_message: health.last_message.clone(),
                        last_error: health.last_error.clone(),
                        state: health.state,
                    },
                )
            })
            .collect()
    }

    /// Aggregate counters across all tracked components.
    #[must_use]
    pub fn get_stats(&self) -> HealthStats {
        let component_count = self.components.len();
        let open_count = self
            .components
            .iter()
            .filter(|e| e.state == CircuitState::Open)
            .count();
        HealthStats {
            component_count,
            open_count,
        }
    }

    fn warn_if_slow(start: Instant) {
        let elapsed = start.elapsed().as_millis();
        if elapsed > HEALTH_CHECK_WARN_THRESHOLD_MS {
            warn!(elapsed_ms = elapsed, "health check exceeded budget");
        }
    }
}

/// Shared handle to a [`HealthMonitor`].
pub type SharedHealthMonitor = Arc<HealthMonitor>;

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(CircuitBreakerThreshold::try_new(3).unwrap())
    }

    #[test]
    fn new_component_starts_closed() {
        let monitor = monitor();
        monitor.record_health("router", None);
        assert_eq!(monitor.circuit_state("router"), Some(CircuitState::Closed));
    }

    #[test]
    fn circuit_opens_at_threshold() {
        let monitor = monitor();
        for _ in 0..3 {
            monitor.record_failure("router", "boom".to_string());
        }
        assert_eq!(monitor.circuit_state("router"), Some(CircuitState::Open));
    }

    #[test]
    fn circuit_stays_closed_below_threshold() {
        let monitor = monitor();
        monitor.record_failure("router", "boom".to_string());
        monitor.record_failure("router", "boom".to_string());
        assert_eq!(monitor.circuit_state("router"), Some(CircuitState::Closed));
    }

    #[test]
    fn recovery_moves_open_to_half_open() {
        let monitor = monitor();
        for _ in 0..3 {
            monitor.record_failure("router", "boom".to_string());
        }
        monitor.attempt_recovery("router").unwrap();
        assert_eq!(monitor.circuit_state("router"), Some(CircuitState::HalfOpen));
    }

    #[test]
    fn recovery_fails_when_not_open() {
        let monitor = monitor();
        monitor.record_health("router", None);
        let result = monitor.attempt_recovery("router");
        assert!(matches!(result, Err(HealthError::NotOpen { .. })));
    }

    #[test]
    fn success_after_half_open_closes_the_circuit() {
        let monitor = monitor();
        for _ in 0..3 {
            monitor.record_failure("router", "boom".to_string());
        }
        monitor.attempt_recovery("router").unwrap();
        monitor.record_health("router", Some("recovered".to_string()));
        assert_eq!(monitor.circuit_state("router"), Some(CircuitState::Closed));
    }

    #[test]
    fn threshold_can_be_changed_per_component() {
        let monitor = monitor();
        monitor
            .set_circuit_breaker_threshold("router", CircuitBreakerThreshold::try_new(1).unwrap())
            .unwrap();
        monitor.record_failure("router", "boom".to_string());
        assert_eq!(monitor.circuit_state("router"), Some(CircuitState::Open));
    }

    #[test]
    fn any_failure_while_half_open_reopens_the_circuit_even_below_a_raised_threshold() {
        let monitor = monitor();
        for _ in 0..3 {
            monitor.record_failure("router", "boom".to_string());
        }
        monitor.attempt_recovery("router").unwrap();
        assert_eq!(monitor.circuit_state("router"), Some(CircuitState::HalfOpen));

        monitor
            .set_circuit_breaker_threshold("router", CircuitBreakerThreshold::try_new(100).unwrap())
            .unwrap();

        monitor.record_failure("router", "probe failed".to_string());
        assert_eq!(monitor.circuit_state("router"), Some(CircuitState::Open));
    }

    #[test]
    fn remove_component_drops_its_health() {
        let monitor = monitor();
        monitor.record_health("router", None);
        monitor.remove_component("router");
        assert!(monitor.get_component_health("router").is_none());
    }
}
