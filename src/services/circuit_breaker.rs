//! Circuit breaker for repeated task-kind failures.
//!
//! Detects repeated failures per task kind and halts dispatch for that
//! kind until the reset period elapses, preventing cascade failures.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::models::PolicyEntry;

/// State of one circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are blocked until the reset period elapses.
    Open,
    /// Probing whether the kind has recovered.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    failure_threshold: u32,
    reset_period: Duration,
}

impl Circuit {
    fn new(entry: &PolicyEntry) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            failure_threshold: entry.failure_threshold,
            reset_period: Duration::seconds(i64::try_from(entry.reset_secs).unwrap_or(i64::MAX)),
        }
    }
}

/// Per-kind circuit breakers, fed by attempt outcomes.
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    circuits: RwLock<HashMap<String, Circuit>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether dispatch of this kind is currently allowed. An open
    /// circuit whose reset period has elapsed moves to half-open and
    /// lets one probe through.
    pub async fn allow(&self, kind: &str, entry: &PolicyEntry) -> bool {
        let mut circuits = self.circuits.write().await;
        let circuit = circuits
            .entry(kind.to_string())
            .or_insert_with(|| Circuit::new(entry));

        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = circuit
                    .opened_at
                    .map(|at| Utc::now() - at)
                    .unwrap_or_else(Duration::zero);
                if elapsed >= circuit.reset_period {
                    tracing::info!(kind = kind, "Circuit half-open, probing");
                    circuit.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful attempt; closes the circuit.
    pub async fn record_success(&self, kind: &str) {
        let mut circuits = self.circuits.write().await;
        if let Some(circuit) = circuits.get_mut(kind) {
            circuit.consecutive_failures = 0;
            circuit.opened_at = None;
            if circuit.state != CircuitState::Closed {
                tracing::info!(kind = kind, "Circuit closed");
                circuit.state = CircuitState::Closed;
            }
        }
    }

    /// Record a failed attempt; opens the circuit at the threshold, and
    /// immediately re-opens a half-open circuit.
    pub async fn record_failure(&self, kind: &str, entry: &PolicyEntry) {
        let mut circuits = self.circuits.write().await;
        let circuit = circuits
            .entry(kind.to_string())
            .or_insert_with(|| Circuit::new(entry));

        circuit.consecutive_failures += 1;
        let tripped = circuit.state == CircuitState::HalfOpen
            || circuit.consecutive_failures >= circuit.failure_threshold;
        if tripped && circuit.state != CircuitState::Open {
            tracing::warn!(
                kind = kind,
                failures = circuit.consecutive_failures,
                "Circuit opened"
            );
            circuit.state = CircuitState::Open;
            circuit.opened_at = Some(Utc::now());
        }
    }

    /// Current state of a kind's circuit.
    pub async fn state(&self, kind: &str) -> CircuitState {
        self.circuits
            .read()
            .await
            .get(kind)
            .map_or(CircuitState::Closed, |c| c.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(threshold: u32, reset_secs: u64) -> PolicyEntry {
        PolicyEntry {
            failure_threshold: threshold,
            reset_secs,
            ..PolicyEntry::default()
        }
    }

    #[tokio::test]
    async fn test_opens_at_threshold() {
        let breaker = CircuitBreaker::new();
        let entry = entry(3, 300);

        for _ in 0..2 {
            breaker.record_failure("build", &entry).await;
            assert!(breaker.allow("build", &entry).await);
        }
        breaker.record_failure("build", &entry).await;
        assert_eq!(breaker.state("build").await, CircuitState::Open);
        assert!(!breaker.allow("build", &entry).await);
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let breaker = CircuitBreaker::new();
        let entry = entry(2, 300);

        breaker.record_failure("build", &entry).await;
        breaker.record_success("build").await;
        breaker.record_failure("build", &entry).await;
        assert_eq!(breaker.state("build").await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_after_reset_period() {
        let breaker = CircuitBreaker::new();
        // Zero reset period: the next allow() probes immediately.
        let entry = entry(1, 0);

        breaker.record_failure("build", &entry).await;
        assert_eq!(breaker.state("build").await, CircuitState::Open);

        assert!(breaker.allow("build", &entry).await);
        assert_eq!(breaker.state("build").await, CircuitState::HalfOpen);

        // A failure while half-open re-opens immediately.
        breaker.record_failure("build", &entry).await;
        assert_eq!(breaker.state("build").await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let breaker = CircuitBreaker::new();
        let entry = entry(1, 300);
        breaker.record_failure("build", &entry).await;
        assert!(!breaker.allow("build", &entry).await);
        assert!(breaker.allow("research", &entry).await);
    }
}
