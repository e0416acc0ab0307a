//! Per-task-kind execution policies.
//!
//! Wraps the configured policy table with the derived quantities the
//! coordinator needs: attempt deadlines and backoff delays. Backoff
//! doubles per attempt when the kind's exponential flag is set, capped
//! at `MAX_BACKOFF_MS`.

use std::time::Duration;

use crate::domain::models::{PolicyEntry, PolicyTable};

/// Upper bound on a single retry delay.
pub const MAX_BACKOFF_MS: u64 = 300_000;

/// Policy lookups for the coordinator and orchestrator.
#[derive(Debug, Clone)]
pub struct PolicyService {
    table: PolicyTable,
}

impl Default for PolicyService {
    fn default() -> Self {
        Self::new(PolicyTable::default())
    }
}

impl PolicyService {
    pub fn new(table: PolicyTable) -> Self {
        Self { table }
    }

    /// Raw policy entry for a task kind.
    pub fn entry(&self, kind: &str) -> PolicyEntry {
        self.table.for_kind(kind)
    }

    /// Per-attempt deadline for a task kind.
    pub fn timeout(&self, kind: &str) -> Duration {
        Duration::from_secs(self.entry(kind).timeout_secs)
    }

    /// Delay before retry attempt `attempt` (1-based) of a task kind.
    pub fn backoff_delay(&self, kind: &str, attempt: u32) -> Duration {
        let entry = self.entry(kind);
        let base = entry.retry_delay_ms;
        let delay_ms = if entry.exponential_backoff {
            let shift = attempt.saturating_sub(1).min(16);
            base.saturating_mul(1u64 << shift)
        } else {
            base
        };
        Duration::from_millis(delay_ms.min(MAX_BACKOFF_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = PolicyService::default();
        // default entry: 1000ms base, exponential
        assert_eq!(policy.backoff_delay("default", 1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_delay("default", 2), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_delay("default", 3), Duration::from_millis(4_000));
        // Very late attempts hit the cap instead of overflowing
        assert_eq!(
            policy.backoff_delay("default", 40),
            Duration::from_millis(MAX_BACKOFF_MS)
        );
    }

    #[test]
    fn test_flat_backoff_when_not_exponential() {
        let mut table = PolicyTable::default();
        table.entries.insert(
            "flat".to_string(),
            crate::domain::models::PolicyEntry {
                retry_delay_ms: 500,
                exponential_backoff: false,
                ..Default::default()
            },
        );
        let policy = PolicyService::new(table);
        assert_eq!(policy.backoff_delay("flat", 1), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay("flat", 5), Duration::from_millis(500));
    }

    #[test]
    fn test_unknown_kind_uses_default_entry() {
        let policy = PolicyService::default();
        assert_eq!(policy.timeout("nonexistent"), Duration::from_secs(300));
    }
}
