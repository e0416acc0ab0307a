//! Domain errors for the foreman orchestration core.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur anywhere in the orchestration core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Goal not found: {0}")]
    GoalNotFound(Uuid),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidState { from: String, to: String },

    /// A dependency edge would close a cycle. Carries the offending path.
    #[error("Dependency cycle detected: {}", format_cycle(.0))]
    CyclicDependency(Vec<Uuid>),

    /// A dependency references a task outside the goal, or an unknown task.
    #[error("Invalid dependency: {0}")]
    InvalidDependency(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(Uuid),

    /// Priority value is outside the valid range (0-10).
    #[error("Invalid priority: {0}, must be 0-10")]
    InvalidPriority(i64),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Task cannot be retried (max retries reached)")]
    RetriesExhausted,

    #[error("Attempt timed out after {0} seconds")]
    Timeout(u64),

    /// The safety pipeline blocked a prompt or output. Carries the tags
    /// of the findings that triggered the block.
    #[error("Safety block: {}", .tags.join(","))]
    SafetyBlock { tags: Vec<String> },

    /// Opaque error surfaced by an external worker agent.
    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Invariant violation. Never recovered; the scheduling loop for the
    /// affected goal terminates.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_cycle(path: &[Uuid]) -> String {
    path.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl CoreError {
    /// Returns true if this error is transient and a retry could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Worker(_) | Self::Timeout(_) | Self::Storage(_))
    }

    /// Returns true if this error represents a permanent failure.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let id = Uuid::new_v4();
        assert_eq!(
            CoreError::TaskNotFound(id).to_string(),
            format!("Task not found: {id}")
        );
    }

    #[test]
    fn test_cycle_display_includes_path() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let msg = CoreError::CyclicDependency(vec![a, b]).to_string();
        assert!(msg.contains(&a.to_string()));
        assert!(msg.contains(&b.to_string()));
        assert!(msg.contains(" -> "));
    }

    #[test]
    fn test_safety_block_display_joins_tags() {
        let err = CoreError::SafetyBlock {
            tags: vec!["prompt_injection".into(), "jailbreak".into()],
        };
        assert_eq!(err.to_string(), "Safety block: prompt_injection,jailbreak");
    }

    #[test]
    fn test_transience_classification() {
        assert!(CoreError::Worker("boom".into()).is_transient());
        assert!(CoreError::Timeout(30).is_transient());
        assert!(CoreError::RetriesExhausted.is_permanent());
        assert!(CoreError::SafetyBlock { tags: vec![] }.is_permanent());
        assert!(CoreError::InvalidPriority(42).is_permanent());
    }
}
