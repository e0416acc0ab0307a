//! Assignment domain model.
//!
//! An assignment binds a task to a worker-agent instance for exactly one
//! attempt. Retries create a fresh assignment; assignments are discarded
//! once the task reaches a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an assignment over the lifetime of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    /// Agent selected, worker not yet invoked
    Assigned,
    /// Worker invocation in flight
    Working,
    /// Attempt produced a result
    Completed,
    /// Attempt ended in an error
    Failed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Working => "working",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Per-attempt binding of a task to a worker-agent instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Unique per attempt
    pub agent_id: Uuid,
    /// Agent type tag chosen by the router (e.g. `builder`)
    pub agent_type: String,
    /// Task being attempted
    pub task_id: Uuid,
    /// When the assignment was created
    pub assigned_at: DateTime<Utc>,
    /// Attempt status
    pub status: AssignmentStatus,
}

impl Assignment {
    pub fn new(task_id: Uuid, agent_type: impl Into<String>) -> Self {
        Self {
            agent_id: Uuid::new_v4(),
            agent_type: agent_type.into(),
            task_id,
            assigned_at: Utc::now(),
            status: AssignmentStatus::Assigned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_ids_unique_per_attempt() {
        let task_id = Uuid::new_v4();
        let first = Assignment::new(task_id, "builder");
        let second = Assignment::new(task_id, "builder");
        assert_ne!(first.agent_id, second.agent_id);
        assert_eq!(first.status, AssignmentStatus::Assigned);
    }
}
