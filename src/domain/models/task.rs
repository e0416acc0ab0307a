//! Task domain model.
//!
//! Tasks are discrete units of work that worker agents execute.
//! They form a DAG with dependencies inside a single goal.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum task priority. Priorities are integers in `0..=MAX_PRIORITY`,
/// higher being more urgent.
pub const MAX_PRIORITY: i64 = 10;

/// Metadata key holding the policy-table category of a task.
pub const KIND_KEY: &str = "kind";

/// Status of a task in the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting for dependencies and a scheduling slot
    Queued,
    /// Task is currently being executed by a worker agent
    InProgress,
    /// Task completed successfully
    Completed,
    /// Task failed during execution
    Failed,
    /// A dependency failed terminally; this task can never start
    Blocked,
    /// Task was cancelled by an external kill command
    Killed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Killed => "killed",
        }
    }

    /// Parse the canonical status vocabulary. The legacy `complete`
    /// spelling is rejected at this boundary.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "blocked" => Some(Self::Blocked),
            "killed" => Some(Self::Killed),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Blocked | Self::Killed
        )
    }

    /// Valid transitions from this status.
    ///
    /// `Failed -> Queued` is the retry edge; `Blocked -> Queued` and
    /// `Killed -> Queued` are the operator restart edges.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Queued => &[Self::InProgress, Self::Blocked],
            Self::InProgress => &[Self::Completed, Self::Failed, Self::Blocked, Self::Killed],
            Self::Failed => &[Self::Queued],
            Self::Blocked => &[Self::Queued],
            Self::Killed => &[Self::Queued],
            Self::Completed => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// A discrete unit of work that can be executed by a worker agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Goal this task belongs to
    pub goal_id: Uuid,
    /// Detailed description/prompt; also consumed by the router
    pub description: String,
    /// Current status
    pub status: TaskStatus,
    /// Assigned agent type, set at creation or by the router
    pub assigned_agent: Option<String>,
    /// Priority (0-10, higher is more urgent)
    pub priority: i64,
    /// Task IDs this depends on (same goal only)
    pub dependencies: Vec<Uuid>,
    /// Retry count
    pub retry_count: u32,
    /// Maximum retries
    pub max_retries: u32,
    /// Opaque result payload, set only on completion
    pub result: Option<serde_json::Value>,
    /// Error message, set only on failed or killed
    pub error: Option<String>,
    /// Routing hints, escalation flags, policy category
    pub metadata: HashMap<String, serde_json::Value>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When last updated
    pub updated_at: DateTime<Utc>,
    /// When execution started
    pub started_at: Option<DateTime<Utc>>,
    /// When execution reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Version for optimistic locking
    pub version: u64,
}

impl Task {
    /// Create a new queued task for a goal.
    pub fn new(goal_id: Uuid, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            goal_id,
            description: description.into(),
            status: TaskStatus::default(),
            assigned_agent: None,
            priority: 0,
            dependencies: Vec::new(),
            retry_count: 0,
            max_retries: 3,
            result: None,
            error: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            version: 1,
        }
    }

    /// Add a dependency. Self-dependencies and duplicates are ignored.
    pub fn with_dependency(mut self, task_id: Uuid) -> Self {
        if !self.dependencies.contains(&task_id) && task_id != self.id {
            self.dependencies.push(task_id);
        }
        self
    }

    /// Set priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Set agent type.
    pub fn with_agent(mut self, agent_type: impl Into<String>) -> Self {
        self.assigned_agent = Some(agent_type.into());
        self
    }

    /// Set maximum retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the policy-table category for this task.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.metadata
            .insert(KIND_KEY.to_string(), serde_json::Value::String(kind.into()));
        self
    }

    /// The policy-table category for this task, defaulting to `default`.
    pub fn kind(&self) -> &str {
        self.metadata
            .get(KIND_KEY)
            .and_then(serde_json::Value::as_str)
            .unwrap_or("default")
    }

    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, updating timestamps.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }

        self.status = new_status;
        self.updated_at = Utc::now();
        self.version += 1;

        match new_status {
            TaskStatus::InProgress => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.completed_at = Some(Utc::now()),
            // Re-queue (retry/restart) clears the previous attempt's outcome
            TaskStatus::Queued => {
                self.completed_at = None;
                self.error = None;
            }
            _ => {}
        }

        Ok(())
    }

    /// Force a status transition, bypassing the state machine.
    ///
    /// Only for crash recovery, startup reconciliation, and test setup.
    /// A tracing warning marks every bypass site.
    pub fn force_status(&mut self, new_status: TaskStatus, reason: &str) {
        tracing::warn!(
            task_id = %self.id,
            from = %self.status.as_str(),
            to = %new_status.as_str(),
            reason = reason,
            "Forcing task status transition (bypassing state machine)"
        );

        self.status = new_status;
        self.updated_at = Utc::now();
        self.version += 1;

        match new_status {
            TaskStatus::InProgress => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
    }

    /// Check if task is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if task can be retried.
    pub fn can_retry(&self) -> bool {
        self.status == TaskStatus::Failed && self.retry_count < self.max_retries
    }

    /// Increment retry count and re-queue.
    pub fn retry(&mut self) -> Result<(), String> {
        if !self.can_retry() {
            return Err("Cannot retry: either not failed or max retries reached".to_string());
        }
        self.retry_count += 1;
        self.transition_to(TaskStatus::Queued)
    }

    /// Validate task shape at creation time.
    pub fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("Task description cannot be empty".to_string());
        }
        if self.dependencies.contains(&self.id) {
            return Err("Task cannot depend on itself".to_string());
        }
        if !(0..=MAX_PRIORITY).contains(&self.priority) {
            return Err(format!("Priority {} out of range 0-10", self.priority));
        }
        Ok(())
    }
}
