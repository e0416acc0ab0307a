//! Goal domain model.
//!
//! A goal is the top-level unit of work submitted by an embedder. The
//! orchestrator decomposes it into a DAG of tasks and drives the goal to
//! a terminal state once every task is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// Goal is created but scheduling has not started
    Pending,
    /// Goal is being decomposed or its tasks are executing
    InProgress,
    /// Every task completed successfully
    Completed,
    /// At least one task ended in a non-completed terminal state
    Failed,
    /// Goal was cancelled by an external command
    Cancelled,
}

impl Default for GoalStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the canonical status vocabulary. Legacy spellings such as
    /// `complete` are rejected at this boundary.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [GoalStatus] {
        match self {
            Self::Pending => &[Self::InProgress, Self::Cancelled],
            Self::InProgress => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// A top-level unit of work, decomposed into tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Unique identifier
    pub id: Uuid,
    /// Detailed description handed to the decomposer
    pub description: String,
    /// Current status
    pub status: GoalStatus,
    /// When this goal was created
    pub created_at: DateTime<Utc>,
    /// When this goal was last updated
    pub updated_at: DateTime<Utc>,
    /// When the goal reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Version for optimistic locking
    pub version: u64,
}

impl Goal {
    /// Create a new pending goal.
    pub fn new(description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            status: GoalStatus::default(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            version: 1,
        }
    }

    /// Check if this goal is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn can_transition_to(&self, new_status: GoalStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, maintaining the `completed_at`
    /// invariant: set exactly when the goal becomes terminal.
    pub fn transition_to(&mut self, new_status: GoalStatus) -> Result<(), String> {
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
        if new_status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Validate this goal.
    pub fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("Goal description cannot be empty".to_string());
        }
        Ok(())
    }
}
