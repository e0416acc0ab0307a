//! Decomposer port - interface for goal decomposition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::CoreResult;

/// One subtask produced by decomposition. Dependencies are integer
/// indexes into the returned list; the orchestrator translates them into
/// task ids when it materializes the plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubtaskSpec {
    /// Description/prompt for the subtask
    pub description: String,
    /// Indexes of subtasks in the same list that must complete first
    #[serde(default)]
    pub depends_on: Vec<usize>,
    /// Agent type to assign, bypassing the router
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    /// Priority (0-10); defaults to 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// Policy-table category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Maximum retries; defaults to the scheduler's configured value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl SubtaskSpec {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn depends_on(mut self, indexes: &[usize]) -> Self {
        self.depends_on = indexes.to_vec();
        self
    }

    pub fn with_agent(mut self, agent_type: impl Into<String>) -> Self {
        self.assigned_agent = Some(agent_type.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// External component that splits a goal description into subtasks.
#[async_trait]
pub trait Decomposer: Send + Sync {
    /// Produce the subtask plan for a goal.
    async fn decompose(
        &self,
        goal_description: &str,
        goal_id: Uuid,
    ) -> CoreResult<Vec<SubtaskSpec>>;
}
