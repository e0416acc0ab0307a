//! Task repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::{Task, TaskStatus};

/// Filter criteria for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub goal_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub agent_type: Option<String>,
}

/// Repository interface for Task persistence.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Create a new task.
    async fn create(&self, task: &Task) -> CoreResult<()>;

    /// Get a task by ID.
    async fn get(&self, id: Uuid) -> CoreResult<Option<Task>>;

    /// Update an existing task.
    async fn update(&self, task: &Task) -> CoreResult<()>;

    /// List tasks with optional filters.
    async fn list(&self, filter: TaskFilter) -> CoreResult<Vec<Task>>;

    /// Get all tasks of a goal.
    async fn list_by_goal(&self, goal_id: Uuid) -> CoreResult<Vec<Task>>;

    /// Tasks in progress since before the given instant.
    async fn list_stalled(&self, older_than: DateTime<Utc>) -> CoreResult<Vec<Task>>;

    /// Count tasks of a goal by status.
    async fn count_by_status(
        &self,
        goal_id: Uuid,
    ) -> CoreResult<std::collections::HashMap<TaskStatus, u64>>;
}
