//! Goal repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::{Goal, GoalStatus};

/// Repository interface for Goal persistence.
#[async_trait]
pub trait GoalRepository: Send + Sync {
    /// Create a new goal.
    async fn create(&self, goal: &Goal) -> CoreResult<()>;

    /// Get a goal by ID.
    async fn get(&self, id: Uuid) -> CoreResult<Option<Goal>>;

    /// Update an existing goal.
    async fn update(&self, goal: &Goal) -> CoreResult<()>;

    /// List goals by status.
    async fn list_by_status(&self, status: GoalStatus) -> CoreResult<Vec<Goal>>;
}
