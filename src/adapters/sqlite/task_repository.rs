//! SQLite implementation of the TaskRepository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{Task, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskRepository};

use super::goal_repository::{parse_timestamp, parse_uuid};

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> CoreResult<()> {
        let dependencies_json = serde_json::to_string(&task.dependencies)?;
        let metadata_json = serde_json::to_string(&task.metadata)?;
        let result_json = task.result.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r"INSERT INTO tasks (id, goal_id, description, status, assigned_agent, priority,
              dependencies, retry_count, max_retries, result, error, metadata,
              created_at, updated_at, started_at, completed_at, version)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.id.to_string())
        .bind(task.goal_id.to_string())
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(&task.assigned_agent)
        .bind(task.priority)
        .bind(&dependencies_json)
        .bind(i64::from(task.retry_count))
        .bind(i64::from(task.max_retries))
        .bind(&result_json)
        .bind(&task.error)
        .bind(&metadata_json)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(i64::try_from(task.version).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Task::try_from).transpose()
    }

    async fn update(&self, task: &Task) -> CoreResult<()> {
        let dependencies_json = serde_json::to_string(&task.dependencies)?;
        let metadata_json = serde_json::to_string(&task.metadata)?;
        let result_json = task.result.as_ref().map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            r"UPDATE tasks SET description = ?, status = ?, assigned_agent = ?, priority = ?,
              dependencies = ?, retry_count = ?, max_retries = ?, result = ?, error = ?,
              metadata = ?, updated_at = ?, started_at = ?, completed_at = ?, version = ?
              WHERE id = ?",
        )
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(&task.assigned_agent)
        .bind(task.priority)
        .bind(&dependencies_json)
        .bind(i64::from(task.retry_count))
        .bind(i64::from(task.max_retries))
        .bind(&result_json)
        .bind(&task.error)
        .bind(&metadata_json)
        .bind(task.updated_at.to_rfc3339())
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(i64::try_from(task.version).unwrap_or(i64::MAX))
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::TaskNotFound(task.id));
        }
        Ok(())
    }

    async fn list(&self, filter: TaskFilter) -> CoreResult<Vec<Task>> {
        // Dynamic filters over a small fixed set of columns.
        let mut sql = String::from("SELECT * FROM tasks WHERE 1=1");
        if filter.goal_id.is_some() {
            sql.push_str(" AND goal_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.agent_type.is_some() {
            sql.push_str(" AND assigned_agent = ?");
        }
        sql.push_str(" ORDER BY priority DESC, created_at ASC");

        let mut query = sqlx::query_as::<_, TaskRow>(&sql);
        if let Some(goal_id) = filter.goal_id {
            query = query.bind(goal_id.to_string());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(agent_type) = filter.agent_type {
            query = query.bind(agent_type);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn list_by_goal(&self, goal_id: Uuid) -> CoreResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE goal_id = ? ORDER BY priority DESC, created_at ASC",
        )
        .bind(goal_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn list_stalled(&self, older_than: DateTime<Utc>) -> CoreResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE status = 'in_progress' AND started_at < ? ORDER BY started_at",
        )
        .bind(older_than.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn count_by_status(&self, goal_id: Uuid) -> CoreResult<HashMap<TaskStatus, u64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM tasks WHERE goal_id = ? GROUP BY status",
        )
        .bind(goal_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            let status = TaskStatus::from_str(&status)
                .ok_or_else(|| CoreError::Storage(format!("unknown task status: {status}")))?;
            counts.insert(status, u64::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    goal_id: String,
    description: String,
    status: String,
    assigned_agent: Option<String>,
    priority: i64,
    dependencies: String,
    retry_count: i64,
    max_retries: i64,
    result: Option<String>,
    error: Option<String>,
    metadata: String,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    version: i64,
}

impl TryFrom<TaskRow> for Task {
    type Error = CoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let dependency_strings: Vec<String> = serde_json::from_str(&row.dependencies)?;
        let dependencies = dependency_strings
            .iter()
            .map(|s| parse_uuid(s))
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Task {
            id: parse_uuid(&row.id)?,
            goal_id: parse_uuid(&row.goal_id)?,
            description: row.description,
            status: TaskStatus::from_str(&row.status)
                .ok_or_else(|| CoreError::Storage(format!("unknown task status: {}", row.status)))?,
            assigned_agent: row.assigned_agent,
            priority: row.priority,
            dependencies,
            retry_count: u32::try_from(row.retry_count).unwrap_or(0),
            max_retries: u32::try_from(row.max_retries).unwrap_or(0),
            result: row.result.as_deref().map(serde_json::from_str).transpose()?,
            error: row.error,
            metadata: serde_json::from_str(&row.metadata)?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            started_at: row.started_at.as_deref().map(parse_timestamp).transpose()?,
            completed_at: row.completed_at.as_deref().map(parse_timestamp).transpose()?,
            version: u64::try_from(row.version).unwrap_or(0),
        })
    }
}
