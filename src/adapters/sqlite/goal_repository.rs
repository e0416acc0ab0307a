//! SQLite implementation of the GoalRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{Goal, GoalStatus};
use crate::domain::ports::GoalRepository;

#[derive(Clone)]
pub struct SqliteGoalRepository {
    pool: SqlitePool,
}

impl SqliteGoalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GoalRepository for SqliteGoalRepository {
    async fn create(&self, goal: &Goal) -> CoreResult<()> {
        sqlx::query(
            r"INSERT INTO goals (id, description, status, created_at, updated_at, completed_at, version)
              VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(goal.id.to_string())
        .bind(&goal.description)
        .bind(goal.status.as_str())
        .bind(goal.created_at.to_rfc3339())
        .bind(goal.updated_at.to_rfc3339())
        .bind(goal.completed_at.map(|t| t.to_rfc3339()))
        .bind(i64::try_from(goal.version).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Goal>> {
        let row: Option<GoalRow> = sqlx::query_as("SELECT * FROM goals WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Goal::try_from).transpose()
    }

    async fn update(&self, goal: &Goal) -> CoreResult<()> {
        let result = sqlx::query(
            r"UPDATE goals SET description = ?, status = ?, updated_at = ?, completed_at = ?, version = ?
              WHERE id = ?",
        )
        .bind(&goal.description)
        .bind(goal.status.as_str())
        .bind(goal.updated_at.to_rfc3339())
        .bind(goal.completed_at.map(|t| t.to_rfc3339()))
        .bind(i64::try_from(goal.version).unwrap_or(i64::MAX))
        .bind(goal.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::GoalNotFound(goal.id));
        }
        Ok(())
    }

    async fn list_by_status(&self, status: GoalStatus) -> CoreResult<Vec<Goal>> {
        let rows: Vec<GoalRow> =
            sqlx::query_as("SELECT * FROM goals WHERE status = ? ORDER BY created_at")
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Goal::try_from).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GoalRow {
    id: String,
    description: String,
    status: String,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
    version: i64,
}

impl TryFrom<GoalRow> for Goal {
    type Error = CoreError;

    fn try_from(row: GoalRow) -> Result<Self, Self::Error> {
        Ok(Goal {
            id: parse_uuid(&row.id)?,
            description: row.description,
            status: GoalStatus::from_str(&row.status)
                .ok_or_else(|| CoreError::Storage(format!("unknown goal status: {}", row.status)))?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            completed_at: row.completed_at.as_deref().map(parse_timestamp).transpose()?,
            version: u64::try_from(row.version).unwrap_or(0),
        })
    }
}

pub(super) fn parse_uuid(s: &str) -> CoreResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| CoreError::Storage(format!("invalid uuid {s}: {e}")))
}

pub(super) fn parse_timestamp(s: &str) -> CoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CoreError::Storage(format!("invalid timestamp {s}: {e}")))
}
