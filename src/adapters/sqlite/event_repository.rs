//! SQLite implementation of the EventRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{EventKind, EventRecord};
use crate::domain::ports::EventRepository;

use super::goal_repository::{parse_timestamp, parse_uuid};

#[derive(Clone)]
pub struct SqliteEventRepository {
    pool: SqlitePool,
}

impl SqliteEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for SqliteEventRepository {
    async fn append(&self, event: &EventRecord) -> CoreResult<EventRecord> {
        let payload_json = serde_json::to_string(&event.payload)?;

        let result = sqlx::query(
            r"INSERT INTO events (timestamp, monotonic_ns, goal_id, task_id, kind, payload)
              VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(event.timestamp.to_rfc3339())
        .bind(i64::try_from(event.monotonic_ns).unwrap_or(i64::MAX))
        .bind(event.goal_id.to_string())
        .bind(event.task_id.map(|id| id.to_string()))
        .bind(event.kind.as_str())
        .bind(&payload_json)
        .execute(&self.pool)
        .await?;

        let mut appended = event.clone();
        appended.seq = u64::try_from(result.last_insert_rowid()).unwrap_or(0);
        Ok(appended)
    }

    async fn list_by_goal(&self, goal_id: Uuid) -> CoreResult<Vec<EventRecord>> {
        let rows: Vec<EventRow> =
            sqlx::query_as("SELECT * FROM events WHERE goal_id = ? ORDER BY seq ASC")
                .bind(goal_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(EventRecord::try_from).collect()
    }

    async fn last_sequence(&self) -> CoreResult<Option<u64>> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(seq) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0.map(|seq| u64::try_from(seq).unwrap_or(0)))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    seq: i64,
    timestamp: String,
    monotonic_ns: i64,
    goal_id: String,
    task_id: Option<String>,
    kind: String,
    payload: String,
}

impl TryFrom<EventRow> for EventRecord {
    type Error = CoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(EventRecord {
            seq: u64::try_from(row.seq).unwrap_or(0),
            timestamp: parse_timestamp(&row.timestamp)?,
            monotonic_ns: u64::try_from(row.monotonic_ns).unwrap_or(0),
            goal_id: parse_uuid(&row.goal_id)?,
            task_id: row.task_id.as_deref().map(parse_uuid).transpose()?,
            kind: EventKind::from_str(&row.kind)
                .ok_or_else(|| CoreError::Storage(format!("unknown event kind: {}", row.kind)))?,
            payload: serde_json::from_str(&row.payload)?,
        })
    }
}
