//! Append-only per-goal event log.
//!
//! Appends preserve the happens-before order of their producing
//! operations: a monotonic nanosecond stamp is taken under the append
//! lock, so two events of one goal never carry reordered stamps.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::{EventKind, EventRecord};
use crate::domain::ports::EventRepository;

/// Event log service over an append-only repository.
pub struct EventLog<E>
where
    E: EventRepository,
{
    repo: Arc<E>,
    origin: Instant,
    append_lock: Mutex<()>,
}

impl<E> EventLog<E>
where
    E: EventRepository,
{
    pub fn new(repo: Arc<E>) -> Self {
        Self {
            repo,
            origin: Instant::now(),
            append_lock: Mutex::new(()),
        }
    }

    /// Append an event for a goal.
    pub async fn append(
        &self,
        goal_id: Uuid,
        task_id: Option<Uuid>,
        kind: EventKind,
        payload: serde_json::Value,
    ) -> CoreResult<EventRecord> {
        let _guard = self.append_lock.lock().await;
        let mut event = EventRecord::new(goal_id, kind, payload);
        event.task_id = task_id;
        event.monotonic_ns =
            u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        let appended = self.repo.append(&event).await?;
        tracing::debug!(
            goal_id = %goal_id,
            kind = %kind.as_str(),
            seq = appended.seq,
            "Event appended"
        );
        Ok(appended)
    }

    /// Replay a goal's events in append order.
    pub async fn replay(&self, goal_id: Uuid) -> CoreResult<Vec<EventRecord>> {
        self.repo.list_by_goal(goal_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_memory_pool, SqliteEventRepository};

    async fn setup() -> EventLog<SqliteEventRepository> {
        let pool = create_migrated_memory_pool().await.unwrap();
        EventLog::new(Arc::new(SqliteEventRepository::new(pool)))
    }

    #[tokio::test]
    async fn test_replay_preserves_append_order() {
        let log = setup().await;
        let goal_id = Uuid::new_v4();

        log.append(goal_id, None, EventKind::GoalCreated, serde_json::json!({}))
            .await
            .unwrap();
        let task_id = Uuid::new_v4();
        log.append(
            goal_id,
            Some(task_id),
            EventKind::TaskCreated,
            serde_json::json!({}),
        )
        .await
        .unwrap();
        log.append(
            goal_id,
            Some(task_id),
            EventKind::TaskStarted,
            serde_json::json!({}),
        )
        .await
        .unwrap();

        let events = log.replay(goal_id).await.unwrap();
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::GoalCreated,
                EventKind::TaskCreated,
                EventKind::TaskStarted
            ]
        );
        assert!(events.windows(2).all(|w| w[0].monotonic_ns <= w[1].monotonic_ns));
    }

    #[tokio::test]
    async fn test_earlier_replay_is_prefix_of_later() {
        let log = setup().await;
        let goal_id = Uuid::new_v4();

        log.append(goal_id, None, EventKind::GoalCreated, serde_json::json!({}))
            .await
            .unwrap();
        let early = log.replay(goal_id).await.unwrap();

        log.append(goal_id, None, EventKind::GoalCompleted, serde_json::json!({}))
            .await
            .unwrap();
        let late = log.replay(goal_id).await.unwrap();

        assert!(late.len() > early.len());
        assert_eq!(&late[..early.len()], &early[..]);
    }
}
