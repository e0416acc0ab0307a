//! Event record model.
//!
//! The event log is the append-only record of everything that happened
//! to a goal. Replay at a later time is always a strict superset of an
//! earlier replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    GoalCreated,
    TaskCreated,
    TaskAssigned,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskRetry,
    TaskKilled,
    TaskEscalated,
    SafetyFinding,
    GoalCompleted,
    GoalFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoalCreated => "goal_created",
            Self::TaskCreated => "task_created",
            Self::TaskAssigned => "task_assigned",
            Self::TaskStarted => "task_started",
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::TaskRetry => "task_retry",
            Self::TaskKilled => "task_killed",
            Self::TaskEscalated => "task_escalated",
            Self::SafetyFinding => "safety_finding",
            Self::GoalCompleted => "goal_completed",
            Self::GoalFailed => "goal_failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "goal_created" => Some(Self::GoalCreated),
            "task_created" => Some(Self::TaskCreated),
            "task_assigned" => Some(Self::TaskAssigned),
            "task_started" => Some(Self::TaskStarted),
            "task_completed" => Some(Self::TaskCompleted),
            "task_failed" => Some(Self::TaskFailed),
            "task_retry" => Some(Self::TaskRetry),
            "task_killed" => Some(Self::TaskKilled),
            "task_escalated" => Some(Self::TaskEscalated),
            "safety_finding" => Some(Self::SafetyFinding),
            "goal_completed" => Some(Self::GoalCompleted),
            "goal_failed" => Some(Self::GoalFailed),
            _ => None,
        }
    }
}

/// A single append-only event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic per-store sequence number; assigned on append
    pub seq: u64,
    /// Wall-clock timestamp (RFC3339 in storage)
    pub timestamp: DateTime<Utc>,
    /// Monotonic nanoseconds since process start; preserves
    /// happens-before order between events of one goal
    pub monotonic_ns: u64,
    /// Goal this event belongs to
    pub goal_id: Uuid,
    /// Task this event concerns, if any
    pub task_id: Option<Uuid>,
    /// Event kind
    pub kind: EventKind,
    /// Structured payload
    pub payload: serde_json::Value,
}

impl EventRecord {
    /// Build an unsequenced event; the event log assigns `seq` and
    /// `monotonic_ns` on append.
    pub fn new(goal_id: Uuid, kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            seq: 0,
            timestamp: Utc::now(),
            monotonic_ns: 0,
            goal_id,
            task_id: None,
            kind,
            payload,
        }
    }

    pub fn with_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            EventKind::GoalCreated,
            EventKind::TaskCreated,
            EventKind::TaskAssigned,
            EventKind::TaskStarted,
            EventKind::TaskCompleted,
            EventKind::TaskFailed,
            EventKind::TaskRetry,
            EventKind::TaskKilled,
            EventKind::TaskEscalated,
            EventKind::SafetyFinding,
            EventKind::GoalCompleted,
            EventKind::GoalFailed,
        ] {
            assert_eq!(EventKind::from_str(kind.as_str()), Some(kind));
        }
        assert!(EventKind::from_str("task_complete").is_none());
    }

    #[test]
    fn test_event_builder() {
        let goal_id = Uuid::new_v4();
        let task_id = Uuid::new_v4();
        let event = EventRecord::new(goal_id, EventKind::TaskStarted, serde_json::json!({}))
            .with_task(task_id);
        assert_eq!(event.goal_id, goal_id);
        assert_eq!(event.task_id, Some(task_id));
        assert_eq!(event.seq, 0);
    }
}
