//! Event repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::EventRecord;

/// Repository interface for append-only event persistence.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Append an event, returning it with its assigned sequence number.
    async fn append(&self, event: &EventRecord) -> CoreResult<EventRecord>;

    /// All events of a goal in append order.
    async fn list_by_goal(&self, goal_id: Uuid) -> CoreResult<Vec<EventRecord>>;

    /// The highest sequence number currently stored, if any.
    async fn last_sequence(&self) -> CoreResult<Option<u64>>;
}
