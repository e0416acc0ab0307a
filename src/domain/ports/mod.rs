//! Ports: trait seams between the core and its collaborators.

pub mod decomposer;
pub mod event_repository;
pub mod goal_repository;
pub mod task_repository;
pub mod worker;

pub use decomposer::{Decomposer, SubtaskSpec};
pub use event_repository::EventRepository;
pub use goal_repository::GoalRepository;
pub use task_repository::{TaskFilter, TaskRepository};
pub use worker::{CancelHandle, CancelSignal, WorkerAgent};
