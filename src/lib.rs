//! Foreman - goal decomposition and parallel task orchestration.
//!
//! The core of a multi-agent task execution system:
//! - Durable goal/task state with a strict status state machine
//! - Dependency-aware scheduling under a bounded concurrency limit
//! - Retry with exponential backoff, escalation, circuit breaking
//! - A composable content-safety pipeline screening prompts and results
//!
//! Embedders supply the two external contracts - a [`domain::ports::WorkerAgent`]
//! that executes task prompts and a [`domain::ports::Decomposer`] that splits a
//! goal into subtasks - and drive goals through
//! [`services::PlannerOrchestrator`].

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{CoreError, CoreResult};
