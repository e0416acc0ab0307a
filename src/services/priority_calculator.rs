//! Dynamic task prioritization.
//!
//! Combines four signals into a score in `0.0..=1.0`: how many tasks a
//! task transitively unblocks, a description-complexity heuristic, the
//! assigned agent's availability, and task age. Weights are configurable
//! and must sum to 1.0.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{PriorityWeights, Task};
use crate::services::dependency_resolver::DependencyResolver;

/// Words that mark a task description as complex.
const COMPLEXITY_WORDS: &[&str] = &["complex", "difficult", "challenging", "intricate"];

/// Description length beyond which the complexity heuristic rises.
const LONG_DESCRIPTION_CHARS: usize = 200;

/// Age at which the age signal saturates.
const MAX_AGE_HOURS: f64 = 48.0;

/// One task's computed prioritization, with the component breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskPriorityScore {
    pub task_id: Uuid,
    pub score: f64,
    pub dependents_score: f64,
    pub complexity_score: f64,
    pub availability_score: f64,
    pub age_score: f64,
}

/// Service for computing dynamic task priorities.
#[derive(Debug, Clone)]
pub struct PriorityCalculator {
    weights: PriorityWeights,
    resolver: DependencyResolver,
}

impl Default for PriorityCalculator {
    fn default() -> Self {
        Self::new(PriorityWeights::default())
    }
}

impl PriorityCalculator {
    pub fn new(weights: PriorityWeights) -> Self {
        Self {
            weights,
            resolver: DependencyResolver::new(),
        }
    }

    /// Reject weight tables that do not sum to 1.0.
    pub fn validate(&self) -> CoreResult<()> {
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > 1e-9 {
            return Err(CoreError::Configuration(format!(
                "priority weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }

    /// Score one task against the rest of its goal.
    ///
    /// `availability` is the assigned agent's availability in
    /// `0.0..=1.0` (1.0 when the task has no assigned agent yet).
    pub fn score(&self, task: &Task, goal_tasks: &[Task], availability: f64) -> TaskPriorityScore {
        #[allow(clippy::cast_precision_loss)]
        let dependents_score = if goal_tasks.is_empty() {
            0.0
        } else {
            let dependent_count = self.resolver.dependents(task.id, goal_tasks).len();
            (dependent_count as f64 / goal_tasks.len() as f64).min(1.0)
        };

        let description = task.description.to_lowercase();
        let mut complexity: f64 = 0.5;
        if COMPLEXITY_WORDS.iter().any(|word| description.contains(word)) {
            complexity += 0.25;
        }
        if task.description.len() > LONG_DESCRIPTION_CHARS {
            complexity += 0.25;
        }
        let complexity_score = complexity.min(1.0);

        let availability_score = availability.clamp(0.0, 1.0);

        let age_hours = (Utc::now() - task.created_at).num_seconds() as f64 / 3600.0;
        let age_score = (age_hours / MAX_AGE_HOURS).clamp(0.0, 1.0);

        let score = self.weights.dependents * dependents_score
            + self.weights.complexity * complexity_score
            + self.weights.availability * availability_score
            + self.weights.age * age_score;

        TaskPriorityScore {
            task_id: task.id,
            score,
            dependents_score,
            complexity_score,
            availability_score,
            age_score,
        }
    }

    /// Score every task of a goal, highest first.
    pub fn prioritize(
        &self,
        goal_tasks: &[Task],
        availability_of: impl Fn(&Task) -> f64,
    ) -> Vec<TaskPriorityScore> {
        let mut scores: Vec<TaskPriorityScore> = goal_tasks
            .iter()
            .map(|task| self.score(task, goal_tasks, availability_of(task)))
            .collect();
        scores.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scores
    }
}
