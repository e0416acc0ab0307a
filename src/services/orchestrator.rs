//! End-to-end goal execution.
//!
//! The orchestrator owns the composition: it materializes a decomposed
//! plan into the task store, then runs a single scheduling loop that
//! keeps up to `max_parallel` worker attempts in flight, advancing the
//! DAG as dependencies resolve and finalizing the goal once every task
//! is terminal.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::{AbortHandle, JoinSet};
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{EventKind, EventRecord, Goal, GoalStatus, SchedulerConfig, Task};
use crate::domain::ports::{
    CancelHandle, Decomposer, EventRepository, GoalRepository, SubtaskSpec, TaskRepository,
};
use crate::services::agent_coordinator::{AgentCoordinator, AttemptOutcome, GoalReport};
use crate::services::agent_router::AgentRouter;
use crate::services::event_log::EventLog;
use crate::services::priority_calculator::{PriorityCalculator, TaskPriorityScore};
use crate::services::task_store::{GoalProgress, TaskStore};

struct RunningAttempt {
    abort: AbortHandle,
    cancel: CancelHandle,
}

/// Top-level goal executor.
pub struct PlannerOrchestrator<G, T, E>
where
    G: GoalRepository + 'static,
    T: TaskRepository + 'static,
    E: EventRepository + 'static,
{
    store: Arc<TaskStore<G, T>>,
    coordinator: Arc<AgentCoordinator<G, T, E>>,
    events: Arc<EventLog<E>>,
    router: Arc<AgentRouter>,
    decomposer: Arc<dyn Decomposer>,
    calculator: PriorityCalculator,
    config: SchedulerConfig,
    running: Arc<RwLock<HashMap<Uuid, RunningAttempt>>>,
}

impl<G, T, E> PlannerOrchestrator<G, T, E>
where
    G: GoalRepository + 'static,
    T: TaskRepository + 'static,
    E: EventRepository + 'static,
{
    pub fn new(
        store: Arc<TaskStore<G, T>>,
        coordinator: Arc<AgentCoordinator<G, T, E>>,
        events: Arc<EventLog<E>>,
        router: Arc<AgentRouter>,
        decomposer: Arc<dyn Decomposer>,
        calculator: PriorityCalculator,
        config: SchedulerConfig,
    ) -> CoreResult<Self> {
        calculator.validate()?;
        if config.max_parallel == 0 {
            return Err(CoreError::Configuration(
                "max_parallel must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            store,
            coordinator,
            events,
            router,
            decomposer,
            calculator,
            config,
            running: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    // ------------------------------------------------------------------
    // Goal intake
    // ------------------------------------------------------------------

    /// Execute a goal end to end. A goal that already exists with tasks
    /// resumes scheduling instead of re-decomposing when `auto_resume`
    /// is configured.
    pub async fn process_goal(&self, goal: Goal) -> CoreResult<GoalReport> {
        let goal_id = goal.id;

        let existing = match self.store.get_goal(goal_id).await {
            Ok(goal) => Some(goal),
            Err(CoreError::GoalNotFound(_)) => None,
            Err(err) => return Err(err),
        };

        match existing {
            Some(_) => {
                let has_tasks = !self.store.goal_tasks(goal_id).await?.is_empty();
                if has_tasks && self.config.auto_resume {
                    return self.resume_goal(goal_id).await;
                }
                self.decompose_into_tasks(goal_id).await?;
            }
            None => {
                let goal = self.store.create_goal(goal).await?;
                self.events
                    .append(
                        goal.id,
                        None,
                        EventKind::GoalCreated,
                        serde_json::json!({ "description": goal.description }),
                    )
                    .await?;
                self.decompose_into_tasks(goal_id).await?;
            }
        }

        self.run_schedule(goal_id).await
    }

    /// Resume scheduling against existing task states. On a goal that
    /// already reached a terminal state this is a no-op returning the
    /// same final report.
    pub async fn resume_goal(&self, goal_id: Uuid) -> CoreResult<GoalReport> {
        let goal = self.store.get_goal(goal_id).await?;
        if goal.is_terminal() {
            return self.coordinator.finalize_goal(goal_id).await;
        }
        self.run_schedule(goal_id).await
    }

    /// Ask the decomposer for the plan and materialize it as tasks.
    /// Dependency indexes are translated in a second pass so a subtask
    /// may reference any position in the returned list.
    async fn decompose_into_tasks(&self, goal_id: Uuid) -> CoreResult<()> {
        let goal = self.store.get_goal(goal_id).await?;
        let result = self.materialize_plan(&goal).await;
        if let Err(err) = result {
            // A rejected plan aborts goal processing.
            tracing::error!(goal_id = %goal_id, error = %err, "Decomposition failed");
            let current = self.store.get_goal(goal_id).await?;
            if current.status == GoalStatus::Pending {
                let _ = self
                    .store
                    .update_goal_status(goal_id, GoalStatus::InProgress)
                    .await;
            }
            let _ = self
                .store
                .update_goal_status(goal_id, GoalStatus::Failed)
                .await;
            self.events
                .append(
                    goal_id,
                    None,
                    EventKind::GoalFailed,
                    serde_json::json!({ "error": err.to_string() }),
                )
                .await?;
            return Err(err);
        }
        Ok(())
    }

    async fn materialize_plan(&self, goal: &Goal) -> CoreResult<()> {
        let specs = self.decomposer.decompose(&goal.description, goal.id).await?;

        let mut ids: Vec<Uuid> = Vec::with_capacity(specs.len());
        for spec in &specs {
            let mut task = Task::new(goal.id, &spec.description)
                .with_priority(spec.priority.unwrap_or(0))
                .with_max_retries(spec.max_retries.unwrap_or(self.config.default_max_retries));
            if let Some(agent) = &spec.assigned_agent {
                task = task.with_agent(agent.clone());
            }
            if let Some(kind) = &spec.kind {
                task = task.with_kind(kind.clone());
            }
            let task = self.store.create_task(task).await?;
            self.events
                .append(
                    goal.id,
                    Some(task.id),
                    EventKind::TaskCreated,
                    serde_json::json!({
                        "description": task.description,
                        "priority": task.priority,
                    }),
                )
                .await?;
            ids.push(task.id);
        }

        for (index, spec) in specs.iter().enumerate() {
            if spec.depends_on.is_empty() {
                continue;
            }
            let dependencies = translate_dependencies(spec, index, &ids)?;
            self.store
                .update_task_dependencies(ids[index], dependencies)
                .await?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Scheduling loop
    // ------------------------------------------------------------------

    async fn run_schedule(&self, goal_id: Uuid) -> CoreResult<GoalReport> {
        let goal = self.store.get_goal(goal_id).await?;
        if goal.status == GoalStatus::Pending {
            self.store
                .update_goal_status(goal_id, GoalStatus::InProgress)
                .await?;
        }

        let mut attempts: JoinSet<(Uuid, CoreResult<AttemptOutcome>)> = JoinSet::new();

        loop {
            // Sweep finished handles so re-queued tasks can respawn.
            self.running
                .write()
                .await
                .retain(|_, attempt| !attempt.abort.is_finished());

            // Dependents of terminally-failed tasks become blocked.
            self.store.mark_blocked(goal_id).await?;

            // Refill up to the concurrency bound, highest priority first.
            if attempts.len() < self.config.max_parallel {
                let ready = self.store.ready_tasks(goal_id).await?;
                for task in ready {
                    if attempts.len() >= self.config.max_parallel {
                        break;
                    }
                    let mut running = self.running.write().await;
                    if running.contains_key(&task.id) {
                        continue;
                    }
                    let (cancel_handle, cancel_signal) = CancelHandle::new();
                    let coordinator = Arc::clone(&self.coordinator);
                    let task_id = task.id;
                    let abort = attempts.spawn(async move {
                        (task_id, coordinator.execute_attempt(task_id, cancel_signal).await)
                    });
                    running.insert(
                        task_id,
                        RunningAttempt {
                            abort,
                            cancel: cancel_handle,
                        },
                    );
                }
            }

            if attempts.is_empty() {
                if self.store.all_tasks_terminal(goal_id).await? {
                    break;
                }
                // Nothing running and nothing ready, yet non-terminal
                // tasks remain: the graph cannot advance.
                let err = CoreError::Internal(format!(
                    "scheduling stalled for goal {goal_id}: no ready or running tasks"
                ));
                self.events
                    .append(
                        goal_id,
                        None,
                        EventKind::GoalFailed,
                        serde_json::json!({ "error": err.to_string() }),
                    )
                    .await?;
                let _ = self
                    .store
                    .update_goal_status(goal_id, GoalStatus::Failed)
                    .await;
                return Err(err);
            }

            // Wait for any attempt to settle. Every attempt self-bounds
            // with its kind's deadline, so this wait is bounded too.
            match attempts.join_next().await {
                Some(Ok((task_id, Ok(outcome)))) => {
                    tracing::debug!(task_id = %task_id, outcome = ?outcome, "Attempt settled");
                }
                Some(Ok((task_id, Err(err)))) => {
                    if matches!(err, CoreError::Internal(_)) {
                        // Invariant violations terminate the loop.
                        self.events
                            .append(
                                goal_id,
                                Some(task_id),
                                EventKind::GoalFailed,
                                serde_json::json!({ "error": err.to_string() }),
                            )
                            .await?;
                        let _ = self
                            .store
                            .update_goal_status(goal_id, GoalStatus::Failed)
                            .await;
                        return Err(err);
                    }
                    tracing::error!(task_id = %task_id, error = %err, "Attempt errored");
                }
                Some(Err(join_err)) => {
                    // A cancelled join is a killed task; its state was
                    // already settled by kill_task.
                    if !join_err.is_cancelled() {
                        let err =
                            CoreError::Internal(format!("worker attempt panicked: {join_err}"));
                        self.events
                            .append(
                                goal_id,
                                None,
                                EventKind::GoalFailed,
                                serde_json::json!({ "error": err.to_string() }),
                            )
                            .await?;
                        let _ = self
                            .store
                            .update_goal_status(goal_id, GoalStatus::Failed)
                            .await;
                        return Err(err);
                    }
                }
                None => {}
            }
        }

        self.coordinator.finalize_goal(goal_id).await
    }

    // ------------------------------------------------------------------
    // Commands & introspection
    // ------------------------------------------------------------------

    /// Kill an in-progress task: cooperative cancel, abort the attempt,
    /// discard any late result.
    pub async fn kill_task(&self, task_id: Uuid) -> CoreResult<()> {
        self.coordinator.kill_task(task_id).await?;
        if let Some(attempt) = self.running.write().await.remove(&task_id) {
            attempt.cancel.cancel();
            attempt.abort.abort();
        }
        Ok(())
    }

    /// Operator restart: terminal-and-not-completed back to queued.
    pub async fn restart_task(&self, task_id: Uuid) -> CoreResult<Task> {
        self.store.restart_task(task_id).await
    }

    /// Stream the goal's event history in append order.
    pub async fn replay_history(&self, goal_id: Uuid) -> CoreResult<Vec<EventRecord>> {
        // Surface unknown goals instead of an empty stream.
        self.store.get_goal(goal_id).await?;
        self.events.replay(goal_id).await
    }

    /// Score and order a goal's tasks by scheduling urgency.
    pub async fn prioritize_tasks(&self, goal_id: Uuid) -> CoreResult<Vec<TaskPriorityScore>> {
        let tasks = self.store.goal_tasks(goal_id).await?;

        let mut availability: HashMap<String, f64> = HashMap::new();
        for profile in self.router.profiles() {
            availability.insert(
                profile.agent_type.clone(),
                self.router.availability_of(&profile.agent_type).await,
            );
        }

        Ok(self.calculator.prioritize(&tasks, |task| {
            task.assigned_agent
                .as_ref()
                .and_then(|agent| availability.get(agent))
                .copied()
                .unwrap_or(1.0)
        }))
    }

    /// Current goal status.
    pub async fn get_goal_status(&self, goal_id: Uuid) -> CoreResult<Goal> {
        self.store.get_goal(goal_id).await
    }

    /// Per-status counts and completion percentage.
    pub async fn goal_progress(&self, goal_id: Uuid) -> CoreResult<GoalProgress> {
        self.store.goal_progress(goal_id).await
    }

    /// Tasks in progress longer than the configured staleness bound.
    pub async fn stalled_tasks(&self) -> CoreResult<Vec<Task>> {
        self.store
            .stalled_tasks(self.config.stalled_hours_threshold)
            .await
    }
}

fn translate_dependencies(
    spec: &SubtaskSpec,
    index: usize,
    ids: &[Uuid],
) -> CoreResult<Vec<Uuid>> {
    let mut dependencies = Vec::with_capacity(spec.depends_on.len());
    for &dep_index in &spec.depends_on {
        if dep_index == index {
            return Err(CoreError::InvalidDependency(format!(
                "subtask {index} depends on itself"
            )));
        }
        let dep_id = ids.get(dep_index).ok_or_else(|| {
            CoreError::InvalidDependency(format!(
                "subtask {index} references unknown index {dep_index}"
            ))
        })?;
        dependencies.push(*dep_id);
    }
    Ok(dependencies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::SubtaskSpec;

    #[test]
    fn test_translate_dependencies_valid() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let spec = SubtaskSpec::new("t").depends_on(&[0, 1]);
        let deps = translate_dependencies(&spec, 2, &ids).unwrap();
        assert_eq!(deps, vec![ids[0], ids[1]]);
    }

    #[test]
    fn test_translate_dependencies_out_of_range() {
        let ids = vec![Uuid::new_v4()];
        let spec = SubtaskSpec::new("t").depends_on(&[5]);
        assert!(matches!(
            translate_dependencies(&spec, 0, &ids),
            Err(CoreError::InvalidDependency(_))
        ));
    }

    #[test]
    fn test_translate_dependencies_self_reference() {
        let ids = vec![Uuid::new_v4()];
        let spec = SubtaskSpec::new("t").depends_on(&[0]);
        assert!(matches!(
            translate_dependencies(&spec, 0, &ids),
            Err(CoreError::InvalidDependency(_))
        ));
    }
}
