//! Durable goal/task state with invariant enforcement.
//!
//! The store is the single source of truth for goal and task state; all
//! mutation passes through it. Each operation is atomic with respect to
//! a single task or goal: it either fully applies or returns a typed
//! error without mutating state. Mutations serialize through an internal
//! lock so concurrent updates to the same task cannot interleave.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{Goal, GoalStatus, Task, TaskStatus};
use crate::domain::ports::{GoalRepository, TaskFilter, TaskRepository};
use crate::services::dependency_resolver::DependencyResolver;

/// Per-status counts and completion percentage for a goal.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GoalProgress {
    pub goal_id: Uuid,
    pub status: GoalStatus,
    pub counts: HashMap<TaskStatus, u64>,
    pub total: u64,
    /// Completed tasks over total, in percent. 100.0 for empty goals.
    pub completion_pct: f64,
}

/// Durable mapping from goal/task id to state.
pub struct TaskStore<G, T>
where
    G: GoalRepository,
    T: TaskRepository,
{
    goal_repo: Arc<G>,
    task_repo: Arc<T>,
    resolver: DependencyResolver,
    // Serializes read-modify-write cycles across tasks of all goals.
    write_lock: Mutex<()>,
}

impl<G, T> TaskStore<G, T>
where
    G: GoalRepository,
    T: TaskRepository,
{
    pub fn new(goal_repo: Arc<G>, task_repo: Arc<T>) -> Self {
        Self {
            goal_repo,
            task_repo,
            resolver: DependencyResolver::new(),
            write_lock: Mutex::new(()),
        }
    }

    // ------------------------------------------------------------------
    // Goals
    // ------------------------------------------------------------------

    /// Persist a new goal. Fails with `DuplicateId` if the id exists.
    pub async fn create_goal(&self, goal: Goal) -> CoreResult<Goal> {
        goal.validate().map_err(CoreError::Validation)?;
        let _guard = self.write_lock.lock().await;
        if self.goal_repo.get(goal.id).await?.is_some() {
            return Err(CoreError::DuplicateId(goal.id));
        }
        self.goal_repo.create(&goal).await?;
        tracing::info!(goal_id = %goal.id, "Goal created");
        Ok(goal)
    }

    pub async fn get_goal(&self, goal_id: Uuid) -> CoreResult<Goal> {
        self.goal_repo
            .get(goal_id)
            .await?
            .ok_or(CoreError::GoalNotFound(goal_id))
    }

    /// Transition a goal, enforcing its state machine.
    pub async fn update_goal_status(
        &self,
        goal_id: Uuid,
        new_status: GoalStatus,
    ) -> CoreResult<Goal> {
        let _guard = self.write_lock.lock().await;
        let mut goal = self
            .goal_repo
            .get(goal_id)
            .await?
            .ok_or(CoreError::GoalNotFound(goal_id))?;
        goal.transition_to(new_status)
            .map_err(|_| CoreError::InvalidState {
                from: goal.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            })?;
        self.goal_repo.update(&goal).await?;
        Ok(goal)
    }

    // ------------------------------------------------------------------
    // Task creation & queries
    // ------------------------------------------------------------------

    /// Persist a new task after validating identity, dependency scope,
    /// and acyclicity. The store is unchanged on any failure.
    pub async fn create_task(&self, task: Task) -> CoreResult<Task> {
        if !(0..=crate::domain::models::MAX_PRIORITY).contains(&task.priority) {
            return Err(CoreError::InvalidPriority(task.priority));
        }
        task.validate().map_err(validation_error)?;

        let _guard = self.write_lock.lock().await;

        if self.task_repo.get(task.id).await?.is_some() {
            return Err(CoreError::DuplicateId(task.id));
        }
        if self.goal_repo.get(task.goal_id).await?.is_none() {
            return Err(CoreError::GoalNotFound(task.goal_id));
        }

        // Dependencies must name existing tasks of the same goal.
        for dep_id in &task.dependencies {
            let dep = self
                .task_repo
                .get(*dep_id)
                .await?
                .ok_or_else(|| {
                    CoreError::InvalidDependency(format!("dependency {dep_id} does not exist"))
                })?;
            if dep.goal_id != task.goal_id {
                return Err(CoreError::InvalidDependency(format!(
                    "dependency {dep_id} belongs to a different goal"
                )));
            }
        }

        let mut graph = self.task_repo.list_by_goal(task.goal_id).await?;
        graph.push(task.clone());
        if let Some(cycle) = self.resolver.detect_cycle(&graph) {
            return Err(CoreError::CyclicDependency(cycle));
        }

        self.task_repo.create(&task).await?;
        tracing::debug!(task_id = %task.id, goal_id = %task.goal_id, "Task created");
        Ok(task)
    }

    pub async fn get_task(&self, task_id: Uuid) -> CoreResult<Task> {
        self.task_repo
            .get(task_id)
            .await?
            .ok_or(CoreError::TaskNotFound(task_id))
    }

    /// All tasks of a goal, highest priority first.
    pub async fn goal_tasks(&self, goal_id: Uuid) -> CoreResult<Vec<Task>> {
        self.task_repo.list_by_goal(goal_id).await
    }

    /// Tasks assigned to an agent type, optionally filtered by status.
    pub async fn agent_tasks(
        &self,
        agent_type: &str,
        status: Option<TaskStatus>,
    ) -> CoreResult<Vec<Task>> {
        self.task_repo
            .list(TaskFilter {
                agent_type: Some(agent_type.to_string()),
                status,
                ..TaskFilter::default()
            })
            .await
    }

    /// Tasks in progress longer than the given number of hours.
    pub async fn stalled_tasks(&self, older_than_hours: i64) -> CoreResult<Vec<Task>> {
        let cutoff = Utc::now() - Duration::hours(older_than_hours);
        self.task_repo.list_stalled(cutoff).await
    }

    /// Queued tasks of a goal whose dependencies are all completed, in
    /// descending priority then ascending creation order. The ordering
    /// is stable so scheduling is deterministic under the same input.
    pub async fn ready_tasks(&self, goal_id: Uuid) -> CoreResult<Vec<Task>> {
        let tasks = self.task_repo.list_by_goal(goal_id).await?;
        Ok(self.resolver.ready(&tasks))
    }

    // ------------------------------------------------------------------
    // Task mutation
    // ------------------------------------------------------------------

    /// Transition a task, enforcing the state machine and the payload
    /// requirements of the target status.
    pub async fn update_task_status(
        &self,
        task_id: Uuid,
        new_status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> CoreResult<Task> {
        let _guard = self.write_lock.lock().await;
        let mut task = self
            .task_repo
            .get(task_id)
            .await?
            .ok_or(CoreError::TaskNotFound(task_id))?;

        let invalid = |task: &Task| CoreError::InvalidState {
            from: task.status.as_str().to_string(),
            to: new_status.as_str().to_string(),
        };

        if !task.can_transition_to(new_status) {
            return Err(invalid(&task));
        }

        match new_status {
            TaskStatus::InProgress => {
                // A task never starts before its dependencies complete.
                for dep_id in &task.dependencies {
                    let dep = self
                        .task_repo
                        .get(*dep_id)
                        .await?
                        .ok_or(CoreError::TaskNotFound(*dep_id))?;
                    if dep.status != TaskStatus::Completed {
                        return Err(invalid(&task));
                    }
                }
            }
            TaskStatus::Completed => {
                if result.is_none() {
                    return Err(CoreError::Validation(
                        "completed requires a result".to_string(),
                    ));
                }
            }
            TaskStatus::Failed | TaskStatus::Killed => {
                if error.is_none() {
                    return Err(CoreError::Validation(format!(
                        "{} requires an error",
                        new_status.as_str()
                    )));
                }
            }
            _ => {}
        }

        task.transition_to(new_status).map_err(|_| invalid(&task))?;
        if let Some(result) = result {
            task.result = Some(result);
        }
        if let Some(error) = error {
            task.error = Some(error);
        }

        self.task_repo.update(&task).await?;
        tracing::debug!(task_id = %task.id, status = %task.status.as_str(), "Task status updated");
        Ok(task)
    }

    /// Record the agent type a task was routed to.
    pub async fn set_task_agent(&self, task_id: Uuid, agent_type: &str) -> CoreResult<Task> {
        let _guard = self.write_lock.lock().await;
        let mut task = self
            .task_repo
            .get(task_id)
            .await?
            .ok_or(CoreError::TaskNotFound(task_id))?;
        task.assigned_agent = Some(agent_type.to_string());
        task.updated_at = Utc::now();
        task.version += 1;
        self.task_repo.update(&task).await?;
        Ok(task)
    }

    /// Merge a patch into the task's metadata.
    pub async fn update_task_metadata(
        &self,
        task_id: Uuid,
        patch: HashMap<String, serde_json::Value>,
    ) -> CoreResult<Task> {
        let _guard = self.write_lock.lock().await;
        let mut task = self
            .task_repo
            .get(task_id)
            .await?
            .ok_or(CoreError::TaskNotFound(task_id))?;
        task.metadata.extend(patch);
        task.updated_at = Utc::now();
        task.version += 1;
        self.task_repo.update(&task).await?;
        Ok(task)
    }

    /// Replace a task's dependencies, re-validating scope and
    /// acyclicity. The store is unchanged on failure.
    pub async fn update_task_dependencies(
        &self,
        task_id: Uuid,
        dependencies: Vec<Uuid>,
    ) -> CoreResult<Task> {
        let _guard = self.write_lock.lock().await;
        let mut task = self
            .task_repo
            .get(task_id)
            .await?
            .ok_or(CoreError::TaskNotFound(task_id))?;

        if dependencies.contains(&task_id) {
            return Err(CoreError::InvalidDependency(
                "task cannot depend on itself".to_string(),
            ));
        }
        for dep_id in &dependencies {
            let dep = self
                .task_repo
                .get(*dep_id)
                .await?
                .ok_or_else(|| {
                    CoreError::InvalidDependency(format!("dependency {dep_id} does not exist"))
                })?;
            if dep.goal_id != task.goal_id {
                return Err(CoreError::InvalidDependency(format!(
                    "dependency {dep_id} belongs to a different goal"
                )));
            }
        }

        let mut graph = self.task_repo.list_by_goal(task.goal_id).await?;
        for candidate in &mut graph {
            if candidate.id == task_id {
                candidate.dependencies = dependencies.clone();
            }
        }
        if let Some(cycle) = self.resolver.detect_cycle(&graph) {
            return Err(CoreError::CyclicDependency(cycle));
        }

        task.dependencies = dependencies;
        task.updated_at = Utc::now();
        task.version += 1;
        self.task_repo.update(&task).await?;
        Ok(task)
    }

    /// Re-queue a failed task, incrementing its retry counter. Fails
    /// with `RetriesExhausted` once the budget is spent.
    pub async fn retry_task(&self, task_id: Uuid) -> CoreResult<Task> {
        let _guard = self.write_lock.lock().await;
        let mut task = self
            .task_repo
            .get(task_id)
            .await?
            .ok_or(CoreError::TaskNotFound(task_id))?;

        if task.status != TaskStatus::Failed {
            return Err(CoreError::InvalidState {
                from: task.status.as_str().to_string(),
                to: TaskStatus::Queued.as_str().to_string(),
            });
        }
        if !task.can_retry() {
            return Err(CoreError::RetriesExhausted);
        }

        task.retry()
            .map_err(|e| CoreError::Internal(format!("retry rejected: {e}")))?;
        self.task_repo.update(&task).await?;
        tracing::info!(
            task_id = %task.id,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            "Task re-queued for retry"
        );
        Ok(task)
    }

    /// Operator restart: move a terminal task other than `completed`
    /// back to `queued` with a fresh retry budget.
    pub async fn restart_task(&self, task_id: Uuid) -> CoreResult<Task> {
        let _guard = self.write_lock.lock().await;
        let mut task = self
            .task_repo
            .get(task_id)
            .await?
            .ok_or(CoreError::TaskNotFound(task_id))?;

        if !task.is_terminal() || task.status == TaskStatus::Completed {
            return Err(CoreError::InvalidState {
                from: task.status.as_str().to_string(),
                to: TaskStatus::Queued.as_str().to_string(),
            });
        }

        task.transition_to(TaskStatus::Queued)
            .map_err(|e| CoreError::Internal(format!("restart rejected: {e}")))?;
        task.retry_count = 0;
        self.task_repo.update(&task).await?;
        Ok(task)
    }

    /// Reconciliation sweep: queued tasks with a terminally-failed
    /// dependency become `blocked`. Runs to fixpoint so blocking
    /// propagates down whole dependency chains in one call. Returns the
    /// tasks transitioned.
    pub async fn mark_blocked(&self, goal_id: Uuid) -> CoreResult<Vec<Task>> {
        let _guard = self.write_lock.lock().await;
        let mut tasks = self.task_repo.list_by_goal(goal_id).await?;
        let mut blocked = Vec::new();

        loop {
            let dead: std::collections::HashSet<Uuid> = tasks
                .iter()
                .filter(|t| match t.status {
                    TaskStatus::Failed => !t.can_retry(),
                    TaskStatus::Blocked | TaskStatus::Killed => true,
                    _ => false,
                })
                .map(|t| t.id)
                .collect();

            let mut changed = false;
            for task in &mut tasks {
                if task.status != TaskStatus::Queued {
                    continue;
                }
                if task.dependencies.iter().any(|dep| dead.contains(dep)) {
                    task.transition_to(TaskStatus::Blocked)
                        .map_err(|e| CoreError::Internal(format!("block rejected: {e}")))?;
                    self.task_repo.update(task).await?;
                    tracing::info!(task_id = %task.id, "Task blocked by failed dependency");
                    blocked.push(task.clone());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        Ok(blocked)
    }

    // ------------------------------------------------------------------
    // Progress
    // ------------------------------------------------------------------

    /// Per-status counts and completion percentage for a goal.
    pub async fn goal_progress(&self, goal_id: Uuid) -> CoreResult<GoalProgress> {
        let goal = self
            .goal_repo
            .get(goal_id)
            .await?
            .ok_or(CoreError::GoalNotFound(goal_id))?;
        let counts = self.task_repo.count_by_status(goal_id).await?;
        let total: u64 = counts.values().sum();
        let completed = counts.get(&TaskStatus::Completed).copied().unwrap_or(0);
        #[allow(clippy::cast_precision_loss)]
        let completion_pct = if total == 0 {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Ok(GoalProgress {
            goal_id,
            status: goal.status,
            counts,
            total,
            completion_pct,
        })
    }

    /// True when every task of the goal is terminal.
    pub async fn all_tasks_terminal(&self, goal_id: Uuid) -> CoreResult<bool> {
        let tasks = self.task_repo.list_by_goal(goal_id).await?;
        Ok(tasks.iter().all(Task::is_terminal))
    }
}

fn validation_error(message: String) -> CoreError {
    if message.contains("depend on itself") {
        CoreError::InvalidDependency(message)
    } else {
        CoreError::Validation(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_memory_pool, SqliteGoalRepository, SqliteTaskRepository,
    };

    async fn setup() -> (TaskStore<SqliteGoalRepository, SqliteTaskRepository>, Goal) {
        let pool = create_migrated_memory_pool().await.unwrap();
        let store = TaskStore::new(
            Arc::new(SqliteGoalRepository::new(pool.clone())),
            Arc::new(SqliteTaskRepository::new(pool)),
        );
        let goal = store.create_goal(Goal::new("test goal")).await.unwrap();
        (store, goal)
    }

    #[tokio::test]
    async fn test_duplicate_goal_rejected() {
        let (store, goal) = setup().await;
        let err = store.create_goal(goal).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn test_create_task_rejects_duplicate_id() {
        let (store, goal) = setup().await;
        let task = store.create_task(Task::new(goal.id, "t")).await.unwrap();
        let err = store.create_task(task).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn test_create_task_rejects_cross_goal_dependency() {
        let (store, goal) = setup().await;
        let other = store.create_goal(Goal::new("other goal")).await.unwrap();
        let foreign = store.create_task(Task::new(other.id, "f")).await.unwrap();

        let err = store
            .create_task(Task::new(goal.id, "t").with_dependency(foreign.id))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidDependency(_)));
    }

    #[tokio::test]
    async fn test_create_task_rejects_unknown_dependency() {
        let (store, goal) = setup().await;
        let err = store
            .create_task(Task::new(goal.id, "t").with_dependency(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidDependency(_)));
    }

    #[tokio::test]
    async fn test_dependency_update_cycle_rejected_store_unchanged() {
        let (store, goal) = setup().await;
        let a = store.create_task(Task::new(goal.id, "a")).await.unwrap();
        let b = store
            .create_task(Task::new(goal.id, "b").with_dependency(a.id))
            .await
            .unwrap();

        // Closing the loop a -> b must fail and leave the store as-is.
        let err = store
            .update_task_dependencies(a.id, vec![b.id])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CyclicDependency(_)));

        let reloaded = store.get_task(a.id).await.unwrap();
        assert!(reloaded.dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_ready_tasks_ordering_and_gating() {
        let (store, goal) = setup().await;
        let a = store
            .create_task(Task::new(goal.id, "a").with_priority(2))
            .await
            .unwrap();
        let _gated = store
            .create_task(Task::new(goal.id, "gated").with_priority(9).with_dependency(a.id))
            .await
            .unwrap();
        let b = store
            .create_task(Task::new(goal.id, "b").with_priority(5))
            .await
            .unwrap();

        let ready = store.ready_tasks(goal.id).await.unwrap();
        let ids: Vec<Uuid> = ready.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn test_status_payload_requirements() {
        let (store, goal) = setup().await;
        let task = store.create_task(Task::new(goal.id, "t")).await.unwrap();
        store
            .update_task_status(task.id, TaskStatus::InProgress, None, None)
            .await
            .unwrap();

        // Completed requires a result
        let err = store
            .update_task_status(task.id, TaskStatus::Completed, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        // Failed requires an error
        let err = store
            .update_task_status(task.id, TaskStatus::Failed, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        store
            .update_task_status(
                task.id,
                TaskStatus::Completed,
                Some(serde_json::json!({"ok": true})),
                None,
            )
            .await
            .unwrap();
        let task = store.get_task(task.id).await.unwrap();
        assert!(task.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_start_requires_completed_dependencies() {
        let (store, goal) = setup().await;
        let dep = store.create_task(Task::new(goal.id, "dep")).await.unwrap();
        let task = store
            .create_task(Task::new(goal.id, "t").with_dependency(dep.id))
            .await
            .unwrap();

        let err = store
            .update_task_status(task.id, TaskStatus::InProgress, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_repeated_transition_rejected() {
        let (store, goal) = setup().await;
        let task = store.create_task(Task::new(goal.id, "t")).await.unwrap();
        store
            .update_task_status(task.id, TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        let err = store
            .update_task_status(task.id, TaskStatus::InProgress, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_retry_until_exhausted() {
        let (store, goal) = setup().await;
        let task = store
            .create_task(Task::new(goal.id, "t").with_max_retries(1))
            .await
            .unwrap();

        store
            .update_task_status(task.id, TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        store
            .update_task_status(task.id, TaskStatus::Failed, None, Some("boom".into()))
            .await
            .unwrap();

        let retried = store.retry_task(task.id).await.unwrap();
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.status, TaskStatus::Queued);

        store
            .update_task_status(task.id, TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        store
            .update_task_status(task.id, TaskStatus::Failed, None, Some("boom".into()))
            .await
            .unwrap();

        let err = store.retry_task(task.id).await.unwrap_err();
        assert!(matches!(err, CoreError::RetriesExhausted));
        // retry_count never exceeds max_retries
        let task = store.get_task(task.id).await.unwrap();
        assert!(task.retry_count <= task.max_retries);
    }

    #[tokio::test]
    async fn test_mark_blocked_on_exhausted_dependency() {
        let (store, goal) = setup().await;
        let dep = store
            .create_task(Task::new(goal.id, "dep").with_max_retries(0))
            .await
            .unwrap();
        let child = store
            .create_task(Task::new(goal.id, "child").with_dependency(dep.id))
            .await
            .unwrap();

        store
            .update_task_status(dep.id, TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        store
            .update_task_status(dep.id, TaskStatus::Failed, None, Some("boom".into()))
            .await
            .unwrap();

        let blocked = store.mark_blocked(goal.id).await.unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].id, child.id);
        assert_eq!(
            store.get_task(child.id).await.unwrap().status,
            TaskStatus::Blocked
        );
    }

    #[tokio::test]
    async fn test_mark_blocked_propagates_down_chains() {
        let (store, goal) = setup().await;
        let a = store
            .create_task(Task::new(goal.id, "a").with_max_retries(0))
            .await
            .unwrap();
        let b = store
            .create_task(Task::new(goal.id, "b").with_dependency(a.id))
            .await
            .unwrap();
        let c = store
            .create_task(Task::new(goal.id, "c").with_dependency(b.id))
            .await
            .unwrap();

        store
            .update_task_status(a.id, TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        store
            .update_task_status(a.id, TaskStatus::Failed, None, Some("boom".into()))
            .await
            .unwrap();

        // One sweep blocks the entire downstream chain.
        let blocked = store.mark_blocked(goal.id).await.unwrap();
        assert_eq!(blocked.len(), 2);
        assert_eq!(store.get_task(b.id).await.unwrap().status, TaskStatus::Blocked);
        assert_eq!(store.get_task(c.id).await.unwrap().status, TaskStatus::Blocked);
    }

    #[tokio::test]
    async fn test_mark_blocked_spares_retryable_dependency() {
        let (store, goal) = setup().await;
        let dep = store
            .create_task(Task::new(goal.id, "dep").with_max_retries(2))
            .await
            .unwrap();
        let child = store
            .create_task(Task::new(goal.id, "child").with_dependency(dep.id))
            .await
            .unwrap();

        store
            .update_task_status(dep.id, TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        store
            .update_task_status(dep.id, TaskStatus::Failed, None, Some("boom".into()))
            .await
            .unwrap();

        // The dependency still has retry budget; the child stays queued.
        let blocked = store.mark_blocked(goal.id).await.unwrap();
        assert!(blocked.is_empty());
        assert_eq!(
            store.get_task(child.id).await.unwrap().status,
            TaskStatus::Queued
        );
    }

    #[tokio::test]
    async fn test_restart_task_rules() {
        let (store, goal) = setup().await;
        let task = store.create_task(Task::new(goal.id, "t")).await.unwrap();

        // Restart from queued is invalid
        assert!(matches!(
            store.restart_task(task.id).await,
            Err(CoreError::InvalidState { .. })
        ));

        store
            .update_task_status(task.id, TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        store
            .update_task_status(task.id, TaskStatus::Killed, None, Some("cancelled".into()))
            .await
            .unwrap();

        let restarted = store.restart_task(task.id).await.unwrap();
        assert_eq!(restarted.status, TaskStatus::Queued);
        assert_eq!(restarted.retry_count, 0);

        // Restart from completed is invalid
        let done = store.create_task(Task::new(goal.id, "done")).await.unwrap();
        store
            .update_task_status(done.id, TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        store
            .update_task_status(
                done.id,
                TaskStatus::Completed,
                Some(serde_json::json!("ok")),
                None,
            )
            .await
            .unwrap();
        assert!(matches!(
            store.restart_task(done.id).await,
            Err(CoreError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_metadata_merge() {
        let (store, goal) = setup().await;
        let task = store.create_task(Task::new(goal.id, "t")).await.unwrap();

        let mut patch = HashMap::new();
        patch.insert("escalated".to_string(), serde_json::json!(true));
        store.update_task_metadata(task.id, patch).await.unwrap();

        let mut patch = HashMap::new();
        patch.insert("escalation_reason".to_string(), serde_json::json!("boom"));
        let task = store.update_task_metadata(task.id, patch).await.unwrap();

        assert_eq!(task.metadata.get("escalated"), Some(&serde_json::json!(true)));
        assert_eq!(
            task.metadata.get("escalation_reason"),
            Some(&serde_json::json!("boom"))
        );
    }

    #[tokio::test]
    async fn test_goal_progress_counts() {
        let (store, goal) = setup().await;
        let progress = store.goal_progress(goal.id).await.unwrap();
        assert_eq!(progress.total, 0);
        assert!((progress.completion_pct - 100.0).abs() < f64::EPSILON);

        let a = store.create_task(Task::new(goal.id, "a")).await.unwrap();
        store.create_task(Task::new(goal.id, "b")).await.unwrap();
        store
            .update_task_status(a.id, TaskStatus::InProgress, None, None)
            .await
            .unwrap();
        store
            .update_task_status(a.id, TaskStatus::Completed, Some(serde_json::json!("ok")), None)
            .await
            .unwrap();

        let progress = store.goal_progress(goal.id).await.unwrap();
        assert_eq!(progress.total, 2);
        assert!((progress.completion_pct - 50.0).abs() < f64::EPSILON);
    }
}
