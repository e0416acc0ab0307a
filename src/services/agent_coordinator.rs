//! Drives one task through one execution attempt.
//!
//! The coordinator owns assignments, wraps every worker invocation with
//! the safety pipeline on both prompt and result, enforces the
//! per-kind deadline, applies retry-with-backoff, and raises escalation
//! events for failed high-priority tasks.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{
    Assignment, AssignmentStatus, EventKind, Goal, GoalStatus, SchedulerConfig, Task, TaskStatus,
};
use crate::domain::ports::{
    CancelSignal, EventRepository, GoalRepository, TaskRepository, WorkerAgent,
};
use crate::services::agent_router::{AgentRouter, RouteRequest};
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::event_log::EventLog;
use crate::services::policy::PolicyService;
use crate::services::safety::{SafetyCheck, SafetyPipeline};
use crate::services::task_store::TaskStore;

/// Metadata flag marking that a safety-blocked output already consumed
/// its one fallback retry.
const SAFETY_RETRIED_KEY: &str = "safety_retried";

/// How one execution attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Task completed successfully
    Completed,
    /// Attempt failed; the task went back to the queue
    Requeued,
    /// Attempt failed terminally
    Failed,
    /// The task was killed while the attempt ran; result discarded
    Killed,
}

/// Snapshot combining task state and the current assignment.
#[derive(Debug, Clone, Serialize)]
pub struct TaskProgress {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub assigned_agent: Option<String>,
    pub assignment: Option<Assignment>,
    pub error: Option<String>,
}

/// Per-task entry of a goal's final report.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: Uuid,
    pub description: String,
    pub status: TaskStatus,
    pub assigned_agent: Option<String>,
    pub retry_count: u32,
    pub error: Option<String>,
}

/// Final report produced when a goal reaches a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct GoalReport {
    pub goal_id: Uuid,
    pub status: GoalStatus,
    pub tasks: Vec<TaskReport>,
    pub total_retries: u32,
    pub completion_pct: f64,
}

/// Owns per-task attempt lifecycle: assign, execute under safety hooks,
/// complete/fail/retry, escalate.
pub struct AgentCoordinator<G, T, E>
where
    G: GoalRepository,
    T: TaskRepository,
    E: EventRepository,
{
    store: Arc<TaskStore<G, T>>,
    router: Arc<AgentRouter>,
    pipeline: Arc<SafetyPipeline>,
    events: Arc<EventLog<E>>,
    policy: PolicyService,
    breaker: Arc<CircuitBreaker>,
    worker: Arc<dyn WorkerAgent>,
    config: SchedulerConfig,
    assignments: RwLock<HashMap<Uuid, Assignment>>,
}

impl<G, T, E> AgentCoordinator<G, T, E>
where
    G: GoalRepository,
    T: TaskRepository,
    E: EventRepository,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<TaskStore<G, T>>,
        router: Arc<AgentRouter>,
        pipeline: Arc<SafetyPipeline>,
        events: Arc<EventLog<E>>,
        policy: PolicyService,
        breaker: Arc<CircuitBreaker>,
        worker: Arc<dyn WorkerAgent>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            router,
            pipeline,
            events,
            policy,
            breaker,
            worker,
            config,
            assignments: RwLock::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    /// Route a queued task, create its assignment, and start it.
    pub async fn assign_task(&self, task_id: Uuid) -> CoreResult<Assignment> {
        let task = self.store.get_task(task_id).await?;
        if task.status != TaskStatus::Queued {
            return Err(CoreError::InvalidState {
                from: task.status.as_str().to_string(),
                to: TaskStatus::InProgress.as_str().to_string(),
            });
        }

        let request = RouteRequest {
            description: task.description.clone(),
            task_type: metadata_str(&task, "task_type"),
            required_capabilities: metadata_str_list(&task, "required_capabilities"),
            preferred_agent: task
                .assigned_agent
                .clone()
                .or_else(|| metadata_str(&task, "preferred_agent")),
        };
        let decision = self.router.route(&request).await?;

        // Starting can still fail (dependency raced to a non-terminal
        // state); give the workload increment back in that case.
        let started: CoreResult<Task> = async {
            self.store
                .set_task_agent(task_id, &decision.assigned_agent)
                .await?;
            self.store
                .update_task_status(task_id, TaskStatus::InProgress, None, None)
                .await
        }
        .await;
        let task = match started {
            Ok(task) => task,
            Err(err) => {
                self.router.release(&decision.assigned_agent).await;
                return Err(err);
            }
        };

        let assignment = Assignment::new(task_id, decision.assigned_agent.clone());
        self.assignments
            .write()
            .await
            .insert(task_id, assignment.clone());

        self.events
            .append(
                task.goal_id,
                Some(task_id),
                EventKind::TaskAssigned,
                serde_json::json!({
                    "agent_id": assignment.agent_id,
                    "agent_type": assignment.agent_type,
                    "confidence": decision.confidence,
                    "reason": decision.reason,
                }),
            )
            .await?;
        self.events
            .append(
                task.goal_id,
                Some(task_id),
                EventKind::TaskStarted,
                serde_json::json!({ "attempt": task.retry_count + 1 }),
            )
            .await?;

        Ok(assignment)
    }

    /// Combine task state and current assignment into a snapshot.
    pub async fn monitor_task(&self, task_id: Uuid) -> CoreResult<TaskProgress> {
        let task = self.store.get_task(task_id).await?;
        let assignment = self.assignments.read().await.get(&task_id).cloned();
        Ok(TaskProgress {
            task_id,
            status: task.status,
            retry_count: task.retry_count,
            max_retries: task.max_retries,
            assigned_agent: task.assigned_agent,
            assignment,
            error: task.error,
        })
    }

    // ------------------------------------------------------------------
    // Attempt execution
    // ------------------------------------------------------------------

    /// Run one full attempt: assign, screen the prompt, invoke the
    /// worker under its deadline, screen the output, and settle the
    /// task's state.
    pub async fn execute_attempt(
        &self,
        task_id: Uuid,
        cancel: CancelSignal,
    ) -> CoreResult<AttemptOutcome> {
        let assignment = self.assign_task(task_id).await?;
        let task = self.store.get_task(task_id).await?;
        let kind = task.kind().to_string();
        let entry = self.policy.entry(&kind);

        // Inbound screening; a blocked prompt never reaches the worker.
        let verdict = self
            .pipeline
            .check_prompt(&task.description, &SafetyCheck::prompt_checks());
        if !verdict.findings.is_empty() {
            self.events
                .append(
                    task.goal_id,
                    Some(task_id),
                    EventKind::SafetyFinding,
                    serde_json::json!({
                        "phase": "prompt",
                        "action": verdict.action.as_str(),
                        "findings": verdict.findings,
                    }),
                )
                .await?;
        }
        if verdict.is_blocked() {
            return self
                .fail_attempt(task_id, block_error(&verdict), false, false)
                .await;
        }

        if !self.breaker.allow(&kind, &entry).await {
            return self
                .fail_attempt(task_id, format!("circuit_open:{kind}"), true, true)
                .await;
        }

        if let Some(assignment) = self.assignments.write().await.get_mut(&task_id) {
            assignment.status = AssignmentStatus::Working;
        }
        tracing::info!(
            task_id = %task_id,
            agent = %assignment.agent_type,
            kind = %kind,
            "Worker attempt starting"
        );

        let deadline = self.policy.timeout(&kind);
        let attempt = tokio::time::timeout(
            deadline,
            self.worker
                .run(&verdict.sanitized_text, task.goal_id, task_id, cancel),
        )
        .await;

        match attempt {
            Err(_elapsed) => {
                self.breaker.record_failure(&kind, &entry).await;
                self.fail_attempt(task_id, "timeout".to_string(), true, true)
                    .await
            }
            Ok(Err(err)) => {
                self.breaker.record_failure(&kind, &entry).await;
                self.fail_attempt(task_id, err.to_string(), true, true).await
            }
            Ok(Ok(result)) => {
                self.breaker.record_success(&kind).await;
                self.settle_output(task_id, result).await
            }
        }
    }

    /// Screen a worker result and settle the task accordingly.
    async fn settle_output(
        &self,
        task_id: Uuid,
        result: serde_json::Value,
    ) -> CoreResult<AttemptOutcome> {
        let task = self.store.get_task(task_id).await?;
        if task.status == TaskStatus::Killed {
            // Late result of a killed task is discarded.
            return Ok(AttemptOutcome::Killed);
        }

        let result_text = match &result {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let verdict = self
            .pipeline
            .check_output(&result_text, &SafetyCheck::output_checks());
        if !verdict.findings.is_empty() {
            self.events
                .append(
                    task.goal_id,
                    Some(task_id),
                    EventKind::SafetyFinding,
                    serde_json::json!({
                        "phase": "output",
                        "action": verdict.action.as_str(),
                        "findings": verdict.findings,
                    }),
                )
                .await?;
        }

        if verdict.is_blocked() {
            let error = block_error(&verdict);
            // One fallback retry, then the block is terminal.
            let already_retried = task
                .metadata
                .get(SAFETY_RETRIED_KEY)
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            if already_retried {
                return self.fail_attempt(task_id, error, false, false).await;
            }
            let mut patch = HashMap::new();
            patch.insert(SAFETY_RETRIED_KEY.to_string(), serde_json::json!(true));
            self.store.update_task_metadata(task_id, patch).await?;
            // The fallback retry runs without waiting out the backoff.
            return self.fail_attempt(task_id, error, true, false).await;
        }

        let stored = if verdict.action == crate::domain::models::VerdictAction::Rewrite {
            match &result {
                serde_json::Value::String(_) => {
                    serde_json::Value::String(verdict.sanitized_text.clone())
                }
                other => serde_json::json!({
                    "original": other,
                    "sanitized_text": verdict.sanitized_text,
                }),
            }
        } else {
            result
        };

        self.handle_completion(task_id, stored).await?;
        Ok(AttemptOutcome::Completed)
    }

    // ------------------------------------------------------------------
    // Completion / failure
    // ------------------------------------------------------------------

    /// Store a result and mark the task completed.
    pub async fn handle_completion(
        &self,
        task_id: Uuid,
        result: serde_json::Value,
    ) -> CoreResult<Task> {
        let task = self
            .store
            .update_task_status(task_id, TaskStatus::Completed, Some(result), None)
            .await?;
        self.events
            .append(
                task.goal_id,
                Some(task_id),
                EventKind::TaskCompleted,
                serde_json::json!({ "retry_count": task.retry_count }),
            )
            .await?;
        self.release_assignment(task_id).await;
        tracing::info!(task_id = %task_id, "Task completed");
        Ok(task)
    }

    /// Public failure entry point: retry when budget remains, else fail
    /// terminally (with escalation for high-priority tasks).
    pub async fn handle_failure(&self, task_id: Uuid, error: String) -> CoreResult<AttemptOutcome> {
        self.fail_attempt(task_id, error, true, true).await
    }

    /// Settle a failed attempt.
    ///
    /// `allow_retry` gates the retry path entirely (safety blocks on
    /// prompts are deterministic, so retrying them is pointless).
    /// `backoff` waits out the kind's retry delay before re-queueing.
    async fn fail_attempt(
        &self,
        task_id: Uuid,
        error: String,
        allow_retry: bool,
        backoff: bool,
    ) -> CoreResult<AttemptOutcome> {
        let task = self.store.get_task(task_id).await?;
        if task.status == TaskStatus::Killed {
            return Ok(AttemptOutcome::Killed);
        }

        let task = self
            .store
            .update_task_status(task_id, TaskStatus::Failed, None, Some(error.clone()))
            .await?;

        if allow_retry && task.can_retry() {
            if backoff {
                let delay = self
                    .policy
                    .backoff_delay(task.kind(), task.retry_count + 1);
                tokio::time::sleep(delay).await;
            }
            let retried = self.store.retry_task(task_id).await?;
            self.events
                .append(
                    task.goal_id,
                    Some(task_id),
                    EventKind::TaskRetry,
                    serde_json::json!({
                        "retry_count": retried.retry_count,
                        "max_retries": retried.max_retries,
                        "error": error,
                    }),
                )
                .await?;
            self.release_assignment(task_id).await;
            tracing::warn!(task_id = %task_id, error = %error, "Attempt failed, re-queued");
            return Ok(AttemptOutcome::Requeued);
        }

        self.events
            .append(
                task.goal_id,
                Some(task_id),
                EventKind::TaskFailed,
                serde_json::json!({
                    "error": error,
                    "retry_count": task.retry_count,
                }),
            )
            .await?;

        if task.priority >= self.config.escalation_priority_threshold {
            self.escalate(&task, &error).await?;
        }

        self.release_assignment(task_id).await;
        tracing::error!(task_id = %task_id, error = %error, "Task failed terminally");
        Ok(AttemptOutcome::Failed)
    }

    /// Mark a failed high-priority task for external attention. The
    /// structured event is the only core-visible effect.
    async fn escalate(&self, task: &Task, error: &str) -> CoreResult<()> {
        let mut patch = HashMap::new();
        patch.insert("escalated".to_string(), serde_json::json!(true));
        patch.insert("escalation_reason".to_string(), serde_json::json!(error));
        self.store.update_task_metadata(task.id, patch).await?;

        self.events
            .append(
                task.goal_id,
                Some(task.id),
                EventKind::TaskEscalated,
                serde_json::json!({
                    "priority": task.priority,
                    "reason": error,
                    "retry_count": task.retry_count,
                    "required_reviewers": self.config.escalation_reviewers,
                }),
            )
            .await?;
        tracing::warn!(task_id = %task.id, priority = task.priority, "Task escalated");
        Ok(())
    }

    /// Kill an in-progress task. Idempotent at the command surface:
    /// unknown ids are NotFound, non-running tasks InvalidState.
    pub async fn kill_task(&self, task_id: Uuid) -> CoreResult<Task> {
        let task = self.store.get_task(task_id).await?;
        if task.status != TaskStatus::InProgress {
            return Err(CoreError::InvalidState {
                from: task.status.as_str().to_string(),
                to: TaskStatus::Killed.as_str().to_string(),
            });
        }

        let task = self
            .store
            .update_task_status(task_id, TaskStatus::Killed, None, Some("killed".to_string()))
            .await?;
        self.events
            .append(
                task.goal_id,
                Some(task_id),
                EventKind::TaskKilled,
                serde_json::json!({}),
            )
            .await?;
        self.release_assignment(task_id).await;
        tracing::warn!(task_id = %task_id, "Task killed");
        Ok(task)
    }

    // ------------------------------------------------------------------
    // Goal finalization
    // ------------------------------------------------------------------

    /// Finalize a goal once every task is terminal: `completed` iff all
    /// tasks completed, else `failed`. Calling again on a terminal goal
    /// rebuilds the same report without emitting events.
    pub async fn finalize_goal(&self, goal_id: Uuid) -> CoreResult<GoalReport> {
        let goal = self.store.get_goal(goal_id).await?;
        let tasks = self.store.goal_tasks(goal_id).await?;

        let goal = if goal.is_terminal() {
            goal
        } else {
            if !tasks.iter().all(Task::is_terminal) {
                return Err(CoreError::InvalidState {
                    from: goal.status.as_str().to_string(),
                    to: "terminal".to_string(),
                });
            }
            let all_completed = tasks.iter().all(|t| t.status == TaskStatus::Completed);
            let (status, event) = if all_completed {
                (GoalStatus::Completed, EventKind::GoalCompleted)
            } else {
                (GoalStatus::Failed, EventKind::GoalFailed)
            };
            let goal = self.store.update_goal_status(goal_id, status).await?;
            self.events
                .append(goal_id, None, event, serde_json::json!({}))
                .await?;
            goal
        };

        Ok(build_report(&goal, &tasks))
    }

    async fn release_assignment(&self, task_id: Uuid) {
        let assignment = self.assignments.write().await.remove(&task_id);
        if let Some(assignment) = assignment {
            self.router.release(&assignment.agent_type).await;
        }
    }
}

fn build_report(goal: &Goal, tasks: &[Task]) -> GoalReport {
    let completed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    #[allow(clippy::cast_precision_loss)]
    let completion_pct = if tasks.is_empty() {
        100.0
    } else {
        completed as f64 / tasks.len() as f64 * 100.0
    };

    GoalReport {
        goal_id: goal.id,
        status: goal.status,
        total_retries: tasks.iter().map(|t| t.retry_count).sum(),
        completion_pct,
        tasks: tasks
            .iter()
            .map(|t| TaskReport {
                task_id: t.id,
                description: t.description.clone(),
                status: t.status,
                assigned_agent: t.assigned_agent.clone(),
                retry_count: t.retry_count,
                error: t.error.clone(),
            })
            .collect(),
    }
}

/// Failure reason for a blocked verdict: the offending screener kinds
/// followed by the finding tags.
fn block_error(verdict: &crate::domain::models::SafetyVerdict) -> String {
    let mut parts: Vec<String> = Vec::new();
    for finding in &verdict.findings {
        let kind = finding.kind.as_str().to_string();
        if !parts.contains(&kind) {
            parts.push(kind);
        }
    }
    for tag in verdict.tags() {
        if !parts.contains(&tag) {
            parts.push(tag);
        }
    }
    format!("safety_block:{}", parts.join(","))
}

fn metadata_str(task: &Task, key: &str) -> Option<String> {
    task.metadata
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
}

fn metadata_str_list(task: &Task, key: &str) -> Vec<String> {
    task.metadata
        .get(key)
        .and_then(serde_json::Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}
