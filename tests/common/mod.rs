//! Shared test harness: in-memory stack with scripted worker/decomposer.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use foreman::adapters::sqlite::{
    create_migrated_memory_pool, SqliteEventRepository, SqliteGoalRepository,
    SqliteTaskRepository,
};
use foreman::domain::errors::{CoreError, CoreResult};
use foreman::domain::models::{PolicyEntry, PolicyTable, SafetyConfig, SchedulerConfig};
use foreman::domain::ports::{CancelSignal, Decomposer, SubtaskSpec, WorkerAgent};
use foreman::services::{
    AgentCoordinator, AgentRouter, CircuitBreaker, EventLog, PlannerOrchestrator,
    PolicyService, PriorityCalculator, SafetyPipeline, TaskStore,
};

pub type Store = TaskStore<SqliteGoalRepository, SqliteTaskRepository>;
pub type Events = EventLog<SqliteEventRepository>;
pub type Coordinator =
    AgentCoordinator<SqliteGoalRepository, SqliteTaskRepository, SqliteEventRepository>;
pub type Orchestrator =
    PlannerOrchestrator<SqliteGoalRepository, SqliteTaskRepository, SqliteEventRepository>;

/// One scripted worker behavior.
#[derive(Debug, Clone)]
pub enum Script {
    /// Return this payload after a short delay.
    Succeed(serde_json::Value),
    /// Fail with this error message.
    Fail(String),
    /// Sleep until cancelled (or for a long time).
    Hang,
}

/// Worker that plays scripts keyed by a substring of the prompt.
/// Unmatched prompts succeed with a trivial payload.
#[derive(Default)]
pub struct ScriptedWorker {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    invocations: Mutex<Vec<Uuid>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay_ms: u64,
}

impl ScriptedWorker {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            ..Self::default()
        }
    }

    /// Queue scripts for prompts containing `key`.
    pub async fn script(&self, key: &str, scripts: Vec<Script>) {
        self.scripts
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .extend(scripts);
    }

    /// Task ids of every invocation, in call order.
    pub async fn invocations(&self) -> Vec<Uuid> {
        self.invocations.lock().await.clone()
    }

    /// Highest number of concurrent invocations observed.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn next_script(&self, prompt: &str) -> Script {
        let mut scripts = self.scripts.lock().await;
        for (key, queue) in scripts.iter_mut() {
            if prompt.contains(key.as_str()) {
                if let Some(script) = queue.pop_front() {
                    return script;
                }
            }
        }
        Script::Succeed(serde_json::json!({"status": "ok"}))
    }
}

#[async_trait]
impl WorkerAgent for ScriptedWorker {
    async fn run(
        &self,
        prompt: &str,
        _goal_id: Uuid,
        task_id: Uuid,
        mut cancel: CancelSignal,
    ) -> CoreResult<serde_json::Value> {
        self.invocations.lock().await.push(task_id);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let script = self.next_script(prompt).await;
        let result = match script {
            Script::Succeed(value) => {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
                Ok(value)
            }
            Script::Fail(message) => {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
                Err(CoreError::Worker(message))
            }
            Script::Hang => {
                tokio::select! {
                    () = cancel.cancelled() => Err(CoreError::Worker("cancelled".to_string())),
                    () = tokio::time::sleep(Duration::from_secs(300)) => {
                        Err(CoreError::Worker("hang expired".to_string()))
                    }
                }
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Decomposer returning a fixed plan.
pub struct FixedDecomposer {
    specs: Vec<SubtaskSpec>,
}

impl FixedDecomposer {
    pub fn new(specs: Vec<SubtaskSpec>) -> Self {
        Self { specs }
    }
}

#[async_trait]
impl Decomposer for FixedDecomposer {
    async fn decompose(
        &self,
        _goal_description: &str,
        _goal_id: Uuid,
    ) -> CoreResult<Vec<SubtaskSpec>> {
        Ok(self.specs.clone())
    }
}

/// Fully wired in-memory stack.
#[allow(dead_code)]
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub coordinator: Arc<Coordinator>,
    pub store: Arc<Store>,
    pub events: Arc<Events>,
    pub router: Arc<AgentRouter>,
    pub worker: Arc<ScriptedWorker>,
}

/// Policy table with millisecond-scale backoff so retry tests run fast.
pub fn fast_policies() -> PolicyTable {
    let mut table = PolicyTable::default();
    table.entries.insert(
        "default".to_string(),
        PolicyEntry {
            timeout_secs: 5,
            retry_delay_ms: 10,
            ..PolicyEntry::default()
        },
    );
    table
}

pub async fn harness(specs: Vec<SubtaskSpec>) -> Harness {
    harness_with(SchedulerConfig::default(), fast_policies(), specs).await
}

pub async fn harness_with(
    config: SchedulerConfig,
    policies: PolicyTable,
    specs: Vec<SubtaskSpec>,
) -> Harness {
    let pool = create_migrated_memory_pool()
        .await
        .expect("failed to create test pool");

    let store = Arc::new(TaskStore::new(
        Arc::new(SqliteGoalRepository::new(pool.clone())),
        Arc::new(SqliteTaskRepository::new(pool.clone())),
    ));
    let events = Arc::new(EventLog::new(Arc::new(SqliteEventRepository::new(pool))));
    let router = Arc::new(AgentRouter::default());
    let pipeline =
        Arc::new(SafetyPipeline::new(&SafetyConfig::default()).expect("pipeline config"));
    let worker = Arc::new(ScriptedWorker::new(20));

    let coordinator = Arc::new(AgentCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&router),
        pipeline,
        Arc::clone(&events),
        PolicyService::new(policies),
        Arc::new(CircuitBreaker::new()),
        Arc::clone(&worker) as Arc<dyn WorkerAgent>,
        config.clone(),
    ));

    let orchestrator = Arc::new(
        PlannerOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&coordinator),
            Arc::clone(&events),
            Arc::clone(&router),
            Arc::new(FixedDecomposer::new(specs)),
            PriorityCalculator::default(),
            config,
        )
        .expect("orchestrator config"),
    );

    Harness {
        orchestrator,
        coordinator,
        store,
        events,
        router,
        worker,
    }
}
