//! Project initialization and engine composition.
//!
//! Embedders call [`init_project`] once to scaffold `.foreman/` with a
//! commented config template, then [`Engine::build`] to wire the full
//! stack (pool, repositories, services, orchestrator) from a
//! [`CoreConfig`] plus their worker and decomposer implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::adapters::sqlite::{
    create_pool, embedded_migrations, Migrator, PoolConfig, SqliteEventRepository,
    SqliteGoalRepository, SqliteTaskRepository,
};
use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::CoreConfig;
use crate::domain::ports::{Decomposer, WorkerAgent};
use crate::services::{
    AgentCoordinator, AgentRouter, CircuitBreaker, EventLog, PlannerOrchestrator,
    PolicyService, PriorityCalculator, SafetyPipeline, TaskStore,
};

/// Default configuration template content.
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Foreman Configuration
# Override settings by editing this file or setting environment variables
# with FOREMAN_ prefix
#
# Example environment variables:
#   export FOREMAN_SCHEDULER__MAX_PARALLEL=5
#   export FOREMAN_SCHEDULER__DEFAULT_MAX_RETRIES=2
#   export FOREMAN_DATABASE__URL=sqlite://custom/path/foreman.db
#   export FOREMAN_LOGGING__LEVEL=debug

scheduler:
  # Maximum in-flight worker attempts per goal
  max_parallel: 3

  # Default retry budget for tasks created without one
  default_max_retries: 3

  # Failed tasks at or above this priority raise an escalation event
  escalation_priority_threshold: 4

  # Tasks in progress longer than this many hours count as stalled
  stalled_hours_threshold: 24

database:
  # SQLite database URL (project-local)
  url: "sqlite://.foreman/foreman.db"
  max_connections: 5

logging:
  # Log level: trace, debug, info, warn, error
  level: "info"

  # Log format: json, pretty
  format: "pretty"
"#;

/// Create the `.foreman/` directory with a default config template.
/// Existing files are left untouched.
pub fn init_project(root: impl AsRef<Path>) -> Result<()> {
    let dir = root.as_ref().join(".foreman");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let config_path = dir.join("config.yaml");
    if !config_path.exists() {
        std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        tracing::info!(path = %config_path.display(), "Wrote default config");
    }

    Ok(())
}

/// Repository type aliases for the SQLite-backed engine.
pub type SqliteTaskStore = TaskStore<SqliteGoalRepository, SqliteTaskRepository>;
pub type SqliteEventLog = EventLog<SqliteEventRepository>;
pub type SqliteCoordinator =
    AgentCoordinator<SqliteGoalRepository, SqliteTaskRepository, SqliteEventRepository>;
pub type SqliteOrchestrator =
    PlannerOrchestrator<SqliteGoalRepository, SqliteTaskRepository, SqliteEventRepository>;

/// A fully wired orchestration engine over SQLite persistence.
pub struct Engine {
    pub orchestrator: Arc<SqliteOrchestrator>,
    pub coordinator: Arc<SqliteCoordinator>,
    pub store: Arc<SqliteTaskStore>,
    pub events: Arc<SqliteEventLog>,
    pub router: Arc<AgentRouter>,
    pub pipeline: Arc<SafetyPipeline>,
}

impl Engine {
    /// Wire the engine from configuration and the two embedder-supplied
    /// contracts. Runs migrations against the configured database.
    pub async fn build(
        config: &CoreConfig,
        worker: Arc<dyn WorkerAgent>,
        decomposer: Arc<dyn Decomposer>,
    ) -> CoreResult<Self> {
        let pool = create_pool(
            &config.database.url,
            Some(PoolConfig {
                max_connections: config.database.max_connections,
                ..PoolConfig::default()
            }),
        )
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;

        Migrator::new(pool.clone())
            .run_embedded_migrations(embedded_migrations())
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;

        let store = Arc::new(TaskStore::new(
            Arc::new(SqliteGoalRepository::new(pool.clone())),
            Arc::new(SqliteTaskRepository::new(pool.clone())),
        ));
        let events = Arc::new(EventLog::new(Arc::new(SqliteEventRepository::new(pool))));
        let router = Arc::new(AgentRouter::default());
        let pipeline = Arc::new(SafetyPipeline::new(&config.safety)?);

        let coordinator = Arc::new(AgentCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&router),
            Arc::clone(&pipeline),
            Arc::clone(&events),
            PolicyService::new(config.policies.clone()),
            Arc::new(CircuitBreaker::new()),
            worker,
            config.scheduler.clone(),
        ));

        let orchestrator = Arc::new(PlannerOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&coordinator),
            Arc::clone(&events),
            Arc::clone(&router),
            decomposer,
            PriorityCalculator::new(config.priority_weights.clone()),
            config.scheduler.clone(),
        )?);

        Ok(Self {
            orchestrator,
            coordinator,
            store,
            events,
            router,
            pipeline,
        })
    }
}
