//! Service layer: the orchestration core's subsystems.

pub mod agent_coordinator;
pub mod agent_router;
pub mod circuit_breaker;
pub mod dependency_resolver;
pub mod event_log;
pub mod orchestrator;
pub mod policy;
pub mod priority_calculator;
pub mod safety;
pub mod task_store;

pub use agent_coordinator::{
    AgentCoordinator, AttemptOutcome, GoalReport, TaskProgress, TaskReport,
};
pub use agent_router::{
    default_profiles, AgentCapability, AgentProfile, AgentRouter, RouteDecision, RouteRequest,
};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use dependency_resolver::DependencyResolver;
pub use event_log::EventLog;
pub use orchestrator::PlannerOrchestrator;
pub use policy::PolicyService;
pub use priority_calculator::{PriorityCalculator, TaskPriorityScore};
pub use safety::{SafetyCheck, SafetyPipeline};
pub use task_store::{GoalProgress, TaskStore};
