//! Domain models for the foreman orchestration core.

pub mod assignment;
pub mod config;
pub mod event;
pub mod goal;
pub mod safety;
pub mod task;

pub use assignment::{Assignment, AssignmentStatus};
pub use config::{
    CategoryThresholds, CodeSafetyPattern, CoreConfig, DatabaseConfig, DomainPatterns,
    DomainSensitivityConfig, IpViolationConfig, LoggingConfig, OutputCategory,
    OutputPolicyConfig, PolicyEntry, PolicyTable, PriorityWeights, PromptInjectionConfig,
    SafetyConfig, SchedulerConfig, SyntheticIdentityConfig,
};
pub use event::{EventKind, EventRecord};
pub use goal::{Goal, GoalStatus};
pub use safety::{
    FindingKind, MatchedSpan, RerunDirective, SafetyFinding, SafetyVerdict, Severity,
    VerdictAction,
};
pub use task::{Task, TaskStatus, KIND_KEY, MAX_PRIORITY};
