//! Routes tasks to worker-agent types.
//!
//! Scores every known agent profile against a task description and
//! requirements; the highest score wins, ties break by profile insertion
//! order. The router owns the per-agent in-flight workload counters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::errors::{CoreError, CoreResult};

/// Score ceiling used to normalize confidence into `0.0..=1.0`.
const MAX_POSSIBLE_SCORE: f64 = 5.0;

/// One capability of an agent profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapability {
    pub name: String,
    /// Confidence in `0.0..=1.0`
    pub confidence: f64,
}

impl AgentCapability {
    pub fn new(name: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            confidence,
        }
    }
}

/// Profile of one routable agent type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_type: String,
    pub capabilities: Vec<AgentCapability>,
    pub specialties: Vec<String>,
}

impl AgentProfile {
    pub fn new(agent_type: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            capabilities: Vec::new(),
            specialties: Vec::new(),
        }
    }

    pub fn capability(mut self, name: impl Into<String>, confidence: f64) -> Self {
        self.capabilities.push(AgentCapability::new(name, confidence));
        self
    }

    pub fn specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialties.push(specialty.into());
        self
    }
}

/// A routing request for one task.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    /// Task description scanned for specialty/capability keywords
    pub description: String,
    /// Task type matched against profile specialties
    pub task_type: Option<String>,
    /// Capabilities the task requires
    pub required_capabilities: Vec<String>,
    /// Short-circuits scoring when it names a known profile
    pub preferred_agent: Option<String>,
}

impl RouteRequest {
    pub fn for_description(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }
}

/// The router's decision for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub assigned_agent: String,
    /// Normalized score in `0.0..=1.0`
    pub confidence: f64,
    /// Human-readable scoring breakdown
    pub reason: Vec<String>,
}

/// Default profile catalog: builder, researcher, planner, ops, memory.
pub fn default_profiles() -> Vec<AgentProfile> {
    vec![
        AgentProfile::new("builder")
            .capability("code_generation", 0.9)
            .capability("debugging", 0.85)
            .capability("refactoring", 0.8)
            .capability("architecture_design", 0.75)
            .specialty("development")
            .specialty("implementation")
            .specialty("coding"),
        AgentProfile::new("researcher")
            .capability("information_gathering", 0.95)
            .capability("data_analysis", 0.85)
            .capability("competitive_analysis", 0.8)
            .capability("trend_identification", 0.75)
            .specialty("research")
            .specialty("analysis")
            .specialty("investigation"),
        AgentProfile::new("planner")
            .capability("task_decomposition", 0.9)
            .capability("dependency_management", 0.85)
            .capability("resource_allocation", 0.8)
            .capability("risk_assessment", 0.75)
            .specialty("planning")
            .specialty("coordination")
            .specialty("strategy"),
        AgentProfile::new("ops")
            .capability("deployment", 0.9)
            .capability("monitoring", 0.85)
            .capability("infrastructure_management", 0.8)
            .capability("performance_optimization", 0.75)
            .specialty("operations")
            .specialty("deployment")
            .specialty("infrastructure"),
        AgentProfile::new("memory")
            .capability("information_retrieval", 0.95)
            .capability("context_management", 0.9)
            .capability("knowledge_organization", 0.85)
            .capability("pattern_recognition", 0.8)
            .specialty("retrieval")
            .specialty("storage")
            .specialty("context"),
    ]
}

/// Scores candidate agents against tasks and tracks their workload.
pub struct AgentRouter {
    // Insertion order is the tie-break, so profiles live in a Vec.
    profiles: Vec<AgentProfile>,
    workload: RwLock<HashMap<String, u32>>,
}

impl Default for AgentRouter {
    fn default() -> Self {
        Self::new(default_profiles())
    }
}

impl AgentRouter {
    pub fn new(profiles: Vec<AgentProfile>) -> Self {
        let workload = profiles
            .iter()
            .map(|p| (p.agent_type.clone(), 0))
            .collect();
        Self {
            profiles,
            workload: RwLock::new(workload),
        }
    }

    /// Route a task to the most appropriate agent type and increment
    /// that agent's in-flight workload counter.
    pub async fn route(&self, request: &RouteRequest) -> CoreResult<RouteDecision> {
        if self.profiles.is_empty() {
            return Err(CoreError::Configuration(
                "agent router has no profiles".to_string(),
            ));
        }

        let preferred = request
            .preferred_agent
            .as_ref()
            .filter(|name| self.profiles.iter().any(|p| p.agent_type == **name));

        let decision = if let Some(preferred) = preferred {
            RouteDecision {
                assigned_agent: preferred.clone(),
                confidence: 1.0,
                reason: vec!["Explicitly requested agent".to_string()],
            }
        } else {
            self.find_best_agent(request).await.ok_or_else(|| {
                CoreError::Configuration("agent router has no profiles".to_string())
            })?
        };

        let mut workload = self.workload.write().await;
        *workload.entry(decision.assigned_agent.clone()).or_insert(0) += 1;

        tracing::debug!(
            agent = %decision.assigned_agent,
            confidence = decision.confidence,
            "Task routed"
        );
        Ok(decision)
    }

    async fn find_best_agent(&self, request: &RouteRequest) -> Option<RouteDecision> {
        let workload = self.workload.read().await;
        let description = request.description.to_lowercase();

        let mut best: Option<(f64, &AgentProfile, Vec<String>)> = None;

        for profile in &self.profiles {
            let mut score = 0.0;
            let mut reasons = Vec::new();

            if let Some(task_type) = &request.task_type {
                if profile
                    .specialties
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(task_type))
                {
                    score += 2.0;
                    reasons.push(format!("Specializes in {task_type}"));
                }
            }

            for required in &request.required_capabilities {
                if let Some(capability) = profile
                    .capabilities
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(required))
                {
                    score += capability.confidence;
                    reasons.push(format!(
                        "Has capability: {} ({:.2})",
                        required, capability.confidence
                    ));
                }
            }

            for specialty in &profile.specialties {
                if description.contains(&specialty.to_lowercase()) {
                    score += 1.0;
                    reasons.push(format!("Task mentions specialty: {specialty}"));
                }
            }
            for capability in &profile.capabilities {
                if description.contains(&capability.name.to_lowercase()) {
                    score += 0.5;
                    reasons.push(format!("Task mentions capability: {}", capability.name));
                }
            }

            let in_flight = workload.get(&profile.agent_type).copied().unwrap_or(0);
            let penalty = (f64::from(in_flight) * 0.1).min(0.5);
            if penalty > 0.0 {
                score -= penalty;
                reasons.push(format!("Workload penalty: -{penalty:.2}"));
            }

            // Strict comparison keeps the earliest profile on ties.
            let is_better = best.as_ref().is_none_or(|(best_score, _, _)| score > *best_score);
            if is_better {
                best = Some((score, profile, reasons));
            }
        }

        best.map(|(score, profile, reasons)| RouteDecision {
            assigned_agent: profile.agent_type.clone(),
            confidence: (score / MAX_POSSIBLE_SCORE).clamp(0.0, 1.0),
            reason: reasons,
        })
    }

    /// Decrement an agent's workload after its task reached a terminal
    /// state. Counters never go negative.
    pub async fn release(&self, agent_type: &str) {
        let mut workload = self.workload.write().await;
        if let Some(count) = workload.get_mut(agent_type) {
            *count = count.saturating_sub(1);
        }
    }

    /// Current in-flight count for an agent type.
    pub async fn workload_of(&self, agent_type: &str) -> u32 {
        self.workload
            .read()
            .await
            .get(agent_type)
            .copied()
            .unwrap_or(0)
    }

    /// Availability in `0.0..=1.0`: 1.0 when idle, falling to 0.0 at
    /// five or more in-flight tasks.
    pub async fn availability_of(&self, agent_type: &str) -> f64 {
        let in_flight = self.workload_of(agent_type).await;
        1.0 - (f64::from(in_flight) / 5.0).min(1.0)
    }

    pub fn profiles(&self) -> &[AgentProfile] {
        &self.profiles
    }
}
