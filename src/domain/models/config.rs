//! Core configuration model.
//!
//! All tunables live here: scheduler bounds, retry/timeout policy table,
//! safety pattern tables, thresholds, and reviewer tables. Defaults are
//! embedded so the engine runs with no config file; the loader in
//! `infrastructure::config` merges YAML and environment overrides on top.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the orchestration core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Scheduler bounds and thresholds
    pub scheduler: SchedulerConfig,
    /// Per-task-kind timeout/retry/circuit policies
    pub policies: PolicyTable,
    /// Safety pipeline pattern tables and thresholds
    pub safety: SafetyConfig,
    /// Task prioritization weights
    pub priority_weights: PriorityWeights,
    /// Database settings
    pub database: DatabaseConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Scheduler bounds and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum in-flight worker attempts per goal
    pub max_parallel: usize,
    /// Default max retries for tasks created without an explicit value
    pub default_max_retries: u32,
    /// Failed tasks at or above this priority raise an escalation event
    pub escalation_priority_threshold: i64,
    /// Tasks in progress longer than this are reported as stalled
    pub stalled_hours_threshold: i64,
    /// When a goal already has tasks, resume scheduling instead of
    /// re-decomposing
    pub auto_resume: bool,
    /// Reviewer tags notified when a failed task escalates
    pub escalation_reviewers: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 3,
            default_max_retries: 3,
            escalation_priority_threshold: 4,
            stalled_hours_threshold: 24,
            auto_resume: true,
            escalation_reviewers: strings(&["PESSIMIST", "CEO"]),
        }
    }
}

/// Timeout/retry/circuit-breaker parameters for one task kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyEntry {
    /// Per-attempt deadline in seconds
    pub timeout_secs: u64,
    /// Maximum retries for this kind
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub retry_delay_ms: u64,
    /// Whether the delay doubles per attempt
    pub exponential_backoff: bool,
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a half-open probe
    pub reset_secs: u64,
}

impl Default for PolicyEntry {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            max_retries: 3,
            retry_delay_ms: 1_000,
            exponential_backoff: true,
            failure_threshold: 5,
            reset_secs: 300,
        }
    }
}

/// Per-kind policy table. The `default` entry always exists and backs
/// every kind without an explicit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyTable {
    pub entries: HashMap<String, PolicyEntry>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        let mut entries = HashMap::new();
        entries.insert("default".to_string(), PolicyEntry::default());
        entries.insert(
            "research".to_string(),
            PolicyEntry {
                timeout_secs: 600,
                ..PolicyEntry::default()
            },
        );
        entries.insert(
            "build".to_string(),
            PolicyEntry {
                timeout_secs: 900,
                retry_delay_ms: 2_000,
                ..PolicyEntry::default()
            },
        );
        entries.insert(
            "review".to_string(),
            PolicyEntry {
                timeout_secs: 300,
                max_retries: 1,
                ..PolicyEntry::default()
            },
        );
        Self { entries }
    }
}

impl PolicyTable {
    /// Look up the policy for a task kind, falling back to `default`.
    pub fn for_kind(&self, kind: &str) -> PolicyEntry {
        self.entries
            .get(kind)
            .or_else(|| self.entries.get("default"))
            .cloned()
            .unwrap_or_default()
    }
}

/// Weights for the prioritization score. Must sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    /// Share for transitive dependent count
    pub dependents: f64,
    /// Share for the description-complexity heuristic
    pub complexity: f64,
    /// Share for assigned-agent availability
    pub availability: f64,
    /// Share for task age
    pub age: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            dependents: 0.4,
            complexity: 0.2,
            availability: 0.2,
            age: 0.2,
        }
    }
}

impl PriorityWeights {
    pub fn sum(&self) -> f64 {
        self.dependents + self.complexity + self.availability + self.age
    }
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database URL or path
    pub url: String,
    /// Connection pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://.foreman/foreman.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Output format: json or pretty
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// ============================================================================
// Safety configuration
// ============================================================================

/// Pattern tables, thresholds, and reviewer tables for the safety
/// pipeline. Every screener compiles its patterns from here once at
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub synthetic_identity: SyntheticIdentityConfig,
    pub prompt_injection: PromptInjectionConfig,
    pub domain_sensitivity: DomainSensitivityConfig,
    pub ip_violation: IpViolationConfig,
    pub output_policy: OutputPolicyConfig,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            synthetic_identity: SyntheticIdentityConfig::default(),
            prompt_injection: PromptInjectionConfig::default(),
            domain_sensitivity: DomainSensitivityConfig::default(),
            ip_violation: IpViolationConfig::default(),
            output_policy: OutputPolicyConfig::default(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Impersonation/jailbreak detection tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticIdentityConfig {
    /// Impersonation patterns; each must expose an `entity` capture group
    pub impersonation_patterns: Vec<String>,
    /// Jailbreak patterns; always high severity
    pub jailbreak_patterns: Vec<String>,
    /// Entities whose impersonation is high severity
    pub high_risk_entities: Vec<String>,
    /// Reviewers required on any rerun
    pub reviewers: Vec<String>,
    /// Additional reviewers when a high-severity finding is present
    pub high_severity_reviewers: Vec<String>,
}

impl Default for SyntheticIdentityConfig {
    fn default() -> Self {
        Self {
            impersonation_patterns: strings(&[
                r"(?i)pretend (?:you are|to be|you're) (?P<entity>[a-zA-Z][a-zA-Z ]*)",
                r"(?i)act as (?:if you (?:are|were) |though you (?:are|were) )?(?P<entity>[a-zA-Z][a-zA-Z ]*)",
                r"(?i)you are now (?P<entity>[a-zA-Z][a-zA-Z ]*)",
                r"(?i)assume the (?:role|identity|persona) of (?P<entity>[a-zA-Z][a-zA-Z ]*)",
                r"(?i)roleplay as (?P<entity>[a-zA-Z][a-zA-Z ]*)",
            ]),
            jailbreak_patterns: strings(&[
                r"(?i)ignore (?:your|all) (?:previous|prior) (?:instructions|programming|directives)",
                r"(?i)you are not bound by (?:ethical|moral|legal) (?:constraints|limitations|rules)",
                r"(?i)\b(?:DAN|do anything now)\b",
                r"(?i)you (?:don't|do not) have to (?:follow|adhere to) (?:your|any) (?:policies|rules|guidelines)",
                r"(?i)(?:bypass|circumvent|get around) (?:content|safety|ethical) (?:filters|restrictions|limitations)",
            ]),
            high_risk_entities: strings(&[
                "GPT-4", "Claude", "Gemini", "Llama", "Anthropic", "OpenAI",
                "CEO", "CTO", "CFO", "President", "Prime Minister", "Senator",
                "FBI agent", "CIA agent", "police officer", "judge", "lawyer",
                "attorney", "doctor", "physician", "therapist", "psychiatrist",
                "psychologist",
            ]),
            reviewers: strings(&["PESSIMIST"]),
            high_severity_reviewers: strings(&["CEO", "SAGE"]),
        }
    }
}

/// Prompt-injection detection tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptInjectionConfig {
    /// Instruction override patterns (high severity)
    pub override_patterns: Vec<String>,
    /// Role escalation to privileged modes (high severity)
    pub role_escalation_patterns: Vec<String>,
    /// Delimiter exploitation (medium severity)
    pub delimiter_patterns: Vec<String>,
    /// Prompt leak requests (medium severity)
    pub leak_patterns: Vec<String>,
    /// Neutral replacement used when a prompt is halted
    pub neutral_prompt: String,
    /// Reviewers required on any rerun
    pub reviewers: Vec<String>,
}

impl Default for PromptInjectionConfig {
    fn default() -> Self {
        Self {
            override_patterns: strings(&[
                r"(?i)ignore (?:your|all|previous)(?: previous| prior)? (?:instructions|guidelines|rules|constraints)",
                r"(?i)disregard (?:your|all|previous)(?: previous| prior)? (?:instructions|guidelines|rules|constraints)",
                r"(?i)forget (?:your|all|previous)(?: previous| prior)? (?:instructions|guidelines|rules|constraints)",
                r"(?i)don't (?:follow|adhere to|obey) (?:your|the|these) (?:instructions|guidelines|rules|constraints)",
                r"(?i)bypass (?:your|the|these) (?:instructions|guidelines|rules|constraints)",
            ]),
            role_escalation_patterns: strings(&[
                r"(?i)you are now (?:in|operating in) (?:developer|debug|test|admin|root|sudo) mode",
                r"(?i)(?:enter|switch to|activate) (?:developer|debug|test|admin|root|sudo) mode",
                r"(?i)use (?:developer|debug|test|admin|root|sudo) (?:access|privileges|permissions)",
            ]),
            delimiter_patterns: strings(&[
                r"(?i)<(?:system|user|assistant)>",
                r"(?i)\[(?:system|user|assistant)\]",
                r"(?:System|User|Assistant): ",
                r"(?i)```(?:system|user|assistant)",
            ]),
            leak_patterns: strings(&[
                r"(?i)repeat (?:this|the following|everything) (?:verbatim|exactly|precisely|word for word)",
                r"(?i)repeat after me",
                r"(?i)echo (?:this|the following|everything) (?:back|to me)",
                r"(?i)(?:print|copy) (?:this|the following|everything) (?:exactly|precisely|verbatim)",
                r"(?i)(?:output|reveal|show) (?:your|the) (?:system|initial) (?:message|prompt)",
            ]),
            neutral_prompt: "I need information about this topic.".to_string(),
            reviewers: strings(&["PESSIMIST", "SAGE"]),
        }
    }
}

/// Sensitive-domain detection tables and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainSensitivityConfig {
    /// Per-domain term patterns
    pub domains: Vec<DomainPatterns>,
}

/// One sensitive domain: its term patterns, base sensitivity score,
/// inclusion threshold, and required reviewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainPatterns {
    pub name: String,
    pub patterns: Vec<String>,
    /// Score attached to each match
    pub sensitivity: f64,
    /// Minimum max-score for the domain to appear in findings
    pub threshold: f64,
    pub reviewers: Vec<String>,
}

impl Default for DomainSensitivityConfig {
    fn default() -> Self {
        Self {
            domains: vec![
                DomainPatterns {
                    name: "medical".to_string(),
                    patterns: strings(&[
                        r"(?i)\b(?:diagnos(?:is|e|ing)|treatment|symptom|disease|illness|patient|medical advice)\b",
                        r"(?i)\b(?:prescription|medication|dosage|surgery|vaccine)\b",
                        r"(?i)\b(?:cancer|diabetes|heart disease|stroke|dementia)\b",
                        r"(?i)\b(?:blood test|x-ray|MRI|CT scan|ultrasound|biopsy)\b",
                    ]),
                    sensitivity: 0.8,
                    threshold: 0.7,
                    reviewers: strings(&["RESEARCHER", "CEO"]),
                },
                DomainPatterns {
                    name: "legal".to_string(),
                    patterns: strings(&[
                        r"(?i)\b(?:legal advice|lawsuit|litigation|court case|settlement)\b",
                        r"(?i)\b(?:attorney|lawyer|plaintiff|defendant|testimony)\b",
                        r"(?i)\b(?:liability|damages|infringement)\b",
                        r"(?i)\b(?:divorce|custody|estate|inheritance|probate)\b",
                    ]),
                    sensitivity: 0.8,
                    threshold: 0.7,
                    reviewers: strings(&["RESEARCHER", "CEO"]),
                },
                DomainPatterns {
                    name: "financial".to_string(),
                    patterns: strings(&[
                        r"(?i)\b(?:investment advice|mutual fund|portfolio|asset allocation)\b",
                        r"(?i)\b(?:mortgage|refinance|interest rate|APR)\b",
                        r"(?i)\b(?:tax deduction|write-off|IRS|audit)\b",
                        r"(?i)\b(?:retirement|401k|IRA|pension|annuity)\b",
                    ]),
                    sensitivity: 0.8,
                    threshold: 0.7,
                    reviewers: strings(&["RESEARCHER", "CEO"]),
                },
                DomainPatterns {
                    name: "mental_health".to_string(),
                    patterns: strings(&[
                        r"(?i)\b(?:therapy|counseling|psychologist|psychiatrist|therapist)\b",
                        r"(?i)\b(?:depression|anxiety|bipolar|schizophrenia|PTSD|trauma)\b",
                        r"(?i)\b(?:suicide|self-harm|mental health emergency)\b",
                        r"(?i)\b(?:antidepressant|antipsychotic)\b",
                    ]),
                    sensitivity: 0.9,
                    threshold: 0.8,
                    reviewers: strings(&["RESEARCHER", "CEO", "PESSIMIST"]),
                },
                DomainPatterns {
                    name: "political".to_string(),
                    patterns: strings(&[
                        r"(?i)\b(?:election|voting|ballot|campaign|candidate|political party)\b",
                        r"(?i)\b(?:democrat|republican|liberal|conservative|progressive)\b",
                        r"(?i)\b(?:legislation|regulation|amendment)\b",
                        r"(?i)\b(?:political opinion|ideology)\b",
                    ]),
                    sensitivity: 0.8,
                    threshold: 0.6,
                    reviewers: strings(&["PESSIMIST", "SAGE", "CEO"]),
                },
            ],
        }
    }
}

/// Intellectual-property violation detection tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpViolationConfig {
    pub copyright_patterns: Vec<String>,
    pub trademark_patterns: Vec<String>,
    pub proprietary_patterns: Vec<String>,
    /// Well-known brands/works whose co-occurrence raises severity
    pub high_risk_entities: Vec<String>,
    /// Score for a match without a high-risk entity nearby
    pub base_score: f64,
    /// Score when a high-risk entity co-occurs
    pub high_risk_score: f64,
    /// Score at or above which the pipeline blocks
    pub block_threshold: f64,
    pub reviewers: Vec<String>,
}

impl Default for IpViolationConfig {
    fn default() -> Self {
        Self {
            copyright_patterns: strings(&[
                r"(?i)(?:full text of|entire|complete) [a-zA-Z0-9' ]+ by [a-zA-Z0-9. ]+",
                r"(?i)(?:lyrics|words) (?:to|of|from) [a-zA-Z0-9'\x22 ]+ by [a-zA-Z0-9. ]+",
                r"(?i)(?:transcript|script|screenplay) (?:of|from) [a-zA-Z0-9'\x22 ]+",
                r"(?i)copyright \d{4} [a-zA-Z0-9 ]+",
                r"(?i)all rights reserved",
            ]),
            trademark_patterns: strings(&[
                r"[™®]",
                r"(?i)trademark (?:of|owned by) [a-zA-Z0-9 ]+",
                r"(?i)registered trademark",
                r"(?i)brand (?:name|identity|logo) (?:of|for) [a-zA-Z0-9 ]+",
            ]),
            proprietary_patterns: strings(&[
                r"(?i)(?:proprietary|internal|confidential) (?:code|algorithm|implementation)",
                r"(?i)(?:leaked|stolen|cracked) (?:code|software|program)",
                r"(?i)(?:API key|access token|secret key)",
                r"(?i)(?:confidential|proprietary|trade secret) (?:document|specification|design)",
            ]),
            high_risk_entities: strings(&[
                "Microsoft", "Windows", "Apple", "iOS", "iPhone", "Google",
                "Android", "Amazon", "Netflix", "Disney", "Spotify", "Adobe",
                "Photoshop", "Oracle", "Harry Potter", "Star Wars", "Marvel",
                "Game of Thrones", "Beatles", "Taylor Swift",
            ]),
            base_score: 0.5,
            high_risk_score: 0.8,
            block_threshold: 0.7,
            reviewers: strings(&["RESEARCHER", "CEO"]),
        }
    }
}

/// Per-category warn/block thresholds for the output-policy screener.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CategoryThresholds {
    pub warn: f64,
    pub block: f64,
}

/// One output-policy category: its blocklist patterns and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputCategory {
    pub name: String,
    pub patterns: Vec<String>,
    pub thresholds: CategoryThresholds,
}

/// One language-specific code-safety pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSafetyPattern {
    pub language: String,
    pub pattern: String,
    pub risk: f64,
}

/// Output-policy screener tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPolicyConfig {
    pub categories: Vec<OutputCategory>,
    pub code_safety: Vec<CodeSafetyPattern>,
    /// Risk attached to a blocklist pattern match
    pub pattern_risk: f64,
    pub reviewers: Vec<String>,
}

impl Default for OutputPolicyConfig {
    fn default() -> Self {
        Self {
            categories: vec![
                OutputCategory {
                    name: "harmful".to_string(),
                    patterns: strings(&[
                        r"(?i)how\s+to\s+make\s+(?:a\s+)?(?:bomb|explosive)",
                        r"(?i)instructions\s+for\s+(?:hacking|attacking)",
                        r"(?i)methods\s+to\s+(?:harm|injure|kill)",
                    ]),
                    thresholds: CategoryThresholds { warn: 0.5, block: 0.8 },
                },
                OutputCategory {
                    name: "inappropriate".to_string(),
                    patterns: strings(&[
                        r"(?i)explicit\s+(?:sexual|adult)",
                        r"(?i)nsfw\s+content",
                        r"(?i)obscene\s+(?:language|content)",
                    ]),
                    thresholds: CategoryThresholds { warn: 0.6, block: 0.85 },
                },
                OutputCategory {
                    name: "misinformation".to_string(),
                    patterns: strings(&[
                        r"(?i)proven\s+false",
                        r"(?i)debunked\s+claim",
                        r"(?i)misleading\s+information",
                    ]),
                    thresholds: CategoryThresholds { warn: 0.7, block: 0.9 },
                },
                OutputCategory {
                    name: "malicious_code".to_string(),
                    patterns: strings(&[
                        r#"(?i)system\(['"](?:rm|del)"#,
                        r"(?i)exec\s*\(\s*(?:input|raw_input)",
                        r"(?i)eval\s*\(\s*(?:input|raw_input)",
                        r#"(?i)os\.system\s*\(\s*['"](?:rm|del)"#,
                        r#"(?i)subprocess\.(?:call|run|Popen)\s*\(\s*['"](?:rm|del)"#,
                        r"(?i)document\.cookie",
                    ]),
                    thresholds: CategoryThresholds { warn: 0.4, block: 0.7 },
                },
                OutputCategory {
                    name: "plagiarism".to_string(),
                    patterns: strings(&[
                        r"(?i)copied\s+from",
                        r"(?i)plagiarized\s+content",
                        r"(?i)without\s+attribution",
                    ]),
                    thresholds: CategoryThresholds { warn: 0.8, block: 0.95 },
                },
            ],
            code_safety: vec![
                CodeSafetyPattern {
                    language: "python".to_string(),
                    pattern: r"(?i)\beval\s*\(".to_string(),
                    risk: 0.5,
                },
                CodeSafetyPattern {
                    language: "python".to_string(),
                    pattern: r"(?i)\bexec\s*\(".to_string(),
                    risk: 0.5,
                },
                CodeSafetyPattern {
                    language: "python".to_string(),
                    pattern: r"(?i)os\.system\s*\(".to_string(),
                    risk: 0.6,
                },
                CodeSafetyPattern {
                    language: "javascript".to_string(),
                    pattern: r"(?i)\beval\s*\(".to_string(),
                    risk: 0.5,
                },
                CodeSafetyPattern {
                    language: "javascript".to_string(),
                    pattern: r"(?i)document\.write\s*\(".to_string(),
                    risk: 0.45,
                },
                CodeSafetyPattern {
                    language: "javascript".to_string(),
                    pattern: r#"(?i)setTimeout\s*\(\s*['"]"#.to_string(),
                    risk: 0.5,
                },
                CodeSafetyPattern {
                    language: "sql".to_string(),
                    pattern: r"(?i)'\s*or\s+'?1'?\s*=\s*'?1".to_string(),
                    risk: 0.8,
                },
            ],
            pattern_risk: 0.9,
            reviewers: strings(&["PESSIMIST", "CEO"]),
        }
    }
}
