//! Safety value objects.
//!
//! Findings and verdicts are immutable once produced; they travel on
//! events and inside task failure reasons.

use serde::{Deserialize, Serialize};

/// Which screener produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    SyntheticIdentity,
    PromptInjection,
    DomainSensitivity,
    IpViolation,
    OutputPolicy,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyntheticIdentity => "synthetic_identity",
            Self::PromptInjection => "prompt_injection",
            Self::DomainSensitivity => "domain_sensitivity",
            Self::IpViolation => "ip_violation",
            Self::OutputPolicy => "output_policy",
        }
    }
}

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A matched portion of the screened text, as byte offsets into the
/// original input regardless of later replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedSpan {
    /// Byte offset of the match start
    pub offset: usize,
    /// Byte length of the match
    pub len: usize,
    /// The matched text
    pub snippet: String,
}

impl MatchedSpan {
    pub fn new(offset: usize, snippet: impl Into<String>) -> Self {
        let snippet = snippet.into();
        Self {
            offset,
            len: snippet.len(),
            snippet,
        }
    }
}

/// A single risk detection produced by one screener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyFinding {
    /// Which screener family produced this
    pub kind: FindingKind,
    /// Severity assigned by the pattern family
    pub severity: Severity,
    /// Short identifiers, e.g. `jailbreak`, `impersonation`
    pub tags: Vec<String>,
    /// Portions of the input that triggered the finding
    pub matched_spans: Vec<MatchedSpan>,
    /// Risk score in `0.0..=1.0` where applicable
    pub score: Option<f64>,
}

impl SafetyFinding {
    pub fn new(kind: FindingKind, severity: Severity) -> Self {
        Self {
            kind,
            severity,
            tags: Vec::new(),
            matched_spans: Vec::new(),
            score: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn with_span(mut self, span: MatchedSpan) -> Self {
        self.matched_spans.push(span);
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score.clamp(0.0, 1.0));
        self
    }
}

/// Aggregated decision of the safety pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictAction {
    /// No findings; text passes untouched
    Allow,
    /// Findings present; text passes with spans removed where applicable
    Warn,
    /// Output modified (redaction or disclaimer)
    Rewrite,
    /// Text must not reach the worker / be stored as-is
    Block,
}

impl VerdictAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Warn => "warn",
            Self::Rewrite => "rewrite",
            Self::Block => "block",
        }
    }
}

/// Structured request to re-execute with specific reviewers and deeper
/// analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerunDirective {
    /// Requested analysis depth
    pub depth: u32,
    /// Reviewer tags that must be notified
    pub required_reviewers: Vec<String>,
    /// Why the rerun is requested
    pub reason: String,
    /// Which screener families triggered it
    pub triggers: Vec<String>,
}

/// Combined decision of the safety pipeline across its screeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    /// What the caller must do with the text
    pub action: VerdictAction,
    /// Text potentially modified from the input
    pub sanitized_text: String,
    /// All findings, in screener order
    pub findings: Vec<SafetyFinding>,
    /// Union of reviewer tags demanded by the findings
    pub required_reviewers: Vec<String>,
    /// Present when the verdict demands a rerun
    pub rerun: Option<RerunDirective>,
}

impl SafetyVerdict {
    /// An `allow` verdict that passes the input through untouched.
    pub fn allow(text: impl Into<String>) -> Self {
        Self {
            action: VerdictAction::Allow,
            sanitized_text: text.into(),
            findings: Vec::new(),
            required_reviewers: Vec::new(),
            rerun: None,
        }
    }

    /// Deduplicated tags across every finding, in first-seen order.
    pub fn tags(&self) -> Vec<String> {
        let mut tags = Vec::new();
        for finding in &self.findings {
            for tag in &finding.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }
        tags
    }

    pub fn is_blocked(&self) -> bool {
        self.action == VerdictAction::Block
    }
}
