//! Prompt-injection detection and sanitation.
//!
//! Four pattern families: instruction override and role escalation to
//! privileged modes (high severity), delimiter exploitation and
//! prompt-leak requests (medium severity). Any high-severity finding
//! halts the prompt entirely; medium findings only strip the offending
//! spans.

use regex::Regex;

use crate::domain::errors::CoreResult;
use crate::domain::models::{
    FindingKind, MatchedSpan, PromptInjectionConfig, SafetyFinding, Severity,
};

use super::{collapse_whitespace, compile_patterns, prune_span_duplicates, replace_snippets};

/// What sanitation did to the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionAction {
    /// No findings
    Allow,
    /// Medium findings; spans deleted
    Warn,
    /// High finding; entire prompt replaced with a neutral query
    Halt,
}

pub struct PromptInjectionScreener {
    families: Vec<(Vec<Regex>, &'static str, Severity)>,
    neutral_prompt: String,
}

impl PromptInjectionScreener {
    pub fn new(config: &PromptInjectionConfig) -> CoreResult<Self> {
        let families = vec![
            (
                compile_patterns(&config.override_patterns)?,
                "instruction_override",
                Severity::High,
            ),
            (
                compile_patterns(&config.role_escalation_patterns)?,
                "role_escalation",
                Severity::High,
            ),
            (
                compile_patterns(&config.delimiter_patterns)?,
                "delimiter_exploitation",
                Severity::Medium,
            ),
            (
                compile_patterns(&config.leak_patterns)?,
                "prompt_leak",
                Severity::Medium,
            ),
        ];
        Ok(Self {
            families,
            neutral_prompt: config.neutral_prompt.clone(),
        })
    }

    /// Screen a prompt for injection attempts.
    pub fn screen(&self, text: &str) -> Vec<SafetyFinding> {
        let mut findings = Vec::new();
        for (patterns, tag, severity) in &self.families {
            for pattern in patterns {
                for m in pattern.find_iter(text) {
                    findings.push(
                        SafetyFinding::new(FindingKind::PromptInjection, *severity)
                            .with_tag(*tag)
                            .with_span(MatchedSpan::new(m.start(), m.as_str())),
                    );
                }
            }
        }
        prune_span_duplicates(findings)
    }

    /// The action the findings demand.
    pub fn action(findings: &[SafetyFinding]) -> InjectionAction {
        if findings.is_empty() {
            InjectionAction::Allow
        } else if findings.iter().any(|f| f.severity == Severity::High) {
            InjectionAction::Halt
        } else {
            InjectionAction::Warn
        }
    }

    /// Sanitize per the action: halt replaces the whole prompt with the
    /// neutral query; warn deletes the matched spans.
    pub fn sanitize(&self, text: &str, findings: &[SafetyFinding]) -> String {
        match Self::action(findings) {
            InjectionAction::Allow => text.to_string(),
            InjectionAction::Halt => self.neutral_prompt.clone(),
            InjectionAction::Warn => {
                let replacements: Vec<(String, String)> = findings
                    .iter()
                    .flat_map(|f| f.matched_spans.iter())
                    .map(|span| (span.snippet.clone(), String::new()))
                    .collect();
                collapse_whitespace(&replace_snippets(text, &replacements))
            }
        }
    }
}
