//! Content-safety screeners and the pipeline that combines them.
//!
//! Each screener is pure and deterministic: regex tables compiled once
//! at construction, applied in linear time, producing findings with
//! byte-offset spans into the original text. Screeners share no state
//! and are safe to call concurrently.

pub mod domain_sensitivity;
pub mod ip_violation;
pub mod output_policy;
pub mod pipeline;
pub mod prompt_injection;
pub mod synthetic_identity;

pub use domain_sensitivity::DomainSensitivityScreener;
pub use ip_violation::IpViolationScreener;
pub use output_policy::{OutputPolicyAction, OutputPolicyScreener};
pub use pipeline::{SafetyCheck, SafetyPipeline};
pub use prompt_injection::{InjectionAction, PromptInjectionScreener};
pub use synthetic_identity::SyntheticIdentityScreener;

use regex::Regex;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::SafetyFinding;

/// Compile a pattern table, surfacing bad patterns as configuration
/// errors.
pub(crate) fn compile_patterns(patterns: &[String]) -> CoreResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| {
                CoreError::Configuration(format!("invalid safety pattern {pattern:?}: {e}"))
            })
        })
        .collect()
}

/// Collapse runs of whitespace left behind by span removal.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

/// Replace every occurrence of the given snippets, longest first so a
/// short match never splits a longer one into nested substitutions.
pub(crate) fn replace_snippets(text: &str, snippets: &[(String, String)]) -> String {
    let mut ordered: Vec<&(String, String)> = snippets.iter().collect();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut out = text.to_string();
    for (snippet, replacement) in ordered {
        if !snippet.is_empty() {
            out = out.replace(snippet.as_str(), replacement);
        }
    }
    out
}

/// When overlapping rules of one screener hit the same span, keep the
/// higher severity.
pub(crate) fn prune_span_duplicates(mut findings: Vec<SafetyFinding>) -> Vec<SafetyFinding> {
    findings.sort_by(|a, b| b.severity.cmp(&a.severity));
    let mut seen: Vec<(usize, usize)> = Vec::new();
    let mut kept = Vec::new();
    for finding in findings {
        let spans: Vec<(usize, usize)> = finding
            .matched_spans
            .iter()
            .map(|s| (s.offset, s.len))
            .collect();
        let duplicate = !spans.is_empty() && spans.iter().all(|span| seen.contains(span));
        if !duplicate {
            seen.extend(spans);
            kept.push(finding);
        }
    }
    kept
}
