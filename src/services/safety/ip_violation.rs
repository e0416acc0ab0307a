//! Intellectual-property violation detection and redaction.
//!
//! Flags copyright-verbatim requests, trademark usage, and proprietary
//! code/material references. A configured high-risk entity co-occurring
//! anywhere in the text raises both severity and score. Rewrites
//! replace matched spans with redaction markers, longest match first,
//! and append a single notice.

use regex::Regex;

use crate::domain::errors::CoreResult;
use crate::domain::models::{
    FindingKind, IpViolationConfig, MatchedSpan, SafetyFinding, Severity,
};

use super::{collapse_whitespace, compile_patterns, prune_span_duplicates, replace_snippets};

const COPYRIGHT_MARKER: &str = "[Reference to copyrighted material]";
const TRADEMARK_MARKER: &str = "[Trademark reference]";
const PROPRIETARY_MARKER: &str = "[Proprietary information redacted]";
const REDACTION_NOTICE: &str =
    "\n\nNote: Some content has been redacted or modified to comply with intellectual property policies.";

pub struct IpViolationScreener {
    copyright: Vec<Regex>,
    trademark: Vec<Regex>,
    proprietary: Vec<Regex>,
    high_risk_entities: Vec<String>,
    base_score: f64,
    high_risk_score: f64,
    block_threshold: f64,
}

impl IpViolationScreener {
    pub fn new(config: &IpViolationConfig) -> CoreResult<Self> {
        Ok(Self {
            copyright: compile_patterns(&config.copyright_patterns)?,
            trademark: compile_patterns(&config.trademark_patterns)?,
            proprietary: compile_patterns(&config.proprietary_patterns)?,
            high_risk_entities: config.high_risk_entities.clone(),
            base_score: config.base_score,
            high_risk_score: config.high_risk_score,
            block_threshold: config.block_threshold,
        })
    }

    /// Screen text for IP violations.
    pub fn screen(&self, text: &str) -> Vec<SafetyFinding> {
        let lowered = text.to_lowercase();
        let high_risk = self
            .high_risk_entities
            .iter()
            .any(|entity| lowered.contains(&entity.to_lowercase()));
        let (severity, score) = if high_risk {
            (Severity::High, self.high_risk_score)
        } else {
            (Severity::Medium, self.base_score)
        };

        let mut findings = Vec::new();
        for (patterns, tag) in [
            (&self.copyright, "copyright_violation"),
            (&self.trademark, "trademark_violation"),
            (&self.proprietary, "proprietary_code"),
        ] {
            for pattern in patterns {
                for m in pattern.find_iter(text) {
                    findings.push(
                        SafetyFinding::new(FindingKind::IpViolation, severity)
                            .with_tag(tag)
                            .with_score(score)
                            .with_span(MatchedSpan::new(m.start(), m.as_str())),
                    );
                }
            }
        }
        prune_span_duplicates(findings)
    }

    /// True when any finding's score reaches the block threshold.
    pub fn should_block(&self, findings: &[SafetyFinding]) -> bool {
        findings
            .iter()
            .filter(|f| f.kind == FindingKind::IpViolation)
            .any(|f| f.score.unwrap_or(0.0) >= self.block_threshold)
    }

    /// Redact matched spans with per-family markers and append one
    /// notice. Longest matches are replaced first so nested substitution
    /// cannot occur.
    pub fn rewrite(&self, text: &str, findings: &[SafetyFinding]) -> String {
        if findings.is_empty() {
            return text.to_string();
        }

        let mut replacements = Vec::new();
        for finding in findings {
            let marker = if finding.tags.iter().any(|t| t == "copyright_violation") {
                COPYRIGHT_MARKER
            } else if finding.tags.iter().any(|t| t == "trademark_violation") {
                TRADEMARK_MARKER
            } else {
                PROPRIETARY_MARKER
            };
            for span in &finding.matched_spans {
                replacements.push((span.snippet.clone(), marker.to_string()));
            }
        }

        let redacted = collapse_whitespace(&replace_snippets(text, &replacements));
        format!("{redacted}{REDACTION_NOTICE}")
    }
}
