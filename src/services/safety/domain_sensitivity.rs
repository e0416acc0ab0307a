//! Sensitive-domain detection.
//!
//! Scans text for medical, legal, financial, mental-health, and
//! political terms. Each domain accumulates a max sensitivity score;
//! domains at or above their configured threshold produce a finding
//! carrying the reviewers that must look at any rerun.

use regex::Regex;

use crate::domain::errors::CoreResult;
use crate::domain::models::{
    DomainSensitivityConfig, FindingKind, MatchedSpan, SafetyFinding, Severity,
};

use super::compile_patterns;

struct CompiledDomain {
    name: String,
    patterns: Vec<Regex>,
    sensitivity: f64,
    threshold: f64,
    reviewers: Vec<String>,
}

pub struct DomainSensitivityScreener {
    domains: Vec<CompiledDomain>,
}

impl DomainSensitivityScreener {
    pub fn new(config: &DomainSensitivityConfig) -> CoreResult<Self> {
        let domains = config
            .domains
            .iter()
            .map(|domain| {
                Ok(CompiledDomain {
                    name: domain.name.clone(),
                    patterns: compile_patterns(&domain.patterns)?,
                    sensitivity: domain.sensitivity,
                    threshold: domain.threshold,
                    reviewers: domain.reviewers.clone(),
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self { domains })
    }

    /// Screen text; one finding per domain whose max sensitivity meets
    /// its threshold.
    pub fn screen(&self, text: &str) -> Vec<SafetyFinding> {
        let mut findings = Vec::new();

        for domain in &self.domains {
            let mut spans = Vec::new();
            for pattern in &domain.patterns {
                for m in pattern.find_iter(text) {
                    spans.push(MatchedSpan::new(m.start(), m.as_str()));
                }
            }
            if spans.is_empty() {
                continue;
            }

            // All matches of a domain carry the same base sensitivity,
            // so the max is the base; the threshold gates inclusion.
            let score = domain.sensitivity;
            if score < domain.threshold {
                continue;
            }

            let severity = if score >= 0.9 { Severity::High } else { Severity::Medium };
            let mut finding =
                SafetyFinding::new(FindingKind::DomainSensitivity, severity)
                    .with_tag(domain.name.clone())
                    .with_score(score);
            for span in spans {
                finding = finding.with_span(span);
            }
            findings.push(finding);
        }

        findings
    }

    /// Reviewers required for the flagged domains, deduplicated in
    /// catalog order.
    pub fn reviewers_for(&self, findings: &[SafetyFinding]) -> Vec<String> {
        let mut reviewers = Vec::new();
        for domain in &self.domains {
            let flagged = findings
                .iter()
                .any(|f| f.kind == FindingKind::DomainSensitivity && f.tags.contains(&domain.name));
            if flagged {
                for reviewer in &domain.reviewers {
                    if !reviewers.contains(reviewer) {
                        reviewers.push(reviewer.clone());
                    }
                }
            }
        }
        reviewers
    }
}
