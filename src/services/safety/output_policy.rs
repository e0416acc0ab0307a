//! Output policy enforcement.
//!
//! Scans worker output for harmful, inappropriate, misinformation,
//! malicious-code, and plagiarism patterns, plus language-specific
//! code-safety shapes. Each category tracks its maximum observed risk;
//! per-category warn/block thresholds drive the action. Rewrites append
//! a language-appropriate disclaimer.

use std::collections::HashMap;

use regex::Regex;

use crate::domain::errors::CoreResult;
use crate::domain::models::{
    CategoryThresholds, FindingKind, MatchedSpan, OutputPolicyConfig, SafetyFinding, Severity,
};

use super::compile_patterns;

/// What the category risks demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPolicyAction {
    Allowed,
    /// At least one category crossed its warn threshold
    Rewritten,
    /// At least one category crossed its block threshold
    Blocked,
}

struct CompiledCategory {
    name: String,
    patterns: Vec<Regex>,
    thresholds: CategoryThresholds,
}

struct CompiledCodePattern {
    language: String,
    pattern: Regex,
    risk: f64,
}

pub struct OutputPolicyScreener {
    categories: Vec<CompiledCategory>,
    code_safety: Vec<CompiledCodePattern>,
    pattern_risk: f64,
}

impl OutputPolicyScreener {
    pub fn new(config: &OutputPolicyConfig) -> CoreResult<Self> {
        let categories = config
            .categories
            .iter()
            .map(|category| {
                Ok(CompiledCategory {
                    name: category.name.clone(),
                    patterns: compile_patterns(&category.patterns)?,
                    thresholds: category.thresholds,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        let code_safety = config
            .code_safety
            .iter()
            .map(|entry| {
                Ok(CompiledCodePattern {
                    language: entry.language.clone(),
                    pattern: compile_patterns(std::slice::from_ref(&entry.pattern))?
                        .pop()
                        .ok_or_else(|| {
                            crate::domain::errors::CoreError::Configuration(
                                "empty code-safety pattern".to_string(),
                            )
                        })?,
                    risk: entry.risk,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Self {
            categories,
            code_safety,
            pattern_risk: config.pattern_risk,
        })
    }

    /// Screen output text. One finding per category whose max risk
    /// crossed its warn threshold; severity reflects which threshold.
    pub fn screen(&self, text: &str) -> Vec<SafetyFinding> {
        let mut findings = Vec::new();

        for category in &self.categories {
            let mut risk: f64 = 0.0;
            let mut spans = Vec::new();

            for pattern in &category.patterns {
                for m in pattern.find_iter(text) {
                    risk = risk.max(self.pattern_risk);
                    spans.push(MatchedSpan::new(m.start(), m.as_str()));
                }
            }

            // Code-safety shapes only feed the malicious_code category.
            if category.name == "malicious_code" {
                for code in &self.code_safety {
                    for m in code.pattern.find_iter(text) {
                        risk = risk.max(code.risk);
                        spans.push(MatchedSpan::new(m.start(), m.as_str()));
                    }
                }
            }

            if spans.is_empty() || risk < category.thresholds.warn {
                continue;
            }

            let severity = if risk >= category.thresholds.block {
                Severity::High
            } else {
                Severity::Medium
            };
            let mut finding = SafetyFinding::new(FindingKind::OutputPolicy, severity)
                .with_tag(category.name.clone())
                .with_score(risk);
            for span in spans {
                finding = finding.with_span(span);
            }
            findings.push(finding);
        }

        findings
    }

    /// The action the findings demand: high severity blocks, medium
    /// rewrites.
    pub fn action(findings: &[SafetyFinding]) -> OutputPolicyAction {
        let policy: Vec<&SafetyFinding> = findings
            .iter()
            .filter(|f| f.kind == FindingKind::OutputPolicy)
            .collect();
        if policy.is_empty() {
            OutputPolicyAction::Allowed
        } else if policy.iter().any(|f| f.severity == Severity::High) {
            OutputPolicyAction::Blocked
        } else {
            OutputPolicyAction::Rewritten
        }
    }

    /// Per-category maximum observed risk, for event payloads.
    pub fn category_risks(&self, findings: &[SafetyFinding]) -> HashMap<String, f64> {
        let mut risks = HashMap::new();
        for finding in findings {
            if finding.kind != FindingKind::OutputPolicy {
                continue;
            }
            for tag in &finding.tags {
                let entry = risks.entry(tag.clone()).or_insert(0.0_f64);
                *entry = entry.max(finding.score.unwrap_or(0.0));
            }
        }
        risks
    }

    /// Append a language-appropriate disclaimer for a rewrite.
    pub fn rewrite(text: &str) -> String {
        let disclaimer = match detect_language(text) {
            CodeLanguage::CStyle => {
                "\n\n// Note: This content contains patterns that may require additional review before use."
            }
            CodeLanguage::ScriptStyle => {
                "\n\n# Note: This content contains patterns that may require additional review before use."
            }
            CodeLanguage::Markup => {
                "\n\n<!-- Note: This content contains patterns that may require additional review before use. -->"
            }
            CodeLanguage::None => {
                "\n\nNote: This response may contain sensitive information. Please use it responsibly."
            }
        };
        format!("{text}{disclaimer}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeLanguage {
    CStyle,
    ScriptStyle,
    Markup,
    None,
}

/// Cheap code-language detection for disclaimer formatting.
fn detect_language(text: &str) -> CodeLanguage {
    if text.contains("function ") || text.contains("const ") || text.contains("=> {") {
        CodeLanguage::CStyle
    } else if text.contains("def ") || text.contains("import ") || text.contains("#!/") {
        CodeLanguage::ScriptStyle
    } else if text.contains("<html") || text.contains("</") {
        CodeLanguage::Markup
    } else {
        CodeLanguage::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screener() -> OutputPolicyScreener {
        OutputPolicyScreener::new(&OutputPolicyConfig::default()).unwrap()
    }

    #[test]
    fn test_clean_output() {
        let findings = screener().screen("The deployment completed successfully.");
        assert!(findings.is_empty());
        assert_eq!(
            OutputPolicyScreener::action(&findings),
            OutputPolicyAction::Allowed
        );
    }

    #[test]
    fn test_harmful_blocklist_blocks() {
        let findings = screener().screen("Step one: how to make a bomb from parts");
        assert_eq!(
            OutputPolicyScreener::action(&findings),
            OutputPolicyAction::Blocked
        );
        let harmful = findings
            .iter()
            .find(|f| f.tags.contains(&"harmful".to_string()))
            .unwrap();
        assert_eq!(harmful.severity, Severity::High);
    }

    #[test]
    fn test_code_safety_rewrites_below_block() {
        // eval( carries risk 0.5: above malicious_code warn (0.4),
        // below block (0.7)
        let findings = screener().screen("def run():\n    eval(user_payload)\n");
        assert_eq!(
            OutputPolicyScreener::action(&findings),
            OutputPolicyAction::Rewritten
        );
    }

    #[test]
    fn test_malicious_blocklist_blocks() {
        let findings = screener().screen("os.system('rm -rf /tmp/scratch')");
        assert_eq!(
            OutputPolicyScreener::action(&findings),
            OutputPolicyAction::Blocked
        );
    }

    #[test]
    fn test_category_risks_reported() {
        let screener = screener();
        let findings = screener.screen("this was copied from the vendor docs without attribution");
        let risks = screener.category_risks(&findings);
        assert!(risks.get("plagiarism").copied().unwrap_or(0.0) > 0.8);
    }

    #[test]
    fn test_rewrite_disclaimer_matches_language() {
        let python = OutputPolicyScreener::rewrite("def f():\n    return 1");
        assert!(python.ends_with("# Note: This content contains patterns that may require additional review before use."));

        let js = OutputPolicyScreener::rewrite("function f() { return 1; }");
        assert!(js.contains("// Note:"));

        let text = OutputPolicyScreener::rewrite("plain prose");
        assert!(text.contains("Note: This response may contain sensitive information"));
    }
}
