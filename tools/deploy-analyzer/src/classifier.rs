//! Deployment log classification.
//!
//! A log is scanned in three passes:
//!
//! 1. A coarse pre-check marks empty logs and logs mentioning "error" (in any
//!    letter case) as failed. This is a heuristic: a log that merely reports a
//!    handled error is still flagged. It is kept as-is rather than tightened.
//! 2. Every catalog category is tested in order. A matching category adds its
//!    issue label once and contributes its suggestions.
//! 3. Only when nothing above decided the outcome do success indicators count.
//!
//! Failure always wins over success: a log with both a failure signature and
//! "server started" is reported as failed.

use crate::catalog::PatternCatalog;
use crate::types::{DeploymentStatus, Severity};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub status: DeploymentStatus,
    pub issues: Vec<String>,
    /// Deduplicated; first-seen order is kept so reports are stable.
    pub suggestions: Vec<String>,
    pub severity: Severity,
    pub matched_categories: Vec<String>,
}

impl Verdict {
    fn unknown() -> Self {
        Self {
            status: DeploymentStatus::Unknown,
            issues: Vec::new(),
            suggestions: Vec::new(),
            severity: Severity::Low,
            matched_categories: Vec::new(),
        }
    }

    /// Fixed verdict for repositories with no deployment.
    pub fn not_deployed() -> Self {
        Self {
            status: DeploymentStatus::NotDeployed,
            issues: vec!["Not deployed".to_string()],
            suggestions: vec!["Consider deploying this repository".to_string()],
            severity: Severity::Medium,
            matched_categories: Vec::new(),
        }
    }

    fn mark_failed(&mut self) {
        self.status = DeploymentStatus::Failed;
        self.severity = Severity::High;
    }

    fn add_suggestions(&mut self, suggestions: &[String]) {
        for suggestion in suggestions {
            if !self.suggestions.contains(suggestion) {
                self.suggestions.push(suggestion.clone());
            }
        }
    }
}

pub fn classify(logs: &str, catalog: &PatternCatalog) -> Verdict {
    let mut verdict = Verdict::unknown();

    if trips_error_precheck(logs) {
        verdict.mark_failed();
    }

    for category in catalog.categories() {
        if !category.matches(logs) {
            continue;
        }
        verdict.issues.push(category.issue.clone());
        verdict.matched_categories.push(category.id.clone());
        verdict.add_suggestions(&category.suggestions);
        verdict.mark_failed();
    }

    if verdict.status == DeploymentStatus::Unknown && catalog.has_success_indicator(logs) {
        verdict.status = DeploymentStatus::Success;
        verdict.severity = Severity::Low;
    }

    verdict
}

/// Classifies raw command output that may not be valid UTF-8.
pub fn classify_bytes(logs: &[u8], catalog: &PatternCatalog) -> Verdict {
    classify(&String::from_utf8_lossy(logs), catalog)
}

fn trips_error_precheck(logs: &str) -> bool {
    logs.is_empty() || logs.contains("Error") || logs.to_ascii_lowercase().contains("error")
}
