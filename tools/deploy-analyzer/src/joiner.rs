use crate::catalog::PatternCatalog;
use crate::classifier::{classify, Verdict};
use crate::errors::AnalyzerError;
use crate::logging::append_run_log;
use crate::types::LogText;
use serde_json::json;
use std::collections::BTreeMap;

pub const DEFAULT_LOG_LINES: usize = 100;

/// Deployment name to deployment id, built once per run.
pub type DeploymentIndex = BTreeMap<String, String>;

/// Where deployments and their logs come from.
pub trait DeploymentSource {
    fn list_deployments(&self) -> Result<DeploymentIndex, AnalyzerError>;
    fn fetch_logs(&self, deployment_id: &str, lines: usize) -> Result<String, AnalyzerError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryAnalysis {
    pub verdict: Verdict,
    pub logs: LogText,
}

/// Loads the index, turning every source failure into an empty index plus a
/// warning for the console.
pub fn load_deployment_index(source: &dyn DeploymentSource) -> (DeploymentIndex, Option<String>) {
    match source.list_deployments() {
        Ok(index) => {
            append_run_log(
                "info",
                "joiner.index.loaded",
                json!({ "deployment_count": index.len() }),
            );
            (index, None)
        }
        Err(error) => {
            let warning = index_warning(&error);
            append_run_log(
                "warn",
                "joiner.index.degraded",
                json!({ "error": error.to_string() }),
            );
            (DeploymentIndex::new(), Some(warning))
        }
    }
}

/// Fetches logs, substituting a descriptive placeholder on any failure. The
/// placeholder is classified like any other text.
pub fn fetch_logs_or_placeholder(
    source: &dyn DeploymentSource,
    deployment_id: &str,
    lines: usize,
) -> String {
    match source.fetch_logs(deployment_id, lines) {
        Ok(logs) => logs,
        Err(error) => {
            append_run_log(
                "warn",
                "joiner.logs.degraded",
                json!({
                    "deployment_id": deployment_id,
                    "error": error.to_string(),
                }),
            );
            logs_placeholder(&error)
        }
    }
}

pub fn analyze_repository(
    repo_name: &str,
    index: &DeploymentIndex,
    source: &dyn DeploymentSource,
    catalog: &PatternCatalog,
    lines: usize,
) -> RepositoryAnalysis {
    let Some(deployment_id) = index.get(repo_name) else {
        append_run_log(
            "debug",
            "joiner.repo.not_deployed",
            json!({ "repo": repo_name }),
        );
        return RepositoryAnalysis {
            verdict: Verdict::not_deployed(),
            logs: LogText::NotDeployed,
        };
    };

    let logs = fetch_logs_or_placeholder(source, deployment_id, lines);
    let verdict = classify(&logs, catalog);
    append_run_log(
        "info",
        "joiner.repo.classified",
        json!({
            "repo": repo_name,
            "deployment_id": deployment_id,
            "status": verdict.status.as_str(),
            "categories": verdict.matched_categories,
        }),
    );
    RepositoryAnalysis {
        verdict,
        logs: LogText::Fetched(logs),
    }
}

fn index_warning(error: &AnalyzerError) -> String {
    match error {
        AnalyzerError::MissingExecutable(_) => {
            "Railway CLI not found. Please install it: https://docs.railway.app/develop/cli"
                .to_string()
        }
        AnalyzerError::Timeout { .. } => "Railway CLI command timed out".to_string(),
        AnalyzerError::Parse(_) => "Failed to parse Railway CLI output".to_string(),
        AnalyzerError::Process(detail) => format!("Railway CLI error: {detail}"),
        other => format!("Error running Railway CLI: {other}"),
    }
}

fn logs_placeholder(error: &AnalyzerError) -> String {
    match error {
        AnalyzerError::Timeout { .. } => "Log fetch timed out".to_string(),
        AnalyzerError::Process(detail) => format!("Error fetching logs: {detail}"),
        other => format!("Error: {other}"),
    }
}
