use crate::config::RailwayConfig;
use crate::errors::AnalyzerError;
use crate::joiner::{DeploymentIndex, DeploymentSource};
use crate::logging::append_run_log;
use crate::runtime::{ProcessOutput, ProcessRequest, ProcessRunner};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
struct StatusListing {
    #[serde(default)]
    projects: Vec<ProjectEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProjectEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    id: String,
}

/// Deployment source backed by the `railway` command-line tool.
pub struct RailwayCli<'a> {
    runner: &'a dyn ProcessRunner,
    config: &'a RailwayConfig,
}

impl<'a> RailwayCli<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, config: &'a RailwayConfig) -> Self {
        Self { runner, config }
    }

    fn run(&self, args: Vec<String>, timeout_seconds: u64) -> Result<ProcessOutput, AnalyzerError> {
        self.runner.run(ProcessRequest {
            program: self.config.program.clone(),
            args,
            timeout: Some(Duration::from_secs(timeout_seconds)),
        })
    }
}

impl DeploymentSource for RailwayCli<'_> {
    fn list_deployments(&self) -> Result<DeploymentIndex, AnalyzerError> {
        append_run_log(
            "info",
            "railway.status.started",
            json!({ "program": self.config.program }),
        );
        let out = self.run(
            vec!["status".to_string(), "--json".to_string()],
            self.config.status_timeout_seconds,
        )?;
        if out.exit_code != 0 {
            append_run_log(
                "warn",
                "railway.status.failed",
                json!({
                    "exit_code": out.exit_code,
                    "stderr": out.stderr,
                }),
            );
            return Err(AnalyzerError::Process(out.stderr.trim().to_string()));
        }
        let index = parse_status_listing(&out.stdout)?;
        append_run_log(
            "info",
            "railway.status.fetched",
            json!({ "project_count": index.len() }),
        );
        Ok(index)
    }

    fn fetch_logs(&self, deployment_id: &str, lines: usize) -> Result<String, AnalyzerError> {
        append_run_log(
            "debug",
            "railway.logs.started",
            json!({
                "deployment_id": deployment_id,
                "lines": lines,
            }),
        );
        let out = self.run(
            vec![
                "logs".to_string(),
                "--project".to_string(),
                deployment_id.to_string(),
                "--lines".to_string(),
                lines.to_string(),
            ],
            self.config.logs_timeout_seconds,
        )?;
        if out.exit_code != 0 {
            append_run_log(
                "warn",
                "railway.logs.failed",
                json!({
                    "deployment_id": deployment_id,
                    "exit_code": out.exit_code,
                    "stderr": out.stderr,
                }),
            );
            return Err(AnalyzerError::Process(out.stderr.trim().to_string()));
        }
        append_run_log(
            "debug",
            "railway.logs.fetched",
            json!({
                "deployment_id": deployment_id,
                "bytes": out.stdout.len(),
            }),
        );
        Ok(out.stdout)
    }
}

/// Parses `railway status --json`. Projects without a name are skipped; on a
/// repeated name the later entry wins.
pub fn parse_status_listing(stdout: &str) -> Result<DeploymentIndex, AnalyzerError> {
    let listing: StatusListing = serde_json::from_str(stdout)
        .map_err(|e| AnalyzerError::Parse(format!("invalid railway status json: {e}")))?;
    Ok(listing
        .projects
        .into_iter()
        .filter(|project| !project.name.is_empty())
        .map(|project| (project.name, project.id))
        .collect())
}
