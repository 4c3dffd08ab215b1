use crate::catalog::PatternCatalog;
use crate::config::AppConfig;
use crate::errors::AnalyzerError;
use crate::github::{GithubClient, RepositoryRecord};
use crate::joiner::{analyze_repository, load_deployment_index, DeploymentSource, RepositoryAnalysis};
use crate::logging::{append_run_log, structured_fallback_line};
use crate::report::{render_report, render_summary};
use crate::runtime::ProductionRuntime;
use crate::types::DeploymentStatus;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Start,
    ValidateCredentials,
    FetchRepositories,
    FetchDeployments,
    AnalyzeRepositories,
    EmitSummary,
    End,
    Aborted,
}

impl RunStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ValidateCredentials => "validate_credentials",
            Self::FetchRepositories => "fetch_repositories",
            Self::FetchDeployments => "fetch_deployments",
            Self::AnalyzeRepositories => "analyze_repositories",
            Self::EmitSummary => "emit_summary",
            Self::End => "end",
            Self::Aborted => "aborted",
        }
    }
}

pub fn validate_transition(from: RunStage, to: RunStage) -> Result<(), AnalyzerError> {
    use RunStage as S;

    let allowed = match from {
        S::Start => matches!(to, S::ValidateCredentials),
        S::ValidateCredentials => matches!(to, S::FetchRepositories | S::Aborted),
        S::FetchRepositories => matches!(to, S::FetchDeployments | S::Aborted),
        S::FetchDeployments => matches!(to, S::AnalyzeRepositories),
        S::AnalyzeRepositories => matches!(to, S::EmitSummary),
        S::EmitSummary => matches!(to, S::End),
        S::End | S::Aborted => false,
    };

    if !allowed {
        return Err(AnalyzerError::State(format!(
            "illegal run transition: {} -> {}",
            from.as_str(),
            to.as_str()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTracker {
    pub stage: RunStage,
    pub history: Vec<RunStage>,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self {
            stage: RunStage::Start,
            history: vec![RunStage::Start],
        }
    }
}

impl RunTracker {
    pub fn transition(&mut self, next: RunStage) -> Result<(), AnalyzerError> {
        validate_transition(self.stage, next)?;
        append_run_log(
            "debug",
            "run.stage.transition",
            json!({ "from": self.stage.as_str(), "to": next.as_str() }),
        );
        self.stage = next;
        self.history.push(next);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    /// Unknown status and repositories without a deployment.
    pub unknown: usize,
    pub deployments: usize,
}

impl RunSummary {
    pub fn with_deployments(deployments: usize) -> Self {
        Self {
            deployments,
            ..Self::default()
        }
    }

    /// Folds one repository's final status into the counters.
    #[must_use]
    pub fn record(self, status: DeploymentStatus) -> Self {
        let mut next = self;
        next.total += 1;
        match status {
            DeploymentStatus::Failed => next.failed += 1,
            DeploymentStatus::Success => next.success += 1,
            DeploymentStatus::Unknown | DeploymentStatus::NotDeployed => next.unknown += 1,
        }
        next
    }

    pub fn needs_attention(&self) -> bool {
        self.failed > 0
    }
}

pub fn summarize<I>(deployments: usize, statuses: I) -> RunSummary
where
    I: IntoIterator<Item = DeploymentStatus>,
{
    statuses
        .into_iter()
        .fold(RunSummary::with_deployments(deployments), RunSummary::record)
}

#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub owner: &'a str,
    pub token: &'a str,
    /// When non-empty, only repositories with these names are analyzed.
    pub only: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryOutcome {
    pub repository: String,
    pub analysis: RepositoryAnalysis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        summary: RunSummary,
        repositories: Vec<RepositoryOutcome>,
    },
    Aborted {
        stage: RunStage,
        reason: String,
    },
}

pub fn run_analysis(
    runtime: &ProductionRuntime,
    cfg: &AppConfig,
    catalog: &PatternCatalog,
    request: &RunRequest<'_>,
    source: &dyn DeploymentSource,
) -> Result<RunOutcome, AnalyzerError> {
    let terminal = runtime.terminal.as_ref();
    let mut tracker = RunTracker::default();
    let github = GithubClient::new(runtime.http.as_ref(), &cfg.github, request.token);

    append_run_log(
        "info",
        "run.started",
        json!({
            "owner": request.owner,
            "only": request.only,
            "categories": catalog.categories().len(),
        }),
    );
    terminal.write_line("🚀 Starting Deployment Failure Analysis")?;
    terminal.write_line(&"=".repeat(50))?;

    tracker.transition(RunStage::ValidateCredentials)?;
    if let Err(error) = github.validate_token() {
        let reason = match error {
            AnalyzerError::Auth(_) => "❌ Invalid GitHub token".to_string(),
            _ => "❌ Error validating GitHub token".to_string(),
        };
        return abort(terminal, &mut tracker, reason);
    }

    tracker.transition(RunStage::FetchRepositories)?;
    terminal.write_line(&format!(
        "🔍 Fetching repositories for user: {}",
        request.owner
    ))?;
    let mut warn_rate_limit = |remaining: u64| {
        terminal.write_line(&format!(
            "⚠️  Rate limit warning: {remaining} requests remaining"
        ))
    };
    let listing = match github.list_repositories(request.owner, &mut warn_rate_limit) {
        Ok(listing) => listing,
        Err(error) => {
            terminal.write_line(&format!("❌ Error fetching GitHub repos: {error}"))?;
            return abort(
                terminal,
                &mut tracker,
                "❌ No repositories found or error occurred".to_string(),
            );
        }
    };
    if let Some(reason) = &listing.truncated_by {
        terminal.write_line(&format!("❌ Error fetching GitHub repos: {reason}"))?;
    }
    terminal.write_line(&format!(
        "✅ Found {} repositories",
        listing.repositories.len()
    ))?;
    let repositories = select_repositories(listing.repositories, request.only);
    if repositories.is_empty() {
        return abort(
            terminal,
            &mut tracker,
            "❌ No repositories found or error occurred".to_string(),
        );
    }

    tracker.transition(RunStage::FetchDeployments)?;
    terminal.write_line("🚂 Fetching Railway projects...")?;
    let (index, warning) = load_deployment_index(source);
    match warning {
        Some(warning) => terminal.write_line(&format!("⚠️  {warning}"))?,
        None => terminal.write_line(&format!("✅ Found {} Railway projects", index.len()))?,
    }

    tracker.transition(RunStage::AnalyzeRepositories)?;
    let total = repositories.len();
    terminal.write_line(&format!("\n🔍 Analyzing {total} repositories..."))?;
    terminal.write_line(&"=".repeat(50))?;

    let pause = Duration::from_millis(cfg.run.pause_millis);
    let mut summary = RunSummary::with_deployments(index.len());
    let mut outcomes = Vec::with_capacity(total);
    for (position, repo) in repositories.iter().enumerate() {
        let deployed = index.contains_key(&repo.name);
        write_progress(runtime, position + 1, total, repo, deployed)?;

        let analysis = analyze_repository(
            &repo.name,
            &index,
            source,
            catalog,
            cfg.railway.log_lines,
        );
        summary = summary.record(analysis.verdict.status);
        terminal.write_line(&render_report(
            repo,
            &analysis.verdict,
            &analysis.logs,
            cfg.run.excerpt_lines,
        ))?;
        append_run_log(
            "info",
            "run.repo.analyzed",
            json!({
                "repo": repo.name,
                "position": position + 1,
                "total": total,
                "status": analysis.verdict.status.as_str(),
                "severity": analysis.verdict.severity.as_str(),
            }),
        );
        outcomes.push(RepositoryOutcome {
            repository: repo.name.clone(),
            analysis,
        });

        if position + 1 < total && !pause.is_zero() {
            runtime.clock.sleep_for(pause)?;
        }
    }

    tracker.transition(RunStage::EmitSummary)?;
    terminal.write_line(&render_summary(&summary))?;
    tracker.transition(RunStage::End)?;
    append_run_log(
        "info",
        "run.completed",
        json!({
            "total": summary.total,
            "success": summary.success,
            "failed": summary.failed,
            "unknown": summary.unknown,
            "deployments": summary.deployments,
        }),
    );

    Ok(RunOutcome::Completed {
        summary,
        repositories: outcomes,
    })
}

fn select_repositories(repositories: Vec<RepositoryRecord>, only: &[String]) -> Vec<RepositoryRecord> {
    if only.is_empty() {
        return repositories;
    }
    repositories
        .into_iter()
        .filter(|repo| only.iter().any(|name| name == &repo.name))
        .collect()
}

fn write_progress(
    runtime: &ProductionRuntime,
    position: usize,
    total: usize,
    repo: &RepositoryRecord,
    deployed: bool,
) -> Result<(), AnalyzerError> {
    let terminal = runtime.terminal.as_ref();
    if !terminal.stdin_is_tty() {
        return terminal.write_line(&structured_fallback_line(
            &repo.name,
            if deployed { "deployed" } else { "not_deployed" },
            &format!("[{position}/{total}] analyzing"),
        ));
    }
    terminal.write_line(&format!("\n[{position}/{total}] Analyzing: {}", repo.name))?;
    if deployed {
        terminal.write_line("  🚂 Found on Railway, fetching logs...")
    } else {
        terminal.write_line("  ⚠️  Not found on Railway")
    }
}

fn abort(
    terminal: &dyn crate::runtime::Terminal,
    tracker: &mut RunTracker,
    reason: String,
) -> Result<RunOutcome, AnalyzerError> {
    let stage = tracker.stage;
    tracker.transition(RunStage::Aborted)?;
    append_run_log(
        "error",
        "run.aborted",
        json!({ "stage": stage.as_str(), "reason": reason }),
    );
    terminal.write_line(&reason)?;
    Ok(RunOutcome::Aborted { stage, reason })
}
