pub mod catalog;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod github;
pub mod joiner;
pub mod log_retention;
pub mod logging;
pub mod orchestrator;
pub mod railway;
pub mod report;
pub mod runtime;
pub mod types;

use catalog::PatternCatalog;
use clap::{error::ErrorKind, CommandFactory, Parser};
use config::{load_config, AppConfig, CliOverrides};
use errors::AnalyzerError;
use logging::{append_run_log, init_run_log, JsonlLogger};
use orchestrator::{run_analysis, RunOutcome, RunRequest};
use railway::RailwayCli;
use runtime::{ProductionRuntime, Terminal};
use serde_json::json;
use std::collections::BTreeMap;
use std::ffi::OsString;

pub const OWNER_ENV: &str = "GITHUB_USER";
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

pub type EnvMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Parser)]
#[command(name = "deploy-analyzer")]
#[command(about = "Cross-reference GitHub repositories with Railway deployments and explain failures")]
pub struct Cli {
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
    /// GitHub user whose repositories are analyzed (falls back to $GITHUB_USER)
    #[arg(long)]
    pub owner: Option<String>,
    /// Personal access token (falls back to $GITHUB_TOKEN)
    #[arg(long)]
    pub token: Option<String>,
    #[arg(long)]
    pub log_lines: Option<usize>,
    #[arg(long = "pause-ms")]
    pub pause_ms: Option<u64>,
    #[arg(long = "railway-bin")]
    pub railway_bin: Option<String>,
    #[arg(long)]
    pub run_log: Option<std::path::PathBuf>,
    /// Analyze only the named repository; repeatable
    #[arg(long)]
    pub only: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub owner: String,
    pub token: String,
}

pub fn run() -> Result<i32, AnalyzerError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let env = std::env::vars_os().collect::<Vec<_>>();
    let runtime = ProductionRuntime::new()?;
    run_with_runtime(&args, &env, &runtime)
}

pub fn run_with_runtime(
    args: &[OsString],
    env: &[(OsString, OsString)],
    runtime: &ProductionRuntime,
) -> Result<i32, AnalyzerError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(AnalyzerError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        owner: cli.owner.clone(),
        log_lines: cli.log_lines,
        pause_millis: cli.pause_ms,
        railway_program: cli.railway_bin.clone(),
        run_log: cli.run_log.clone(),
    };
    let cfg = load_config(&overrides, runtime.file_system.as_ref())?;
    if let Some(path) = &cfg.logging.path {
        init_run_log(JsonlLogger {
            path: path.clone(),
            max_payload_bytes: cfg.logging.max_payload_bytes,
            budget_bytes: cfg.logging.budget_bytes,
        });
    }

    let terminal = runtime.terminal.as_ref();
    terminal.write_line("🔍 GitHub Repository Deployment Analyzer")?;
    terminal.write_line(&"=".repeat(50))?;

    let env_map = env_to_map(env);
    let credentials = resolve_credentials(&cli, &cfg, &env_map, terminal)?;
    let catalog = PatternCatalog::with_specs(&cfg.catalog.categories)?;
    let source = RailwayCli::new(runtime.process_runner.as_ref(), &cfg.railway);

    let request = RunRequest {
        owner: &credentials.owner,
        token: &credentials.token,
        only: &cli.only,
    };
    let outcome = run_analysis(runtime, &cfg, &catalog, &request, &source)?;
    if let RunOutcome::Aborted { stage, .. } = &outcome {
        append_run_log(
            "warn",
            "cli.run.aborted",
            json!({ "stage": stage.as_str() }),
        );
    }
    Ok(0)
}

/// Flag, then environment, then config; prompts only on an interactive stdin.
pub fn resolve_credentials(
    cli: &Cli,
    cfg: &AppConfig,
    env: &EnvMap,
    terminal: &dyn Terminal,
) -> Result<Credentials, AnalyzerError> {
    let owner = first_non_empty([
        cli.owner.clone(),
        env.get(OWNER_ENV).cloned(),
        cfg.github.owner.clone(),
    ]);
    let owner = match owner {
        Some(owner) => owner,
        None => ask(terminal, "Enter your GitHub username: ", "GitHub username is required")?,
    };

    let token = first_non_empty([cli.token.clone(), env.get(TOKEN_ENV).cloned()]);
    let token = match token {
        Some(token) => token,
        None => ask(
            terminal,
            "Enter your GitHub Personal Access Token: ",
            "GitHub token is required",
        )?,
    };

    append_run_log(
        "debug",
        "cli.credentials.resolved",
        json!({ "owner": owner, "token_len": token.len() }),
    );
    Ok(Credentials { owner, token })
}

fn first_non_empty<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn ask(terminal: &dyn Terminal, question: &str, missing: &str) -> Result<String, AnalyzerError> {
    if !terminal.stdin_is_tty() {
        return Err(AnalyzerError::Cli(missing.to_string()));
    }
    let answer = terminal.prompt(question)?;
    if answer.trim().is_empty() {
        return Err(AnalyzerError::Cli(missing.to_string()));
    }
    Ok(answer.trim().to_string())
}

pub fn render_help() -> String {
    Cli::command().render_long_help().to_string()
}

fn env_to_map(env: &[(OsString, OsString)]) -> EnvMap {
    let mut map = EnvMap::new();
    for (key, value) in env {
        if let (Some(key), Some(value)) = (key.to_str(), value.to_str()) {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FakeTerminal;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("deploy-analyzer").chain(args.iter().copied()))
            .expect("parse")
    }

    #[test]
    fn flags_beat_environment_and_config() {
        let mut cfg = AppConfig::default();
        cfg.github.owner = Some("cfg-owner".to_string());
        let mut env = EnvMap::new();
        env.insert(OWNER_ENV.to_string(), "env-owner".to_string());
        env.insert(TOKEN_ENV.to_string(), "env-token".to_string());
        let terminal = FakeTerminal::new(false);

        let creds = resolve_credentials(&cli(&["--owner", "flag-owner"]), &cfg, &env, &terminal)
            .expect("creds");
        assert_eq!(creds.owner, "flag-owner");
        assert_eq!(creds.token, "env-token");

        let creds = resolve_credentials(&cli(&[]), &cfg, &EnvMap::new(), &{
            let t = FakeTerminal::new(true);
            t.push_answer("typed-token");
            t
        })
        .expect("creds");
        assert_eq!(creds.owner, "cfg-owner");
        assert_eq!(creds.token, "typed-token");
    }

    #[test]
    fn missing_credentials_fail_without_a_tty() {
        let terminal = FakeTerminal::new(false);
        let err = resolve_credentials(&cli(&[]), &AppConfig::default(), &EnvMap::new(), &terminal)
            .expect_err("missing");
        assert!(err.to_string().contains("GitHub username is required"));
        assert!(terminal.questions().is_empty());
    }

    #[test]
    fn blank_prompt_answers_are_rejected() {
        let terminal = FakeTerminal::new(true);
        terminal.push_answer("octo");
        terminal.push_answer("   ");
        let err = resolve_credentials(&cli(&[]), &AppConfig::default(), &EnvMap::new(), &terminal)
            .expect_err("blank token");
        assert!(err.to_string().contains("GitHub token is required"));
        assert_eq!(terminal.questions().len(), 2);
    }

    #[test]
    fn help_lists_the_run_flags() {
        let help = render_help();
        for flag in [
            "--config",
            "--owner",
            "--token",
            "--log-lines",
            "--pause-ms",
            "--railway-bin",
            "--run-log",
            "--only",
        ] {
            assert!(help.contains(flag), "{flag}");
        }
    }
}
