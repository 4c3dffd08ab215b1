use crate::catalog::CategorySpec;
use crate::errors::AnalyzerError;
use crate::logging::{DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub owner: Option<String>,
    pub log_lines: Option<usize>,
    pub pause_millis: Option<u64>,
    pub railway_program: Option<String>,
    pub run_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub github: GithubConfig,
    pub railway: RailwayConfig,
    pub run: RunConfig,
    pub logging: LoggingConfig,
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GithubConfig {
    pub api_base: String,
    pub owner: Option<String>,
    pub per_page: u32,
    pub rate_limit_warn_below: u64,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RailwayConfig {
    pub program: String,
    pub status_timeout_seconds: u64,
    pub logs_timeout_seconds: u64,
    pub log_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunConfig {
    pub pause_millis: u64,
    pub excerpt_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CatalogConfig {
    pub categories: Vec<CategorySpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            github: GithubConfig {
                api_base: "https://api.github.com".to_string(),
                owner: None,
                per_page: 100,
                rate_limit_warn_below: 10,
                request_timeout_seconds: 30,
            },
            railway: RailwayConfig {
                program: "railway".to_string(),
                status_timeout_seconds: 30,
                logs_timeout_seconds: 60,
                log_lines: crate::joiner::DEFAULT_LOG_LINES,
            },
            run: RunConfig {
                pause_millis: 500,
                excerpt_lines: 10,
            },
            logging: LoggingConfig {
                path: None,
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
                budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            },
            catalog: CatalogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    github: Option<PartialGithubConfig>,
    railway: Option<PartialRailwayConfig>,
    run: Option<PartialRunConfig>,
    logging: Option<PartialLoggingConfig>,
    catalog: Option<PartialCatalogConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialGithubConfig {
    api_base: Option<String>,
    owner: Option<String>,
    per_page: Option<u32>,
    rate_limit_warn_below: Option<u64>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialRailwayConfig {
    program: Option<String>,
    status_timeout_seconds: Option<u64>,
    logs_timeout_seconds: Option<u64>,
    log_lines: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialRunConfig {
    pause_millis: Option<u64>,
    excerpt_lines: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialCatalogConfig {
    categories: Option<Vec<CategorySpec>>,
}

pub fn load_config(overrides: &CliOverrides, fs: &dyn FileSystem) -> Result<AppConfig, AnalyzerError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        cfg = parse_config_str(&file_contents)?;
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Parses a TOML document and merges it over the defaults, without validation.
pub fn parse_config_str(text: &str) -> Result<AppConfig, AnalyzerError> {
    let partial: PartialAppConfig =
        toml::from_str(text).map_err(|e| AnalyzerError::ConfigParse(e.to_string()))?;
    let mut cfg = AppConfig::default();
    merge_partial_config(&mut cfg, partial);
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(github) = partial.github {
        if let Some(value) = github.api_base {
            cfg.github.api_base = value;
        }
        if let Some(value) = github.owner {
            cfg.github.owner = Some(value);
        }
        if let Some(value) = github.per_page {
            cfg.github.per_page = value;
        }
        if let Some(value) = github.rate_limit_warn_below {
            cfg.github.rate_limit_warn_below = value;
        }
        if let Some(value) = github.request_timeout_seconds {
            cfg.github.request_timeout_seconds = value;
        }
    }

    if let Some(railway) = partial.railway {
        if let Some(value) = railway.program {
            cfg.railway.program = value;
        }
        if let Some(value) = railway.status_timeout_seconds {
            cfg.railway.status_timeout_seconds = value;
        }
        if let Some(value) = railway.logs_timeout_seconds {
            cfg.railway.logs_timeout_seconds = value;
        }
        if let Some(value) = railway.log_lines {
            cfg.railway.log_lines = value;
        }
    }

    if let Some(run) = partial.run {
        if let Some(value) = run.pause_millis {
            cfg.run.pause_millis = value;
        }
        if let Some(value) = run.excerpt_lines {
            cfg.run.excerpt_lines = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(value) = logging.path {
            cfg.logging.path = Some(value);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }

    if let Some(catalog) = partial.catalog {
        if let Some(categories) = catalog.categories {
            cfg.catalog.categories = categories;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(owner) = &overrides.owner {
        cfg.github.owner = Some(owner.clone());
    }
    if let Some(lines) = overrides.log_lines {
        cfg.railway.log_lines = lines;
    }
    if let Some(pause) = overrides.pause_millis {
        cfg.run.pause_millis = pause;
    }
    if let Some(program) = &overrides.railway_program {
        cfg.railway.program = program.clone();
    }
    if let Some(path) = &overrides.run_log {
        cfg.logging.path = Some(path.clone());
    }
}

pub fn validate_config(cfg: &AppConfig) -> Result<(), AnalyzerError> {
    if cfg.github.api_base.trim().is_empty() {
        return Err(AnalyzerError::InvalidConfig(
            "github.api_base must not be empty".to_string(),
        ));
    }
    if !(1..=100).contains(&cfg.github.per_page) {
        return Err(AnalyzerError::InvalidConfig(
            "github.per_page must be between 1 and 100".to_string(),
        ));
    }
    if cfg.railway.program.trim().is_empty() {
        return Err(AnalyzerError::InvalidConfig(
            "railway.program must not be empty".to_string(),
        ));
    }
    if cfg.railway.log_lines == 0 {
        return Err(AnalyzerError::InvalidConfig(
            "railway.log_lines must be greater than zero".to_string(),
        ));
    }
    if cfg.run.excerpt_lines == 0 {
        return Err(AnalyzerError::InvalidConfig(
            "run.excerpt_lines must be greater than zero".to_string(),
        ));
    }
    // Compiling the catalog checks ids, regexes, and suggestion counts.
    crate::catalog::PatternCatalog::with_specs(&cfg.catalog.categories)?;
    Ok(())
}
