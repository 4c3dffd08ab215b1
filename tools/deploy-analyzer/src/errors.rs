use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("process error: {0}")]
    Process(String),
    #[error("executable not found: {0}")]
    MissingExecutable(String),
    #[error("timed out after {seconds}s: {what}")]
    Timeout { what: String, seconds: u64 },
    #[error("http error: {0}")]
    Http(String),
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid run state: {0}")]
    State(String),
}
