use crate::errors::AnalyzerError;
use crate::log_retention::RunLogSegments;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

pub const DEFAULT_DISK_BUDGET_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

static RUN_LOG: Lazy<Mutex<Option<JsonlLogger>>> = Lazy::new(|| Mutex::new(None));

/// Appends one JSON object per line to `path`. Full files are rotated to
/// numbered siblings and the oldest siblings are dropped once the log family
/// outgrows `budget_bytes`.
#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), AnalyzerError> {
        let mut line = serde_json::to_vec(&LogEvent {
            payload: cap_payload(event.payload.clone(), self.max_payload_bytes),
            ..event.clone()
        })
        .map_err(|e| AnalyzerError::Io(format!("encode run log event: {e}")))?;
        line.push(b'\n');

        let segments = RunLogSegments::for_active(&self.path)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AnalyzerError::Io(format!("{}: {e}", parent.display())))?;
        }
        segments.rotate_if_full(line.len() as u64, self.budget_bytes)?;

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(&line))
            .map_err(|e| AnalyzerError::Io(format!("{}: {e}", self.path.display())))?;

        segments.prune_to_budget(self.budget_bytes)?;
        Ok(())
    }
}

/// Routes every subsequent `append_run_log` call to `logger`.
pub fn init_run_log(logger: JsonlLogger) {
    if let Ok(mut slot) = RUN_LOG.lock() {
        *slot = Some(logger);
    }
}

pub fn close_run_log() {
    if let Ok(mut slot) = RUN_LOG.lock() {
        *slot = None;
    }
}

/// Appends one event to the process run log. Without `init_run_log` this is a
/// no-op, and write failures are swallowed: diagnostics never fail a run.
pub fn append_run_log(level: &str, event_type: &str, payload: Value) {
    let Ok(slot) = RUN_LOG.lock() else {
        return;
    };
    if let Some(logger) = slot.as_ref() {
        let _ = logger.append(&LogEvent {
            level,
            event_type,
            payload,
        });
    }
}

/// One-line progress for consoles that are not a terminal.
pub fn structured_fallback_line(scope: &str, state: &str, message: &str) -> String {
    let message = message.replace('\n', "\\n");
    format!("scope={scope} state={state} message={message} ")
}

/// Oversized payloads are replaced by a string prefix of their JSON form.
fn cap_payload(payload: Value, max_bytes: usize) -> Value {
    let encoded = payload.to_string();
    if encoded.len() <= max_bytes {
        return payload;
    }
    let mut end = max_bytes.saturating_sub(3);
    while !encoded.is_char_boundary(end) {
        end -= 1;
    }
    Value::String(format!("{}...", &encoded[..end]))
}
