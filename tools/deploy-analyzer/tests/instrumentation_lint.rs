use std::fs;
use std::path::{Path, PathBuf};

const EXCLUDED_FILES: &[&str] = &[
    "errors.rs",
    "logging.rs",
    "log_retention.rs",
    "main.rs",
    "runtime/mod.rs",
    "types.rs",
];

const INSTRUMENTATION_MARKERS: &[&str] = &["append_run_log(", "structured_fallback_line("];
const SIDE_EFFECT_MARKERS: &[&str] = &[
    "self.run(",
    ".transport.get(",
    ".list_deployments()",
    ".fetch_logs(",
    ".sleep_for(",
];

#[derive(Debug)]
struct Uninstrumented {
    path: String,
    function: String,
    marker: &'static str,
}

#[test]
fn functions_with_external_side_effects_write_run_log_events() {
    let src_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut rust_files = Vec::new();
    collect_rust_files(&src_root, &mut rust_files);
    rust_files.sort();
    assert!(!rust_files.is_empty(), "no sources under {}", src_root.display());

    let mut missing = Vec::new();
    for file in rust_files {
        let relative = file
            .strip_prefix(&src_root)
            .expect("strip prefix")
            .to_string_lossy()
            .replace('\\', "/");
        if EXCLUDED_FILES.contains(&relative.as_str()) {
            continue;
        }
        let source = fs::read_to_string(&file).expect("read source file");
        for (name, body) in function_segments(&strip_test_module(&source)) {
            let Some(marker) = SIDE_EFFECT_MARKERS
                .iter()
                .find(|marker| body.contains(*marker))
            else {
                continue;
            };
            if INSTRUMENTATION_MARKERS.iter().any(|m| body.contains(m)) {
                continue;
            }
            missing.push(Uninstrumented {
                path: relative.clone(),
                function: name,
                marker,
            });
        }
    }

    if !missing.is_empty() {
        let mut message = String::from("side effects without run log events:\n");
        for entry in &missing {
            message.push_str(&format!(
                "  - {}::{} (calls {})\n",
                entry.path, entry.function, entry.marker
            ));
        }
        panic!("{message}");
    }
}

fn collect_rust_files(dir: &Path, out: &mut Vec<PathBuf>) {
    for entry in fs::read_dir(dir).expect("read src dir") {
        let path = entry.expect("dir entry").path();
        if path.is_dir() {
            collect_rust_files(&path, out);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            out.push(path);
        }
    }
}

fn strip_test_module(source: &str) -> String {
    match source.find("#[cfg(test)]\nmod tests") {
        Some(index) => source[..index].to_string(),
        None => source.to_string(),
    }
}

/// Splits a file into (name, text) chunks starting at each `fn` line. A chunk
/// runs to the next function, which is coarse but enough for a marker scan.
fn function_segments(source: &str) -> Vec<(String, String)> {
    let mut segments: Vec<(String, String)> = Vec::new();
    for line in source.lines() {
        if let Some(name) = function_name(line) {
            segments.push((name, String::new()));
        }
        if let Some((_, body)) = segments.last_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }
    segments
}

fn function_name(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let rest = ["pub fn ", "pub(crate) fn ", "fn "]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))?;
    let name: String = rest
        .chars()
        .take_while(|ch| ch.is_alphanumeric() || *ch == '_')
        .collect();
    (!name.is_empty()).then_some(name)
}
