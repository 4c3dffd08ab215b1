use deploy_analyzer::catalog::{CategorySpec, PatternCatalog};
use deploy_analyzer::classifier::{classify, classify_bytes, Verdict};
use deploy_analyzer::types::{DeploymentStatus, Severity};

fn fixture(path: &str) -> String {
    let full = format!("{}/tests/fixtures/{path}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&full).unwrap_or_else(|e| panic!("read {full}: {e}"))
}

fn builtin(logs: &str) -> Verdict {
    classify(logs, &PatternCatalog::builtin())
}

#[test]
fn missing_env_fixture_is_a_high_severity_failure() {
    let verdict = builtin(&fixture("logs/missing-env.log"));
    assert_eq!(verdict.status, DeploymentStatus::Failed);
    assert_eq!(verdict.severity, Severity::High);
    assert_eq!(verdict.issues, vec!["Missing required environment variables"]);
    assert_eq!(verdict.suggestions.len(), 3);
}

#[test]
fn healthy_fixture_is_a_low_severity_success() {
    let verdict = builtin(&fixture("logs/healthy.log"));
    assert_eq!(verdict.status, DeploymentStatus::Success);
    assert_eq!(verdict.severity, Severity::Low);
    assert!(verdict.issues.is_empty());
    assert!(verdict.suggestions.is_empty());
}

#[test]
fn failure_signals_win_over_success_indicators() {
    let verdict = builtin(&fixture("logs/mixed-failures.log"));
    assert_eq!(verdict.status, DeploymentStatus::Failed);
    assert_eq!(verdict.issues, vec!["Port binding issues", "Memory issues"]);
    assert_eq!(
        verdict.matched_categories,
        vec!["port_binding", "memory_issues"]
    );
}

#[test]
fn matched_issues_follow_catalog_order_not_log_order() {
    let verdict = builtin("permission denied\nconnection refused\nmodule not found");
    assert_eq!(
        verdict.issues,
        vec![
            "Build process failed",
            "Database connection issues",
            "Permission/authorization issues",
        ]
    );
}

#[test]
fn overlapping_categories_share_suggestions_without_duplicates() {
    // "connection timeout" belongs to both the database and timeout categories.
    let verdict = builtin("connection timeout while dialing postgres");
    assert_eq!(
        verdict.matched_categories,
        vec!["database_connection", "timeout_issues"]
    );
    let mut unique = verdict.suggestions.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), verdict.suggestions.len());
    assert_eq!(verdict.suggestions.len(), 8);
}

#[test]
fn empty_and_error_only_logs_fail_with_no_issues() {
    for logs in ["", "Error", "unexpected error occurred", "ERROR: boom"] {
        let verdict = builtin(logs);
        assert_eq!(verdict.status, DeploymentStatus::Failed, "{logs:?}");
        assert_eq!(verdict.severity, Severity::High, "{logs:?}");
        assert!(verdict.issues.is_empty(), "{logs:?}");
    }
}

#[test]
fn unrecognized_logs_stay_unknown() {
    let verdict = builtin("compiling assets\nwarming caches");
    assert_eq!(verdict.status, DeploymentStatus::Unknown);
    assert_eq!(verdict.severity, Severity::Low);
}

#[test]
fn classification_is_deterministic() {
    let logs = fixture("logs/mixed-failures.log");
    assert_eq!(builtin(&logs), builtin(&logs));
}

#[test]
fn invalid_utf8_is_classified_lossily() {
    let mut bytes = b"Server started on 0.0.0.0 ".to_vec();
    bytes.extend_from_slice(&[0xff, 0xfe]);
    let verdict = classify_bytes(&bytes, &PatternCatalog::builtin());
    assert_eq!(verdict.status, DeploymentStatus::Success);
}

#[test]
fn configured_categories_extend_the_builtin_catalog() {
    let catalog = PatternCatalog::with_specs(&[CategorySpec {
        id: "disk_full".to_string(),
        issue: "Disk space exhausted".to_string(),
        signatures: vec!["no space left on device".to_string()],
        suggestions: vec![
            "Clean build caches before deploying".to_string(),
            "Attach a larger volume".to_string(),
        ],
    }])
    .expect("catalog");
    assert_eq!(catalog.categories().len(), 8);

    let verdict = classify("write failed: No space left on device", &catalog);
    assert_eq!(verdict.status, DeploymentStatus::Failed);
    assert_eq!(verdict.issues, vec!["Disk space exhausted"]);
}

#[test]
fn configured_categories_cannot_shadow_builtin_ids() {
    let err = PatternCatalog::with_specs(&[CategorySpec {
        id: "memory_issues".to_string(),
        issue: "Memory".to_string(),
        signatures: vec!["oom".to_string()],
        suggestions: vec!["a".to_string(), "b".to_string()],
    }])
    .expect_err("duplicate");
    assert!(err.to_string().contains("duplicate catalog category id memory_issues"));
}
