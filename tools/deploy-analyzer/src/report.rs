use crate::classifier::Verdict;
use crate::github::RepositoryRecord;
use crate::orchestrator::RunSummary;
use crate::types::LogText;

pub const SEPARATOR_WIDTH: usize = 60;
pub const DEFAULT_EXCERPT_LINES: usize = 10;

pub fn render_report(
    repo: &RepositoryRecord,
    verdict: &Verdict,
    logs: &LogText,
    excerpt_lines: usize,
) -> String {
    let mut out = Vec::new();
    out.push(format!("📁 Repository: {}", repo.name));
    out.push(format!("🔗 Full Name: {}", repo.full_name));
    out.push(format!(
        "📝 Description: {}",
        non_empty(repo.description.as_deref()).unwrap_or("No description")
    ));
    out.push(format!(
        "💻 Language: {}",
        non_empty(repo.language.as_deref()).unwrap_or("Unknown")
    ));
    out.push(format!(
        "🔒 Visibility: {} | 🌿 Default Branch: {}",
        if repo.is_private { "private" } else { "public" },
        non_empty(repo.default_branch.as_deref()).unwrap_or("Unknown")
    ));
    out.push(format!("⭐ Stars: {} | 🍴 Forks: {}", repo.stars, repo.forks));
    out.push(format!(
        "🔄 Last Updated: {}",
        non_empty(repo.updated_at.as_deref()).unwrap_or("Unknown")
    ));
    out.push(String::new());

    out.push(format!(
        "Status: {} {}",
        verdict.status.marker(),
        verdict.status.as_str().to_ascii_uppercase()
    ));
    out.push(format!(
        "Severity: {}",
        verdict.severity.as_str().to_ascii_uppercase()
    ));
    out.push(String::new());

    if !verdict.issues.is_empty() {
        out.push("🚨 Issues Found:".to_string());
        out.extend(verdict.issues.iter().map(|issue| format!("  • {issue}")));
        out.push(String::new());
    }

    if !verdict.suggestions.is_empty() {
        out.push("💡 Remediation Suggestions:".to_string());
        out.extend(
            verdict
                .suggestions
                .iter()
                .map(|suggestion| format!("  • {suggestion}")),
        );
        out.push(String::new());
    }

    let excerpt = log_excerpt(logs, excerpt_lines);
    if !excerpt.is_empty() {
        out.push(format!("📋 Recent Logs (last {excerpt_lines} lines):"));
        out.extend(excerpt.iter().map(|line| format!("  {line}")));
        out.push(String::new());
    }

    out.push("=".repeat(SEPARATOR_WIDTH));
    out.join("\n")
}

/// Last `limit` non-blank lines of fetched logs; nothing for undeployed repos.
pub fn log_excerpt(logs: &LogText, limit: usize) -> Vec<&str> {
    let LogText::Fetched(text) = logs else {
        return Vec::new();
    };
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    let skip = lines.len().saturating_sub(limit);
    lines.into_iter().skip(skip).collect()
}

pub fn render_summary(summary: &RunSummary) -> String {
    let rule = "=".repeat(50);
    let mut out = vec![
        String::new(),
        rule.clone(),
        "📊 ANALYSIS SUMMARY".to_string(),
        rule,
        format!("Total Repositories: {}", summary.total),
        format!("✅ Successful Deployments: {}", summary.success),
        format!("❌ Failed Deployments: {}", summary.failed),
        format!("❓ Unknown/Not Deployed: {}", summary.unknown),
        format!("🚂 Railway Projects: {}", summary.deployments),
        String::new(),
    ];
    if summary.failed > 0 {
        out.push(format!(
            "🔧 {} repositories need attention!",
            summary.failed
        ));
    } else {
        out.push("🎉 All analyzed deployments are working correctly!".to_string());
    }
    out.join("\n")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
