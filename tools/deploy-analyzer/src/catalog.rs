use crate::errors::AnalyzerError;
use crate::logging::append_run_log;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;

struct BuiltinCategory {
    id: &'static str,
    issue: &'static str,
    signatures: &'static [&'static str],
    suggestions: &'static [&'static str],
}

const BUILTIN_CATEGORIES: &[BuiltinCategory] = &[
    BuiltinCategory {
        id: "missing_env_vars",
        issue: "Missing required environment variables",
        signatures: &[
            r"missing environment variable",
            r"environment variable.*not set",
            r"OPENAI_API_KEY.*not found",
            r"API_KEY.*undefined",
            r"required.*environment.*variable",
        ],
        suggestions: &[
            "Add missing environment variables in Railway dashboard",
            "Check your .env file is properly configured",
            "Verify all required API keys are set",
        ],
    },
    BuiltinCategory {
        id: "port_binding",
        issue: "Port binding issues",
        signatures: &[
            r"port.*binding.*failed",
            r"port.*not.*bound",
            r"listen.*EADDRINUSE",
            r"address.*already.*in.*use",
            r"PORT.*environment.*variable",
        ],
        suggestions: &[
            "Use process.env.PORT in your application",
            "Don't hardcode port numbers",
            "Check if another process is using the port",
        ],
    },
    BuiltinCategory {
        id: "build_failure",
        issue: "Build process failed",
        signatures: &[
            r"build.*failed",
            r"npm.*install.*error",
            r"yarn.*install.*error",
            r"pip.*install.*error",
            r"dependency.*not.*found",
            r"module.*not.*found",
        ],
        suggestions: &[
            "Check package.json/dependencies for errors",
            "Update package-lock.json or yarn.lock",
            "Verify all dependencies are compatible",
            "Check for syntax errors in your code",
        ],
    },
    BuiltinCategory {
        id: "database_connection",
        issue: "Database connection issues",
        signatures: &[
            r"database.*connection.*failed",
            r"connection.*refused",
            r"database.*not.*found",
            r"authentication.*failed",
            r"connection.*timeout",
        ],
        suggestions: &[
            "Check database credentials in environment variables",
            "Verify database service is running",
            "Check network connectivity to database",
            "Verify database URL format",
        ],
    },
    BuiltinCategory {
        id: "memory_issues",
        issue: "Memory issues",
        signatures: &[
            r"out.*of.*memory",
            r"memory.*limit.*exceeded",
            r"heap.*out.*of.*memory",
            r"allocation.*failed",
        ],
        suggestions: &[
            "Optimize memory usage in your application",
            "Consider upgrading Railway plan",
            "Implement memory-efficient algorithms",
            "Add memory monitoring",
        ],
    },
    BuiltinCategory {
        id: "timeout_issues",
        issue: "Timeout issues",
        signatures: &[
            r"timeout",
            r"request.*timed.*out",
            r"connection.*timeout",
            r"operation.*timed.*out",
        ],
        suggestions: &[
            "Increase timeout values in your application",
            "Optimize slow database queries",
            "Implement proper error handling for timeouts",
            "Check external API response times",
        ],
    },
    BuiltinCategory {
        id: "permission_issues",
        issue: "Permission/authorization issues",
        signatures: &[
            r"permission.*denied",
            r"access.*denied",
            r"unauthorized",
            r"forbidden",
            r"insufficient.*permissions",
        ],
        suggestions: &[
            "Check API key permissions",
            "Verify service account permissions",
            "Review authentication configuration",
            "Check file system permissions",
        ],
    },
];

const SUCCESS_INDICATORS: &[&str] = &[
    r"deployment.*successful",
    r"build.*completed",
    r"server.*started",
    r"listening.*on.*port",
    r"application.*ready",
];

static BUILTIN: Lazy<PatternCatalog> = Lazy::new(|| {
    let categories = BUILTIN_CATEGORIES
        .iter()
        .map(|builtin| {
            FailureCategory::new(
                builtin.id,
                builtin.issue,
                builtin.signatures,
                builtin.suggestions,
            )
        })
        .collect::<Result<Vec<_>, _>>();
    let success_indicators = compile_all("success", SUCCESS_INDICATORS);
    match (categories, success_indicators) {
        (Ok(categories), Ok(success_indicators)) => PatternCatalog {
            categories,
            success_indicators,
        },
        // Unreachable while the tables above compile; covered by tests.
        _ => PatternCatalog::default(),
    }
});

/// Declarative form of a category, as written under `[[catalog.categories]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategorySpec {
    pub id: String,
    pub issue: String,
    pub signatures: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FailureCategory {
    pub id: String,
    pub issue: String,
    pub signatures: Vec<Regex>,
    pub suggestions: Vec<String>,
}

impl FailureCategory {
    pub fn new<S: AsRef<str>, T: AsRef<str>>(
        id: &str,
        issue: &str,
        signatures: &[S],
        suggestions: &[T],
    ) -> Result<Self, AnalyzerError> {
        Ok(Self {
            id: id.to_string(),
            issue: issue.to_string(),
            signatures: compile_all(id, signatures)?,
            suggestions: suggestions
                .iter()
                .map(|s| s.as_ref().to_string())
                .collect(),
        })
    }

    pub fn from_spec(spec: &CategorySpec) -> Result<Self, AnalyzerError> {
        if spec.id.trim().is_empty() {
            return Err(AnalyzerError::InvalidConfig(
                "catalog category id must not be empty".to_string(),
            ));
        }
        if spec.signatures.is_empty() {
            return Err(AnalyzerError::InvalidConfig(format!(
                "catalog category {} needs at least one signature",
                spec.id
            )));
        }
        if spec.suggestions.len() < 2 {
            return Err(AnalyzerError::InvalidConfig(format!(
                "catalog category {} needs at least two suggestions",
                spec.id
            )));
        }
        Self::new(&spec.id, &spec.issue, &spec.signatures, &spec.suggestions)
    }

    /// True when any signature occurs anywhere in `text`.
    pub fn matches(&self, text: &str) -> bool {
        self.signatures.iter().any(|signature| signature.is_match(text))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternCatalog {
    categories: Vec<FailureCategory>,
    success_indicators: Vec<Regex>,
}

impl PatternCatalog {
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    pub fn categories(&self) -> &[FailureCategory] {
        &self.categories
    }

    pub fn category(&self, id: &str) -> Option<&FailureCategory> {
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn with_category(mut self, category: FailureCategory) -> Result<Self, AnalyzerError> {
        if self.category(&category.id).is_some() {
            return Err(AnalyzerError::InvalidConfig(format!(
                "duplicate catalog category id {}",
                category.id
            )));
        }
        self.categories.push(category);
        Ok(self)
    }

    /// Builtin catalog followed by the configured categories, in file order.
    pub fn with_specs(specs: &[CategorySpec]) -> Result<Self, AnalyzerError> {
        let mut catalog = Self::builtin();
        let mut seen = BTreeSet::new();
        for spec in specs {
            if !seen.insert(spec.id.clone()) {
                return Err(AnalyzerError::InvalidConfig(format!(
                    "duplicate catalog category id {}",
                    spec.id
                )));
            }
            catalog = catalog.with_category(FailureCategory::from_spec(spec)?)?;
        }
        append_run_log(
            "debug",
            "catalog.loaded",
            json!({
                "category_count": catalog.categories.len(),
                "configured_count": specs.len(),
            }),
        );
        Ok(catalog)
    }

    pub fn has_success_indicator(&self, text: &str) -> bool {
        self.success_indicators
            .iter()
            .any(|indicator| indicator.is_match(text))
    }
}

fn compile_all<S: AsRef<str>>(owner: &str, patterns: &[S]) -> Result<Vec<Regex>, AnalyzerError> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern.as_ref())
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    AnalyzerError::InvalidConfig(format!(
                        "invalid signature {:?} in {owner}: {e}",
                        pattern.as_ref()
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_compiles_every_category_in_order() {
        let catalog = PatternCatalog::builtin();
        let ids: Vec<_> = catalog.categories().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "missing_env_vars",
                "port_binding",
                "build_failure",
                "database_connection",
                "memory_issues",
                "timeout_issues",
                "permission_issues",
            ]
        );
        for (category, builtin) in catalog.categories().iter().zip(BUILTIN_CATEGORIES) {
            assert_eq!(category.signatures.len(), builtin.signatures.len());
            assert!(category.suggestions.len() >= 2, "{}", category.id);
        }
        assert_eq!(catalog.success_indicators.len(), SUCCESS_INDICATORS.len());
    }

    #[test]
    fn signatures_are_case_insensitive_and_unanchored() {
        let catalog = PatternCatalog::builtin();
        let ports = catalog.category("port_binding").expect("category");
        assert!(ports.matches("2024-01-01 listen eaddrinuse: :::3000"));
        assert!(ports.matches("Error: ADDRESS ALREADY IN USE"));
        assert!(!ports.matches("bound to port 3000"));
    }

    #[test]
    fn signatures_do_not_span_lines() {
        let catalog = PatternCatalog::builtin();
        let perms = catalog.category("permission_issues").expect("category");
        assert!(!perms.matches("permission granted\nrequest denied"));
        assert!(perms.matches("permission was denied"));
    }

    #[test]
    fn configured_categories_extend_the_builtin_table() {
        let spec = CategorySpec {
            id: "disk_full".to_string(),
            issue: "Disk space exhausted".to_string(),
            signatures: vec!["no space left on device".to_string()],
            suggestions: vec![
                "Clean up build artifacts".to_string(),
                "Attach a larger volume".to_string(),
            ],
        };
        let catalog = PatternCatalog::with_specs(&[spec]).expect("catalog");
        assert_eq!(catalog.categories().len(), BUILTIN_CATEGORIES.len() + 1);
        let last = catalog.categories().last().expect("last");
        assert_eq!(last.id, "disk_full");
        assert!(last.matches("write /tmp/x: No Space Left On Device"));
    }

    #[test]
    fn configured_categories_are_validated() {
        let mut spec = CategorySpec {
            id: "memory_issues".to_string(),
            issue: "dup".to_string(),
            signatures: vec!["x".to_string()],
            suggestions: vec!["a".to_string(), "b".to_string()],
        };
        let err = PatternCatalog::with_specs(&[spec.clone()]).expect_err("duplicate");
        assert!(err.to_string().contains("duplicate catalog category id"));

        spec.id = "broken".to_string();
        spec.signatures = vec!["(unclosed".to_string()];
        let err = PatternCatalog::with_specs(&[spec.clone()]).expect_err("bad regex");
        assert!(err.to_string().contains("invalid signature"));

        spec.signatures = vec!["ok".to_string()];
        spec.suggestions = vec!["only one".to_string()];
        let err = PatternCatalog::with_specs(&[spec]).expect_err("too few suggestions");
        assert!(err.to_string().contains("at least two suggestions"));
    }
}
