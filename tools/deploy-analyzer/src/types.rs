use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Unknown,
    Success,
    Failed,
    NotDeployed,
}

impl DeploymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::NotDeployed => "not_deployed",
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Self::Success => "✅",
            Self::Failed => "❌",
            Self::Unknown | Self::NotDeployed => "❓",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Log text handed to the report formatter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogText {
    /// Output of the deployment log source, or its degraded placeholder.
    Fetched(String),
    /// The repository has no deployment, so no logs were requested.
    NotDeployed,
}

impl LogText {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Fetched(text) => text,
            Self::NotDeployed => "Not deployed",
        }
    }
}
