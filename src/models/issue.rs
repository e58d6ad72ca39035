//! Issue types representing review results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational suggestion.
    Info,
    /// Potential issue that should be addressed.
    Warning,
    /// Critical issue that must be fixed.
    Error,
}

/// Custom deserializer for Severity that accepts common LLM variations.
///
/// LLMs sometimes return severity values like "Critical", "Major", "Minor",
/// "High", "Medium", "Low", "Note" instead of the expected "error",
/// "warning", "info". This normalizes them.
impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "info" | "note" | "suggestion" | "low" | "minor" | "trivial" | "style"
                => Ok(Severity::Info),
            "warning" | "warn" | "medium" | "moderate" | "major"
                => Ok(Severity::Warning),
            "error" | "critical" | "high" | "severe" | "blocker" | "fatal"
                => Ok(Severity::Error),
            _ => {
                // Fall back to warning for unrecognised severities rather than failing
                Ok(Severity::Warning)
            }
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single issue found in a reviewed file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Issue {
    /// The file path the issue refers to.
    pub file: String,
    /// The line number in the file (1-based).
    pub line: u32,
    /// The severity of the issue.
    pub severity: Severity,
    /// Issue category, e.g. "bug", "security", "style".
    #[serde(rename = "type")]
    pub kind: String,
    /// Detailed explanation of the issue.
    pub description: String,
    /// Suggested fix or improvement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Aggregate statistics for a completed review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    /// Number of files that were analyzed.
    pub total_files: usize,
    /// Total issues across all files.
    pub total_issues: usize,
    /// Issues with `error` severity.
    pub critical_issues: usize,
    pub warnings: usize,
    pub info: usize,
}

impl ReviewSummary {
    /// Compute a summary over a file count and its issues.
    pub fn compute(total_files: usize, issues: &[Issue]) -> Self {
        let mut s = ReviewSummary {
            total_files,
            ..Default::default()
        };
        for issue in issues {
            s.total_issues += 1;
            match issue.severity {
                Severity::Error => s.critical_issues += 1,
                Severity::Warning => s.warnings += 1,
                Severity::Info => s.info += 1,
            }
        }
        s
    }
}

/// The aggregated result of one completed review task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewReport {
    /// Per-file issues, in file order.
    pub issues: Vec<Issue>,
    pub summary: ReviewSummary,
}

impl ReviewReport {
    /// Build a report from the analyzed file count and collected issues.
    pub fn new(total_files: usize, issues: Vec<Issue>) -> Self {
        let summary = ReviewSummary::compute(total_files, &issues);
        Self { issues, summary }
    }
}
