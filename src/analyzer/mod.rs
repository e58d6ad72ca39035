//! Analyzer trait and LLM integration.
//!
//! The analyzer is the external AI collaborator: flaky, rate-limited,
//! and latent. The executor's whole retry/backoff policy exists to
//! tolerate this dependency's failure modes, so the error
//! classification here is what decides retried-vs-terminal.

pub mod rig;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Issue, PrFile};

/// Errors from the analyzer.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("analyzer API error: {0}")]
    ApiError(String),

    #[error("failed to parse analyzer response: {0}")]
    ParseError(String),

    #[error("analyzer not configured: {0}")]
    NotConfigured(String),
}

/// AI-backed per-file code analysis.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze one file and return the issues found in it.
    async fn analyze(&self, file: &PrFile) -> Result<Vec<Issue>, AnalyzerError>;
}

/// Check whether an analyzer error is transient and worth retrying.
///
/// Matches HTTP status codes commonly used for rate limiting and
/// temporary unavailability: 429 (Too Many Requests), 503 (Service
/// Unavailable), 529 (Overloaded), and connection/timeout errors.
///
/// Parse and configuration errors are never retried: the model is
/// likely to produce the same output again, and a missing API key
/// does not fix itself.
pub fn is_retryable(err: &AnalyzerError) -> bool {
    match err {
        AnalyzerError::ParseError(_) | AnalyzerError::NotConfigured(_) => false,
        AnalyzerError::ApiError(_) => classify_error(err).is_some(),
    }
}

/// Classifies an analyzer error into a short message.
///
/// Returns `Some(message)` for transient/retryable errors, `None` otherwise.
pub fn classify_error(err: &AnalyzerError) -> Option<&'static str> {
    match err {
        AnalyzerError::ApiError(msg) => {
            let msg_lower = msg.to_lowercase();
            if msg_lower.contains("429")
                || msg_lower.contains("rate limit")
                || msg_lower.contains("too many requests")
            {
                Some("rate limited by upstream API")
            } else if msg_lower.contains("503") || msg_lower.contains("service unavailable") {
                Some("upstream unavailable")
            } else if msg_lower.contains("529") || msg_lower.contains("overloaded") {
                Some("upstream overloaded")
            } else if msg_lower.contains("502") {
                Some("upstream gateway error")
            } else if msg_lower.contains("timeout") || msg_lower.contains("timed out") {
                Some("request timed out")
            } else if msg_lower.contains("connection") {
                Some("connection error")
            } else if msg_lower.contains("temporarily") || msg_lower.contains("try again") {
                Some("temporary upstream error")
            } else {
                None
            }
        }
        _ => None,
    }
}
