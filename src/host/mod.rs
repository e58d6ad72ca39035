//! Source-repository host collaborator.
//!
//! Fetches the changed files of a pull request (and the PR head commit
//! for fingerprinting). Auth and missing-resource failures are
//! non-retriable; transport failures are transient.

pub mod github;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::PrFile;

pub use github::GithubHost;

/// Errors from the VCS host.
#[derive(Error, Debug)]
pub enum HostError {
    /// Credential rejected (401/403). Retrying cannot fix this.
    #[error("host authentication failed: {0}")]
    Auth(String),

    /// Repository or pull request does not exist (404).
    #[error("pull request not found: {0}")]
    NotFound(String),

    /// The repository URL does not name a repository on this host.
    #[error("invalid repository URL: {0}")]
    InvalidRepoUrl(String),

    /// Transport-level or 5xx failure; worth retrying.
    #[error("host API error: {0}")]
    Api(String),
}

impl HostError {
    /// Transient failures are retried by the executor; the rest fail
    /// the task after a single attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HostError::Api(_))
    }
}

/// Read-only view of a pull request on a VCS host.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Resolve the PR's head commit SHA, when the host exposes it.
    async fn resolve_head(
        &self,
        repo_url: &str,
        pr_number: u64,
        credential: Option<&str>,
    ) -> Result<Option<String>, HostError>;

    /// Fetch the changed files of a PR with their content at the head.
    async fn fetch_pr_files(
        &self,
        repo_url: &str,
        pr_number: u64,
        credential: Option<&str>,
    ) -> Result<Vec<PrFile>, HostError>;
}
