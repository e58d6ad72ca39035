//! Review request input and fingerprinting.
//!
//! A [`ReviewRequest`] is the immutable client input. Its [`Fingerprint`]
//! keys both the result cache and dedup: two requests with the same
//! fingerprint describe the same unit of review work.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from request validation.
///
/// Surfaced before any rate-limit budget is consumed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("repository URL must not be empty")]
    EmptyRepoUrl,

    #[error("repository URL must be an http(s) URL, got '{0}'")]
    NotAUrl(String),

    #[error("pull request number must be positive")]
    NonPositivePrNumber,
}

/// Immutable input describing one PR review.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewRequest {
    /// Repository URL, e.g. `https://github.com/user/repo`.
    pub repo_url: String,
    /// Pull request number.
    pub pr_number: u64,
    /// Optional access credential for private repositories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl fmt::Debug for ReviewRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReviewRequest")
            .field("repo_url", &self.repo_url)
            .field("pr_number", &self.pr_number)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ReviewRequest {
    /// Create a request without a credential.
    pub fn new(repo_url: impl Into<String>, pr_number: u64) -> Self {
        Self {
            repo_url: repo_url.into(),
            pr_number,
            credential: None,
        }
    }

    /// Attach an access credential.
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Check the request shape.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let url = self.repo_url.trim();
        if url.is_empty() {
            return Err(ValidationError::EmptyRepoUrl);
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ValidationError::NotAUrl(self.repo_url.clone()));
        }
        if self.pr_number == 0 {
            return Err(ValidationError::NonPositivePrNumber);
        }
        Ok(())
    }

    /// Compute the dedup/cache fingerprint for this request.
    ///
    /// Includes the PR head commit when known. Without it the fingerprint
    /// degenerates to (repo URL, PR number) and can serve stale cached
    /// results for a PR that was updated between requests; the dispatcher
    /// logs that condition instead of resolving it silently.
    pub fn fingerprint(&self, head_sha: Option<&str>) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.repo_url.trim().as_bytes());
        hasher.update(self.pr_number.to_be_bytes());
        if let Some(sha) = head_sha {
            hasher.update(sha.as_bytes());
        }
        Fingerprint(hex::encode(hasher.finalize()))
    }
}

/// Deterministic identifier derived from a review request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The hex-encoded digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short display: first 12 hex chars, enough to eyeball in logs
        write!(f, "{}", &self.0[..self.0.len().min(12)])
    }
}
