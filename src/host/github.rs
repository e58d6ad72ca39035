//! GitHub REST implementation of [`RepoHost`].
//!
//! Talks to api.github.com with reqwest. Only the endpoints the
//! orchestrator needs: PR metadata for the head SHA, the changed-file
//! listing, and raw content at the head commit.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::models::PrFile;

use super::{HostError, RepoHost};

const API_BASE: &str = "https://api.github.com";

/// Files larger than this are skipped rather than sent to the analyzer.
const MAX_FILE_BYTES: u64 = 512 * 1024;

/// GitHub-backed PR reader.
pub struct GithubHost {
    client: reqwest::Client,
    api_base: String,
}

#[derive(Deserialize)]
struct PullResponse {
    head: HeadRef,
}

#[derive(Deserialize)]
struct HeadRef {
    sha: String,
}

#[derive(Deserialize)]
struct ChangedFile {
    filename: String,
    status: String,
    raw_url: String,
}

impl GithubHost {
    pub fn new() -> Self {
        Self::with_api_base(API_BASE)
    }

    /// Point the client at a different API root (GitHub Enterprise,
    /// or a local server in tests).
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
        }
    }

    async fn get(
        &self,
        url: &str,
        credential: Option<&str>,
        context: &str,
    ) -> Result<reqwest::Response, HostError> {
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", crate::constants::APP_NAME)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = credential {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HostError::Api(format!("request to {url} failed: {e}")))?;

        match response.status().as_u16() {
            200..=299 => Ok(response),
            401 | 403 => Err(HostError::Auth(format!(
                "{context}: HTTP {}",
                response.status()
            ))),
            404 => Err(HostError::NotFound(context.to_string())),
            status => Err(HostError::Api(format!("{context}: HTTP {status}"))),
        }
    }
}

impl Default for GithubHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepoHost for GithubHost {
    async fn resolve_head(
        &self,
        repo_url: &str,
        pr_number: u64,
        credential: Option<&str>,
    ) -> Result<Option<String>, HostError> {
        let (owner, repo) = parse_repo_url(repo_url)?;
        let url = format!("{}/repos/{owner}/{repo}/pulls/{pr_number}", self.api_base);
        let response = self
            .get(&url, credential, &format!("{owner}/{repo}#{pr_number}"))
            .await?;
        let pull: PullResponse = response
            .json()
            .await
            .map_err(|e| HostError::Api(format!("malformed pull response: {e}")))?;
        Ok(Some(pull.head.sha))
    }

    async fn fetch_pr_files(
        &self,
        repo_url: &str,
        pr_number: u64,
        credential: Option<&str>,
    ) -> Result<Vec<PrFile>, HostError> {
        let (owner, repo) = parse_repo_url(repo_url)?;
        let context = format!("{owner}/{repo}#{pr_number}");
        let url = format!(
            "{}/repos/{owner}/{repo}/pulls/{pr_number}/files?per_page=100",
            self.api_base
        );
        let response = self.get(&url, credential, &context).await?;
        let listing: Vec<ChangedFile> = response
            .json()
            .await
            .map_err(|e| HostError::Api(format!("malformed file listing: {e}")))?;

        let mut files = Vec::with_capacity(listing.len());
        for entry in listing {
            // Deleted files have no head content to review.
            if entry.status == "removed" {
                debug!(file = %entry.filename, "skipping removed file");
                continue;
            }

            let content_response = self.get(&entry.raw_url, credential, &entry.filename).await?;
            if let Some(len) = content_response.content_length() {
                if len > MAX_FILE_BYTES {
                    debug!(file = %entry.filename, bytes = len, "skipping oversized file");
                    continue;
                }
            }
            let content = content_response
                .text()
                .await
                .map_err(|e| HostError::Api(format!("reading {}: {e}", entry.filename)))?;
            files.push(PrFile::new(entry.filename, content));
        }

        Ok(files)
    }
}

/// Extract `(owner, repo)` from a GitHub repository URL.
///
/// Accepts `https://github.com/owner/repo`, with or without a trailing
/// `.git` suffix or extra path segments.
pub fn parse_repo_url(repo_url: &str) -> Result<(String, String), HostError> {
    let stripped = repo_url
        .strip_prefix("https://")
        .or_else(|| repo_url.strip_prefix("http://"))
        .ok_or_else(|| HostError::InvalidRepoUrl(repo_url.to_string()))?;

    let mut segments = stripped.trim_end_matches('/').split('/');
    let host = segments.next().unwrap_or_default();
    if !host.contains('.') {
        return Err(HostError::InvalidRepoUrl(repo_url.to_string()));
    }

    let owner = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HostError::InvalidRepoUrl(repo_url.to_string()))?;
    let repo = segments
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches(".git"))
        .ok_or_else(|| HostError::InvalidRepoUrl(repo_url.to_string()))?;

    Ok((owner.to_string(), repo.to_string()))
}
