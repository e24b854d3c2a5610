//! GitHub REST access used by the sync detector.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};

use crate::error::GitHubError;

/// Read-only GitHub operations the engine needs.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// HEAD commit SHA of `branch` in `repo` (`owner/repo`).
    async fn head_commit_sha(&self, repo: &str, branch: &str) -> Result<String, GitHubError>;
}

/// `GitHubApi` over the public REST API.
pub struct RestGitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<SecretString>,
}

impl RestGitHubClient {
    pub fn new(api_url: impl Into<String>, token: Option<SecretString>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn commit_url(&self, repo: &str, branch: &str) -> String {
        format!("{}/repos/{}/commits/{}", self.api_url, repo, branch)
    }
}

#[async_trait]
impl GitHubApi for RestGitHubClient {
    async fn head_commit_sha(&self, repo: &str, branch: &str) -> Result<String, GitHubError> {
        let mut request = self
            .http
            .get(self.commit_url(repo, branch))
            .header("Accept", "application/vnd.github.sha")
            .header("User-Agent", concat!("docs-onboarding/", env!("CARGO_PKG_VERSION")));
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| GitHubError::RequestFailed(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
                return Err(GitHubError::NotFound(format!("{repo}@{branch}")));
            }
            status => {
                return Err(GitHubError::RequestFailed(format!(
                    "GET commits for {repo}@{branch} returned {status}"
                )));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| GitHubError::InvalidResponse(e.to_string()))?;
        let sha = body.trim();
        if sha.is_empty() || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(GitHubError::InvalidResponse(format!(
                "expected a commit SHA, got {:?}",
                sha.chars().take(40).collect::<String>()
            )));
        }
        Ok(sha.to_string())
    }
}
