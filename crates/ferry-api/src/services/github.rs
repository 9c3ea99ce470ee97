//! GitHub API client for repository contents.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;

/// GitHub API client.
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    access_token: Option<String>,
}

impl GitHubClient {
    /// Create a client for the API rooted at `api_url`, e.g. `https://api.github.com`.
    pub fn new(client: reqwest::Client, api_url: &str, access_token: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    fn contents_url(&self, owner: &str, repo: &str, path: &str, git_ref: &str) -> String {
        let path = path
            .trim_start_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.api_url,
            urlencoding::encode(owner),
            urlencoding::encode(repo),
            path,
            urlencoding::encode(git_ref)
        )
    }

    /// Fetch the file at `path` as of `git_ref`.
    pub async fn find_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Bytes, GitHubError> {
        let url = self.contents_url(owner, repo, path, git_ref);

        let mut request = self
            .client
            .get(&url)
            .header("User-Agent", "Ferry-CI")
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.access_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| GitHubError::Request(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GitHubError::NotFound(format!(
                "{} at {} in {}/{}",
                path, git_ref, owner, repo
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GitHubError::Api(format!(
                "Failed to get contents ({}): {}",
                status, text
            )));
        }

        let content: ContentResponse = response
            .json()
            .await
            .map_err(|e| GitHubError::Parse(e.to_string()))?;

        content.decode()
    }
}

/// File entry returned by the contents API.
#[derive(Debug, Deserialize)]
pub struct ContentResponse {
    #[serde(default)]
    pub encoding: String,
    #[serde(default)]
    pub content: String,
}

impl ContentResponse {
    /// Decode the file body. GitHub wraps base64 content at 60 columns.
    pub fn decode(&self) -> Result<Bytes, GitHubError> {
        match self.encoding.as_str() {
            "base64" => {
                let compact: String = self
                    .content
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();
                STANDARD
                    .decode(compact)
                    .map(Bytes::from)
                    .map_err(|e| GitHubError::Decode(e.to_string()))
            }
            "" | "utf-8" => Ok(Bytes::from(self.content.clone())),
            other => Err(GitHubError::Decode(format!(
                "unsupported content encoding '{}'",
                other
            ))),
        }
    }
}

/// GitHub API errors.
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<GitHubError> for ferry_core::Error {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::NotFound(msg) => ferry_core::Error::ConfigNotFound(msg),
            GitHubError::Decode(msg) => ferry_core::Error::ConfigDecode(msg),
            other => ferry_core::Error::Transport(other.to_string()),
        }
    }
}
