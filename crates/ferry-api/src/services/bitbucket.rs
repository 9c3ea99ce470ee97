//! Bitbucket API client for repository sources.

use bytes::Bytes;
use reqwest::StatusCode;

/// Bitbucket API client.
pub struct BitbucketClient {
    client: reqwest::Client,
    api_url: String,
    access_token: Option<String>,
}

impl BitbucketClient {
    /// Create a client for the API rooted at `api_url`, e.g. `https://api.bitbucket.org`.
    pub fn new(client: reqwest::Client, api_url: &str, access_token: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    fn source_url(&self, owner: &str, repo: &str, hash: &str, path: &str) -> String {
        let path = path
            .trim_start_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        format!(
            "{}/2.0/repositories/{}/{}/src/{}/{}",
            self.api_url,
            urlencoding::encode(owner),
            urlencoding::encode(repo),
            urlencoding::encode(hash),
            path
        )
    }

    /// Fetch the raw file at `path` as of commit `hash`.
    pub async fn find_source(
        &self,
        owner: &str,
        repo: &str,
        hash: &str,
        path: &str,
    ) -> Result<Bytes, BitbucketError> {
        let url = self.source_url(owner, repo, hash, path);

        let mut request = self.client.get(&url).header("User-Agent", "Ferry-CI");
        if let Some(token) = &self.access_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| BitbucketError::Request(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BitbucketError::NotFound(format!(
                "{} at {} in {}/{}",
                path, hash, owner, repo
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BitbucketError::Api(format!(
                "Failed to get source ({}): {}",
                status, text
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| BitbucketError::Request(e.to_string()))
    }
}

/// Bitbucket API errors.
#[derive(Debug, thiserror::Error)]
pub enum BitbucketError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    Api(String),
}

impl From<BitbucketError> for ferry_core::Error {
    fn from(err: BitbucketError) -> Self {
        match err {
            BitbucketError::NotFound(msg) => ferry_core::Error::ConfigNotFound(msg),
            other => ferry_core::Error::Transport(other.to_string()),
        }
    }
}
