//! Build configuration source backed by the hosting providers.

use async_trait::async_trait;
use bytes::Bytes;
use ferry_core::{ConfigSource, Repo, Result, Settings, User};
use tracing::debug;

use super::{BitbucketClient, GitHubClient};

/// Fetches build configuration from GitHub or Bitbucket, chosen by the
/// repository's host. Every host other than `bitbucket.org` is treated as a
/// GitHub API.
#[derive(Clone, Default)]
pub struct ProviderSources {
    client: reqwest::Client,
}

impl ProviderSources {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConfigSource for ProviderSources {
    async fn fetch_config(
        &self,
        repo: &Repo,
        user: &User,
        settings: &Settings,
        hash: &str,
        path: &str,
    ) -> Result<Bytes> {
        debug!(repo = %repo.slug, hash = %hash, path = %path, "Fetching build configuration");

        if repo.is_bitbucket() {
            let client = BitbucketClient::new(
                self.client.clone(),
                &settings.bitbucket_api_url,
                user.bitbucket_token.clone(),
            );
            Ok(client.find_source(&repo.owner, &repo.name, hash, path).await?)
        } else {
            let client = GitHubClient::new(
                self.client.clone(),
                &settings.github_api_url,
                user.github_token.clone(),
            );
            Ok(client.find_content(&repo.owner, &repo.name, path, hash).await?)
        }
    }
}
