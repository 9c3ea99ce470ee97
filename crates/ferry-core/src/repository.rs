//! Repository, user and settings records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{RepoId, UserId};

/// Host name that selects the Bitbucket API instead of GitHub.
pub const BITBUCKET_HOST: &str = "bitbucket.org";

/// A connected repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub id: RepoId,
    /// Owning user; builds run with this user's provider credentials.
    pub user_id: UserId,
    /// `host/owner/name`, the key triggers use to address the repository.
    pub slug: String,
    pub host: String,
    pub owner: String,
    pub name: String,
    /// Clone URL handed to the runner.
    pub url: String,
    pub private: bool,
    /// Values injected into the build configuration before parsing.
    pub params: HashMap<String, String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Repo {
    /// Create an unsaved repository record for `host/owner/name`.
    pub fn new(
        user_id: UserId,
        host: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let host = host.into();
        let owner = owner.into();
        let name = name.into();
        let now = Utc::now();
        Self {
            id: RepoId::default(),
            user_id,
            slug: Self::make_slug(&host, &owner, &name),
            url: format!("https://{}/{}/{}.git", host, owner, name),
            host,
            owner,
            name,
            private: false,
            params: HashMap::new(),
            created: now,
            updated: now,
        }
    }

    pub fn make_slug(host: &str, owner: &str, name: &str) -> String {
        format!("{}/{}/{}", host, owner, name)
    }

    pub fn is_bitbucket(&self) -> bool {
        self.host == BITBUCKET_HOST
    }
}

/// A user whose provider credentials are used to fetch configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub email: String,
    pub github_token: Option<String>,
    pub bitbucket_token: Option<String>,
    pub bitbucket_secret: Option<String>,
}

/// System-wide provider settings kept in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub github_api_url: String,
    pub bitbucket_api_url: String,
    pub bitbucket_key: Option<String>,
    pub bitbucket_secret: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            github_api_url: "https://api.github.com".to_string(),
            bitbucket_api_url: "https://api.bitbucket.org".to_string(),
            bitbucket_key: None,
            bitbucket_secret: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_repo_derives_slug_and_url() {
        let repo = Repo::new(UserId::new(1), "github.com", "acme", "widgets");
        assert_eq!(repo.slug, "github.com/acme/widgets");
        assert_eq!(repo.url, "https://github.com/acme/widgets.git");
        assert!(!repo.id.is_assigned());
        assert!(!repo.is_bitbucket());
    }

    #[test]
    fn test_bitbucket_host() {
        let repo = Repo::new(UserId::new(1), BITBUCKET_HOST, "acme", "widgets");
        assert!(repo.is_bitbucket());
    }
}
