//! Commit and build records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BuildId, CommitId, RepoId};

/// Lifecycle status shared by commits and builds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    #[default]
    Pending,
    Started,
    Success,
    Failure,
    Error,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildStatus::Success | BuildStatus::Failure | BuildStatus::Error
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Pending => "Pending",
            BuildStatus::Started => "Started",
            BuildStatus::Success => "Success",
            BuildStatus::Failure => "Failure",
            BuildStatus::Error => "Error",
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(BuildStatus::Pending),
            "Started" => Ok(BuildStatus::Started),
            "Success" => Ok(BuildStatus::Success),
            "Failure" => Ok(BuildStatus::Failure),
            "Error" => Ok(BuildStatus::Error),
            _ => Err(format!("Unknown build status: {}", s)),
        }
    }
}

/// A commit that was pushed or proposed and may be built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub repo_id: RepoId,
    pub status: BuildStatus,
    pub hash: String,
    pub branch: String,
    /// Pull request number when the commit is the head of a pull request.
    pub pull_request: Option<u64>,
    pub author: String,
    pub gravatar: String,
    pub message: String,
    /// Timestamp as reported by the provider.
    pub timestamp: String,
    pub created: Option<DateTime<Utc>>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    /// Seconds between start and finish.
    pub duration: i64,
}

impl Commit {
    /// Create a pending commit for `hash` on `branch`.
    pub fn new(hash: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            branch: branch.into(),
            created: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Set the author email and derive the gravatar hash from it.
    pub fn set_author(&mut self, email: &str) {
        self.author = email.to_string();
        self.gravatar = gravatar_hash(email);
    }

    /// Short form of the hash used in log lines: its first seven characters.
    pub fn short_hash(&self) -> &str {
        self.hash
            .char_indices()
            .nth(7)
            .map_or(&self.hash[..], |(end, _)| &self.hash[..end])
    }
}

/// One execution attempt of a commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Build {
    pub id: BuildId,
    pub commit_id: CommitId,
    pub slug: String,
    pub status: BuildStatus,
    /// Captured output, or the diagnostic when the build never started.
    pub stdout: String,
    pub created: Option<DateTime<Utc>>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub duration: i64,
}

impl Build {
    /// Create a pending build of `commit_id`.
    pub fn pending(commit_id: CommitId) -> Self {
        Self {
            commit_id,
            slug: "1".to_string(),
            created: Some(Utc::now()),
            ..Default::default()
        }
    }
}

fn gravatar_hash(email: &str) -> String {
    let normalized = email.trim().to_lowercase();
    format!("{:x}", md5::compute(normalized.as_bytes()))
}
