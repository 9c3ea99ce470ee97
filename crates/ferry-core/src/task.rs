//! Units of work and their deduplication key.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Build, BuildId, BuildPlan, Commit, Repo};

/// Key that identifies one build of one commit for one repository.
///
/// Built from the owning user, host, owner, repository name and commit hash.
/// Two triggers for the same commit map to the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct TaskIdentity(String);

impl TaskIdentity {
    pub fn new(repo: &Repo, hash: &str) -> Self {
        Self(format!(
            "{}@{}/{}/{}/commit/{}",
            repo.user_id, repo.host, repo.owner, repo.name, hash
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Terminal result of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed(BuildId),
    Failed,
}

impl TaskOutcome {
    pub fn build_id(self) -> Option<BuildId> {
        match self {
            TaskOutcome::Completed(id) => Some(id),
            TaskOutcome::Failed => None,
        }
    }
}

/// A build ready to hand to a worker.
#[derive(Debug, Clone)]
pub struct BuildTask {
    pub repo: Repo,
    pub commit: Commit,
    pub build: Build,
    pub plan: BuildPlan,
}
