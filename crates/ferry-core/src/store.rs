//! Persistence port.

use async_trait::async_trait;

use crate::{Build, BuildId, Commit, CommitId, Repo, RepoId, Result, Settings, User, UserId};

/// Record store for repositories, users, commits, builds and settings.
///
/// Saving a record with an unassigned id inserts it and writes the new id
/// back into the record; saving an assigned id updates it in place.
/// Lookups of missing records fail with [`crate::Error::NotFound`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_repo_by_slug(&self, slug: &str) -> Result<Repo>;
    async fn get_repo(&self, id: RepoId) -> Result<Repo>;
    async fn save_repo(&self, repo: &mut Repo) -> Result<()>;

    async fn get_user(&self, id: UserId) -> Result<User>;
    async fn save_user(&self, user: &mut User) -> Result<()>;

    async fn get_commit(&self, id: CommitId) -> Result<Commit>;
    /// Commits of a repository, newest first.
    async fn list_commits(&self, repo_id: RepoId) -> Result<Vec<Commit>>;
    async fn save_commit(&self, commit: &mut Commit) -> Result<()>;

    async fn get_build(&self, id: BuildId) -> Result<Build>;
    async fn list_builds(&self, commit_id: CommitId) -> Result<Vec<Build>>;
    async fn save_build(&self, build: &mut Build) -> Result<()>;

    async fn get_settings(&self) -> Result<Settings>;
    async fn save_settings(&self, settings: &Settings) -> Result<()>;
}
