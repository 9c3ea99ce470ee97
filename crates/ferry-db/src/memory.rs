//! In-memory store.

use async_trait::async_trait;
use ferry_core::{
    Build, BuildId, Commit, CommitId, Repo, RepoId, Result, Settings, Store, User, UserId,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::DbError;

/// Store that keeps every record in process memory.
///
/// Identifiers are handed out from per-table sequences starting at 1, the
/// same way the PostgreSQL sequences do.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    repos: BTreeMap<RepoId, Repo>,
    users: BTreeMap<UserId, User>,
    commits: BTreeMap<CommitId, Commit>,
    builds: BTreeMap<BuildId, Build>,
    settings: Settings,
    last_repo: i64,
    last_user: i64,
    last_commit: i64,
    last_build: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn next(sequence: &mut i64) -> i64 {
    *sequence += 1;
    *sequence
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_repo_by_slug(&self, slug: &str) -> Result<Repo> {
        self.tables()
            .repos
            .values()
            .find(|r| r.slug == slug)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("repo {}", slug)).into())
    }

    async fn get_repo(&self, id: RepoId) -> Result<Repo> {
        self.tables()
            .repos
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("repo {}", id)).into())
    }

    async fn save_repo(&self, repo: &mut Repo) -> Result<()> {
        let mut tables = self.tables();
        if tables
            .repos
            .values()
            .any(|r| r.slug == repo.slug && r.id != repo.id)
        {
            return Err(DbError::Duplicate(format!("repo {}", repo.slug)).into());
        }
        if !repo.id.is_assigned() {
            repo.id = RepoId::new(next(&mut tables.last_repo));
        } else if !tables.repos.contains_key(&repo.id) {
            return Err(DbError::NotFound(format!("repo {}", repo.id)).into());
        }
        tables.repos.insert(repo.id, repo.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<User> {
        self.tables()
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("user {}", id)).into())
    }

    async fn save_user(&self, user: &mut User) -> Result<()> {
        let mut tables = self.tables();
        if !user.id.is_assigned() {
            user.id = UserId::new(next(&mut tables.last_user));
        } else if !tables.users.contains_key(&user.id) {
            return Err(DbError::NotFound(format!("user {}", user.id)).into());
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_commit(&self, id: CommitId) -> Result<Commit> {
        self.tables()
            .commits
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("commit {}", id)).into())
    }

    async fn list_commits(&self, repo_id: RepoId) -> Result<Vec<Commit>> {
        Ok(self
            .tables()
            .commits
            .values()
            .rev()
            .filter(|c| c.repo_id == repo_id)
            .cloned()
            .collect())
    }

    async fn save_commit(&self, commit: &mut Commit) -> Result<()> {
        let mut tables = self.tables();
        if !tables.repos.contains_key(&commit.repo_id) {
            return Err(DbError::Invalid(format!("commit references unknown repo {}", commit.repo_id)).into());
        }
        if !commit.id.is_assigned() {
            commit.id = CommitId::new(next(&mut tables.last_commit));
        } else if !tables.commits.contains_key(&commit.id) {
            return Err(DbError::NotFound(format!("commit {}", commit.id)).into());
        }
        tables.commits.insert(commit.id, commit.clone());
        Ok(())
    }

    async fn get_build(&self, id: BuildId) -> Result<Build> {
        self.tables()
            .builds
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("build {}", id)).into())
    }

    async fn list_builds(&self, commit_id: CommitId) -> Result<Vec<Build>> {
        Ok(self
            .tables()
            .builds
            .values()
            .filter(|b| b.commit_id == commit_id)
            .cloned()
            .collect())
    }

    async fn save_build(&self, build: &mut Build) -> Result<()> {
        let mut tables = self.tables();
        if !tables.commits.contains_key(&build.commit_id) {
            return Err(DbError::Invalid(format!("build references unknown commit {}", build.commit_id)).into());
        }
        if !build.id.is_assigned() {
            build.id = BuildId::new(next(&mut tables.last_build));
        } else if !tables.builds.contains_key(&build.id) {
            return Err(DbError::NotFound(format!("build {}", build.id)).into());
        }
        tables.builds.insert(build.id, build.clone());
        Ok(())
    }

    async fn get_settings(&self) -> Result<Settings> {
        Ok(self.tables().settings.clone())
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.tables().settings = settings.clone();
        Ok(())
    }
}
