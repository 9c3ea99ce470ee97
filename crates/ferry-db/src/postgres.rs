//! PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ferry_core::{
    Build, BuildId, BuildStatus, Commit, CommitId, Repo, RepoId, Result, Settings, Store, User,
    UserId,
};
use sqlx::PgPool;
use sqlx::types::Json;
use std::collections::HashMap;

use crate::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct RepoRow {
    id: i64,
    user_id: i64,
    slug: String,
    host: String,
    owner: String,
    name: String,
    url: String,
    private: bool,
    params: Json<HashMap<String, String>>,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl From<RepoRow> for Repo {
    fn from(row: RepoRow) -> Self {
        Repo {
            id: RepoId::new(row.id),
            user_id: UserId::new(row.user_id),
            slug: row.slug,
            host: row.host,
            owner: row.owner,
            name: row.name,
            url: row.url,
            private: row.private,
            params: row.params.0,
            created: row.created,
            updated: row.updated,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    login: String,
    email: String,
    github_token: Option<String>,
    bitbucket_token: Option<String>,
    bitbucket_secret: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::new(row.id),
            login: row.login,
            email: row.email,
            github_token: row.github_token,
            bitbucket_token: row.bitbucket_token,
            bitbucket_secret: row.bitbucket_secret,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CommitRow {
    id: i64,
    repo_id: i64,
    status: String,
    hash: String,
    branch: String,
    pull_request: Option<i64>,
    author: String,
    gravatar: String,
    message: String,
    timestamp: String,
    created: Option<DateTime<Utc>>,
    started: Option<DateTime<Utc>>,
    finished: Option<DateTime<Utc>>,
    duration: i64,
}

impl TryFrom<CommitRow> for Commit {
    type Error = DbError;

    fn try_from(row: CommitRow) -> DbResult<Self> {
        Ok(Commit {
            id: CommitId::new(row.id),
            repo_id: RepoId::new(row.repo_id),
            status: parse_status(&row.status)?,
            hash: row.hash,
            branch: row.branch,
            pull_request: row.pull_request.map(|n| n as u64),
            author: row.author,
            gravatar: row.gravatar,
            message: row.message,
            timestamp: row.timestamp,
            created: row.created,
            started: row.started,
            finished: row.finished,
            duration: row.duration,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BuildRow {
    id: i64,
    commit_id: i64,
    slug: String,
    status: String,
    stdout: String,
    created: Option<DateTime<Utc>>,
    started: Option<DateTime<Utc>>,
    finished: Option<DateTime<Utc>>,
    duration: i64,
}

impl TryFrom<BuildRow> for Build {
    type Error = DbError;

    fn try_from(row: BuildRow) -> DbResult<Self> {
        Ok(Build {
            id: BuildId::new(row.id),
            commit_id: CommitId::new(row.commit_id),
            slug: row.slug,
            status: parse_status(&row.status)?,
            stdout: row.stdout,
            created: row.created,
            started: row.started,
            finished: row.finished,
            duration: row.duration,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SettingsRow {
    github_api_url: String,
    bitbucket_api_url: String,
    bitbucket_key: Option<String>,
    bitbucket_secret: Option<String>,
}

fn parse_status(status: &str) -> DbResult<BuildStatus> {
    status.parse().map_err(DbError::Invalid)
}

fn not_found_unless_updated(rows: u64, what: impl FnOnce() -> String) -> DbResult<()> {
    if rows == 0 {
        return Err(DbError::NotFound(what()));
    }
    Ok(())
}

/// Store backed by PostgreSQL.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_repo(&self, repo: &Repo) -> DbResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO repos (user_id, slug, host, owner, name, url, private, params, created, updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(repo.user_id.get())
        .bind(&repo.slug)
        .bind(&repo.host)
        .bind(&repo.owner)
        .bind(&repo.name)
        .bind(&repo.url)
        .bind(repo.private)
        .bind(Json(&repo.params))
        .bind(repo.created)
        .bind(repo.updated)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| duplicate_or(e, || format!("repo {}", repo.slug)))?;
        Ok(id)
    }

    async fn update_repo(&self, repo: &Repo) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE repos
            SET user_id = $2, slug = $3, host = $4, owner = $5, name = $6, url = $7,
                private = $8, params = $9, updated = NOW()
            WHERE id = $1
            "#,
        )
        .bind(repo.id.get())
        .bind(repo.user_id.get())
        .bind(&repo.slug)
        .bind(&repo.host)
        .bind(&repo.owner)
        .bind(&repo.name)
        .bind(&repo.url)
        .bind(repo.private)
        .bind(Json(&repo.params))
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_or(e, || format!("repo {}", repo.slug)))?;
        not_found_unless_updated(result.rows_affected(), || format!("repo {}", repo.id))
    }

    async fn insert_commit(&self, commit: &Commit) -> DbResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO commits (repo_id, status, hash, branch, pull_request, author, gravatar,
                                 message, timestamp, created, started, finished, duration)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            "#,
        )
        .bind(commit.repo_id.get())
        .bind(commit.status.as_str())
        .bind(&commit.hash)
        .bind(&commit.branch)
        .bind(commit.pull_request.map(|n| n as i64))
        .bind(&commit.author)
        .bind(&commit.gravatar)
        .bind(&commit.message)
        .bind(&commit.timestamp)
        .bind(commit.created)
        .bind(commit.started)
        .bind(commit.finished)
        .bind(commit.duration)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn update_commit(&self, commit: &Commit) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE commits
            SET status = $2, branch = $3, pull_request = $4, author = $5, gravatar = $6,
                message = $7, timestamp = $8, created = $9, started = $10, finished = $11,
                duration = $12
            WHERE id = $1
            "#,
        )
        .bind(commit.id.get())
        .bind(commit.status.as_str())
        .bind(&commit.branch)
        .bind(commit.pull_request.map(|n| n as i64))
        .bind(&commit.author)
        .bind(&commit.gravatar)
        .bind(&commit.message)
        .bind(&commit.timestamp)
        .bind(commit.created)
        .bind(commit.started)
        .bind(commit.finished)
        .bind(commit.duration)
        .execute(&self.pool)
        .await?;
        not_found_unless_updated(result.rows_affected(), || format!("commit {}", commit.id))
    }

    async fn insert_build(&self, build: &Build) -> DbResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO builds (commit_id, slug, status, stdout, created, started, finished, duration)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(build.commit_id.get())
        .bind(&build.slug)
        .bind(build.status.as_str())
        .bind(&build.stdout)
        .bind(build.created)
        .bind(build.started)
        .bind(build.finished)
        .bind(build.duration)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn update_build(&self, build: &Build) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE builds
            SET status = $2, stdout = $3, created = $4, started = $5, finished = $6, duration = $7
            WHERE id = $1
            "#,
        )
        .bind(build.id.get())
        .bind(build.status.as_str())
        .bind(&build.stdout)
        .bind(build.created)
        .bind(build.started)
        .bind(build.finished)
        .bind(build.duration)
        .execute(&self.pool)
        .await?;
        not_found_unless_updated(result.rows_affected(), || format!("build {}", build.id))
    }
}

fn duplicate_or(err: sqlx::Error, what: impl FnOnce() -> String) -> DbError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => DbError::Duplicate(what()),
        _ => DbError::Database(err),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_repo_by_slug(&self, slug: &str) -> Result<Repo> {
        let row = sqlx::query_as::<_, RepoRow>("SELECT * FROM repos WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?
            .ok_or_else(|| DbError::NotFound(format!("repo {}", slug)))?;
        Ok(row.into())
    }

    async fn get_repo(&self, id: RepoId) -> Result<Repo> {
        let row = sqlx::query_as::<_, RepoRow>("SELECT * FROM repos WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?
            .ok_or_else(|| DbError::NotFound(format!("repo {}", id)))?;
        Ok(row.into())
    }

    async fn save_repo(&self, repo: &mut Repo) -> Result<()> {
        if repo.id.is_assigned() {
            self.update_repo(repo).await?;
        } else {
            repo.id = RepoId::new(self.insert_repo(repo).await?);
        }
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?
            .ok_or_else(|| DbError::NotFound(format!("user {}", id)))?;
        Ok(row.into())
    }

    async fn save_user(&self, user: &mut User) -> Result<()> {
        if user.id.is_assigned() {
            let result = sqlx::query(
                r#"
                UPDATE users
                SET login = $2, email = $3, github_token = $4, bitbucket_token = $5,
                    bitbucket_secret = $6
                WHERE id = $1
                "#,
            )
            .bind(user.id.get())
            .bind(&user.login)
            .bind(&user.email)
            .bind(&user.github_token)
            .bind(&user.bitbucket_token)
            .bind(&user.bitbucket_secret)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
            not_found_unless_updated(result.rows_affected(), || format!("user {}", user.id))?;
        } else {
            let id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO users (login, email, github_token, bitbucket_token, bitbucket_secret)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(&user.login)
            .bind(&user.email)
            .bind(&user.github_token)
            .bind(&user.bitbucket_token)
            .bind(&user.bitbucket_secret)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::from)?;
            user.id = UserId::new(id);
        }
        Ok(())
    }

    async fn get_commit(&self, id: CommitId) -> Result<Commit> {
        let row = sqlx::query_as::<_, CommitRow>("SELECT * FROM commits WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?
            .ok_or_else(|| DbError::NotFound(format!("commit {}", id)))?;
        Ok(row.try_into()?)
    }

    async fn list_commits(&self, repo_id: RepoId) -> Result<Vec<Commit>> {
        let rows = sqlx::query_as::<_, CommitRow>(
            "SELECT * FROM commits WHERE repo_id = $1 ORDER BY id DESC",
        )
        .bind(repo_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        let commits = rows
            .into_iter()
            .map(Commit::try_from)
            .collect::<DbResult<Vec<_>>>()?;
        Ok(commits)
    }

    async fn save_commit(&self, commit: &mut Commit) -> Result<()> {
        if commit.id.is_assigned() {
            self.update_commit(commit).await?;
        } else {
            commit.id = CommitId::new(self.insert_commit(commit).await?);
        }
        Ok(())
    }

    async fn get_build(&self, id: BuildId) -> Result<Build> {
        let row = sqlx::query_as::<_, BuildRow>("SELECT * FROM builds WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?
            .ok_or_else(|| DbError::NotFound(format!("build {}", id)))?;
        Ok(row.try_into()?)
    }

    async fn list_builds(&self, commit_id: CommitId) -> Result<Vec<Build>> {
        let rows =
            sqlx::query_as::<_, BuildRow>("SELECT * FROM builds WHERE commit_id = $1 ORDER BY id")
                .bind(commit_id.get())
                .fetch_all(&self.pool)
                .await
                .map_err(DbError::from)?;
        let builds = rows
            .into_iter()
            .map(Build::try_from)
            .collect::<DbResult<Vec<_>>>()?;
        Ok(builds)
    }

    async fn save_build(&self, build: &mut Build) -> Result<()> {
        if build.id.is_assigned() {
            self.update_build(build).await?;
        } else {
            build.id = BuildId::new(self.insert_build(build).await?);
        }
        Ok(())
    }

    async fn get_settings(&self) -> Result<Settings> {
        let row = sqlx::query_as::<_, SettingsRow>(
            "SELECT github_api_url, bitbucket_api_url, bitbucket_key, bitbucket_secret FROM settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(match row {
            Some(row) => Settings {
                github_api_url: row.github_api_url,
                bitbucket_api_url: row.bitbucket_api_url,
                bitbucket_key: row.bitbucket_key,
                bitbucket_secret: row.bitbucket_secret,
            },
            None => Settings::default(),
        })
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (id, github_api_url, bitbucket_api_url, bitbucket_key, bitbucket_secret)
            VALUES (1, $1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET github_api_url = EXCLUDED.github_api_url,
                bitbucket_api_url = EXCLUDED.bitbucket_api_url,
                bitbucket_key = EXCLUDED.bitbucket_key,
                bitbucket_secret = EXCLUDED.bitbucket_secret
            "#,
        )
        .bind(&settings.github_api_url)
        .bind(&settings.bitbucket_api_url)
        .bind(&settings.bitbucket_key)
        .bind(&settings.bitbucket_secret)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(())
    }
}
