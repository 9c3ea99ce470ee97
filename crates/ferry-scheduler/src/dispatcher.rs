//! Trigger handling: claim, fetch, parse, submit, wait.

use crate::failure::record_failed_build;
use crate::pool::WorkerPool;
use crate::registry::{Claim, PendingRegistry};
use chrono::Utc;
use ferry_core::{
    Build, BuildId, BuildStatus, BuildTask, Commit, CommitId, ConfigSource, DEFAULT_CONFIG_PATH,
    Error, PlanParser, Repo, Result, Store, TaskIdentity, TaskOutcome, User,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const MISSING_CONFIG: &str = "no build configuration found; one is required";
const UNDECODABLE_CONFIG: &str = "could not decode the build configuration";
const UNPARSABLE_CONFIG: &str = "could not parse the build configuration";

/// Dispatcher settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Path of the build configuration inside the repository.
    pub config_path: String,
    /// Upper bound on waiting for a build. `None` waits indefinitely.
    pub wait_timeout: Option<Duration>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            config_path: DEFAULT_CONFIG_PATH.to_string(),
            wait_timeout: None,
        }
    }
}

/// Turns build triggers into builds.
///
/// Triggers for a commit that is already being dispatched do not start a
/// second build; they wait for the first one and share its outcome.
///
/// The leader of a commit runs on its own task. A caller that stops waiting
/// (a webhook client that hung up, say) leaves the dispatch running and the
/// commit claimed until its build finishes.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn Store>,
    source: Arc<dyn ConfigSource>,
    parser: Arc<dyn PlanParser>,
    pool: Arc<WorkerPool>,
    registry: PendingRegistry,
    options: Arc<DispatchOptions>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn ConfigSource>,
        parser: Arc<dyn PlanParser>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            store,
            source,
            parser,
            pool: Arc::new(pool),
            registry: PendingRegistry::new(),
            options: Arc::new(DispatchOptions::default()),
        }
    }

    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &PendingRegistry {
        &self.registry
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// Build `commit` of the repository addressed by `slug`.
    ///
    /// Returns the id of the build that ran. Configuration that is missing,
    /// undecodable or invalid is recorded as a failed build before the error
    /// is returned.
    pub async fn process(&self, slug: &str, mut commit: Commit) -> Result<BuildId> {
        let repo = self.store.get_repo_by_slug(slug).await?;
        let user = self.store.get_user(repo.user_id).await?;

        commit.repo_id = repo.id;
        let id = TaskIdentity::new(&repo, &commit.hash);

        match self.registry.claim(id.clone()) {
            Claim::Follower(completion) => {
                debug!(task = %id, "Build already in flight, waiting for it");
                let outcome = self.with_deadline(&id, completion.wait()).await?;
                outcome.build_id().ok_or(Error::BuildFailed)
            }
            Claim::Leader(mut claim) => {
                info!(task = %id, branch = %commit.branch, "Dispatching build");
                let dispatcher = self.clone();
                let lead = tokio::spawn(async move {
                    let id = claim.identity().clone();
                    let result = dispatcher.lead(&repo, &user, commit, &id).await;
                    if let Ok(build_id) = &result {
                        claim.set_outcome(TaskOutcome::Completed(*build_id));
                    }
                    result
                });

                lead.await.unwrap_or_else(|e| {
                    error!(task = %id, error = %e, "Dispatch task failed");
                    Err(Error::Internal(format!("dispatch of {} failed: {}", id, e)))
                })
            }
        }
    }

    async fn lead(
        &self,
        repo: &Repo,
        user: &User,
        mut commit: Commit,
        id: &TaskIdentity,
    ) -> Result<BuildId> {
        let settings = self.store.get_settings().await?;

        let fetched = self
            .source
            .fetch_config(repo, user, &settings, &commit.hash, &self.options.config_path)
            .await;

        let raw = match fetched {
            Ok(raw) => raw,
            Err(err @ Error::ConfigNotFound(_)) => {
                warn!(task = %id, error = %err, "No build configuration");
                record_failed_build(self.store.as_ref(), &mut commit, MISSING_CONFIG).await?;
                return Err(err);
            }
            Err(err @ Error::ConfigDecode(_)) => {
                warn!(task = %id, error = %err, "Undecodable build configuration");
                record_failed_build(self.store.as_ref(), &mut commit, UNDECODABLE_CONFIG).await?;
                return Err(err);
            }
            Err(Error::Transport(message)) => {
                warn!(
                    task = %id,
                    error = %message,
                    "Could not reach the repository host; no build recorded"
                );
                return Err(Error::Transport(format!(
                    "{}; no build was recorded",
                    message
                )));
            }
            Err(err) => {
                warn!(task = %id, error = %err, "Could not fetch build configuration; no build recorded");
                return Err(err);
            }
        };

        let plan = match self.parser.parse(&raw, &repo.params) {
            Ok(plan) => plan,
            Err(err) => {
                let diagnostic = match &err {
                    Error::ConfigParse(diagnostic) => diagnostic.clone(),
                    other => other.to_string(),
                };
                warn!(task = %id, error = %diagnostic, "Invalid build configuration");
                let message = format!("{}: {}", UNPARSABLE_CONFIG, diagnostic);
                record_failed_build(self.store.as_ref(), &mut commit, message).await?;
                return Err(err);
            }
        };

        commit.status = BuildStatus::Pending;
        self.store.save_commit(&mut commit).await?;

        let mut build = Build::pending(commit.id);
        self.store.save_build(&mut build).await?;

        let commit_id = commit.id;
        let build_id = build.id;
        let pending = self.pool.submit(BuildTask {
            repo: repo.clone(),
            commit,
            build,
            plan,
        })?;
        debug!(task = %id, build_id = %build_id, "Build queued");

        match self.with_deadline(id, pending.wait()).await? {
            TaskOutcome::Completed(build_id) => {
                info!(task = %id, build_id = %build_id, "Build completed");
                Ok(build_id)
            }
            TaskOutcome::Failed => {
                warn!(task = %id, build_id = %build_id, "Build failed");
                if let Err(e) = self.mark_failed(commit_id, build_id).await {
                    error!(task = %id, build_id = %build_id, error = %e, "Could not record build failure");
                }
                Err(Error::BuildFailed)
            }
        }
    }

    /// Record `Failure` on a commit and build the runner left unfinished.
    async fn mark_failed(&self, commit_id: CommitId, build_id: BuildId) -> Result<()> {
        let now = Utc::now();

        let mut commit = self.store.get_commit(commit_id).await?;
        if !commit.status.is_terminal() {
            commit.status = BuildStatus::Failure;
            commit.finished = Some(now);
            commit.duration = elapsed_secs(commit.started, now);
            self.store.save_commit(&mut commit).await?;
        }

        let mut build = self.store.get_build(build_id).await?;
        if !build.status.is_terminal() {
            build.status = BuildStatus::Failure;
            build.finished = Some(now);
            build.duration = elapsed_secs(build.started, now);
            self.store.save_build(&mut build).await?;
        }

        Ok(())
    }

    async fn with_deadline<F>(&self, id: &TaskIdentity, wait: F) -> Result<TaskOutcome>
    where
        F: Future<Output = TaskOutcome>,
    {
        let Some(limit) = self.options.wait_timeout else {
            return Ok(wait.await);
        };

        tokio::time::timeout(limit, wait).await.map_err(|_| {
            warn!(task = %id, timeout = ?limit, "Gave up waiting for build");
            Error::Timeout(format!("{} did not finish within {:?}", id, limit))
        })
    }
}

fn elapsed_secs(started: Option<chrono::DateTime<Utc>>, now: chrono::DateTime<Utc>) -> i64 {
    started
        .map(|started| (now - started).num_seconds().max(0))
        .unwrap_or(0)
}
