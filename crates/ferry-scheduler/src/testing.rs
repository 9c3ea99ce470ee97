//! Test doubles for the dispatcher's collaborators.

use async_trait::async_trait;
use bytes::Bytes;
use ferry_config::YamlParser;
use ferry_core::{
    BuildId, BuildPlan, BuildStatus, BuildTask, Commit, ConfigSource, Error, PlanParser, Repo,
    Result, Runner, Settings, Store, User, UserId,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Barrier, Notify};

pub const VALID_CONFIG: &str = "image: rust:1.85\nscript:\n  - cargo build\n  - cargo test\n";

/// Save a user and a `github.com/acme/widgets` repository owned by it.
pub async fn seed_repo(store: &dyn Store) -> Repo {
    let mut user = User {
        login: "acme-bot".to_string(),
        email: "bot@acme.test".to_string(),
        ..Default::default()
    };
    store.save_user(&mut user).await.unwrap();

    let mut repo = Repo::new(user.id, "github.com", "acme", "widgets");
    store.save_repo(&mut repo).await.unwrap();
    repo
}

/// A task whose build carries `id`, for driving the pool without a store.
pub fn build_task(id: i64) -> BuildTask {
    let repo = Repo::new(UserId::new(1), "github.com", "acme", "widgets");
    let mut build = ferry_core::Build::pending(ferry_core::CommitId::new(id));
    build.id = BuildId::new(id);

    BuildTask {
        repo,
        commit: Commit::new(format!("{:040x}", id), "main"),
        build,
        plan: BuildPlan {
            image: "rust:1.85".to_string(),
            script: vec!["cargo test".to_string()],
            ..Default::default()
        },
    }
}

/// Install a subscriber for the current thread so log fields are evaluated.
pub fn capture_logs() -> tracing::subscriber::DefaultGuard {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .finish();
    tracing::subscriber::set_default(subscriber)
}

/// What [`FakeSource`] answers with.
#[derive(Debug, Clone, Copy)]
pub enum SourceReply {
    Config(&'static str),
    Missing,
    Undecodable,
    Unreachable,
}

pub struct FakeSource {
    reply: SourceReply,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(reply: SourceReply) -> Self {
        Self {
            reply,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Hold every fetch until `gate` is notified.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigSource for FakeSource {
    async fn fetch_config(
        &self,
        repo: &Repo,
        _user: &User,
        _settings: &Settings,
        hash: &str,
        path: &str,
    ) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match self.reply {
            SourceReply::Config(text) => Ok(Bytes::from_static(text.as_bytes())),
            SourceReply::Missing => Err(Error::ConfigNotFound(format!(
                "{} at {} in {}",
                path, hash, repo.slug
            ))),
            SourceReply::Undecodable => {
                Err(Error::ConfigDecode("invalid base64 payload".to_string()))
            }
            SourceReply::Unreachable => Err(Error::Transport("connection refused".to_string())),
        }
    }
}

/// [`YamlParser`] that counts its calls.
#[derive(Default)]
pub struct CountingParser {
    calls: AtomicUsize,
}

impl CountingParser {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PlanParser for CountingParser {
    fn parse(&self, data: &[u8], params: &HashMap<String, String>) -> Result<BuildPlan> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        YamlParser.parse(data, params)
    }
}

/// Runner that optionally records a successful build in a store.
#[derive(Default)]
pub struct FakeRunner {
    store: Option<Arc<dyn Store>>,
    build_id: Option<BuildId>,
    delay: Option<Duration>,
    barrier: Option<Arc<Barrier>>,
    fail_all: bool,
    failing: HashSet<BuildId>,
    panicking: HashSet<BuildId>,
    runs: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the task's commit and build `Success` in `store`.
    pub fn recording_to(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Report `id` instead of the task's own build id.
    pub fn reporting(mut self, id: i64) -> Self {
        self.build_id = Some(BuildId::new(id));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every run wait until `parties` runs are in progress.
    pub fn with_barrier(mut self, parties: usize) -> Self {
        self.barrier = Some(Arc::new(Barrier::new(parties)));
        self
    }

    pub fn fail_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn fail_build(mut self, id: i64) -> Self {
        self.failing.insert(BuildId::new(id));
        self
    }

    pub fn panic_on_build(mut self, id: i64) -> Self {
        self.panicking.insert(BuildId::new(id));
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn execute(&self, task: &BuildTask) -> Result<BuildId> {
        if self.panicking.contains(&task.build.id) {
            panic!("runner crashed on build {}", task.build.id);
        }

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_all || self.failing.contains(&task.build.id) {
            return Err(Error::ExecutionFailed(format!(
                "docker daemon unavailable for build {}",
                task.build.id
            )));
        }

        if let Some(store) = &self.store {
            let now = chrono::Utc::now();

            let mut commit = store.get_commit(task.commit.id).await?;
            commit.status = BuildStatus::Success;
            commit.finished = Some(now);
            store.save_commit(&mut commit).await?;

            let mut build = store.get_build(task.build.id).await?;
            build.status = BuildStatus::Success;
            build.started = Some(now);
            build.finished = Some(now);
            build.stdout = "ok".to_string();
            store.save_build(&mut build).await?;
        }

        Ok(self.build_id.unwrap_or(task.build.id))
    }
}

#[async_trait]
impl Runner for FakeRunner {
    async fn run(&self, task: &BuildTask) -> Result<BuildId> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let result = self.execute(task).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Poll `condition` until it holds, failing the test after a second.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(1), poll)
        .await
        .expect("condition never held");
}
