//! Test doubles for exercising routes against a real dispatcher.

use async_trait::async_trait;
use bytes::Bytes;
use ferry_config::YamlParser;
use ferry_core::{
    BuildId, BuildTask, ConfigSource, Error, Repo, Result, Runner, Settings, Store, User,
};
use ferry_db::MemoryStore;
use ferry_scheduler::{Dispatcher, WorkerPool};
use std::sync::Arc;

use crate::AppState;

#[derive(Debug, Clone, Copy)]
pub enum SourceReply {
    Valid,
    Missing,
}

struct StaticSource(SourceReply);

#[async_trait]
impl ConfigSource for StaticSource {
    async fn fetch_config(
        &self,
        repo: &Repo,
        _user: &User,
        _settings: &Settings,
        hash: &str,
        path: &str,
    ) -> Result<Bytes> {
        match self.0 {
            SourceReply::Valid => Ok(Bytes::from_static(
                b"image: rust:1.85\nscript:\n  - cargo test\n",
            )),
            SourceReply::Missing => Err(Error::ConfigNotFound(format!(
                "{} at {} in {}",
                path, hash, repo.slug
            ))),
        }
    }
}

/// Runner that finishes every build immediately.
struct InstantRunner;

#[async_trait]
impl Runner for InstantRunner {
    async fn run(&self, task: &BuildTask) -> Result<BuildId> {
        Ok(task.build.id)
    }
}

/// State with a dispatcher over an in-memory store holding
/// `github.com/acme/widgets`.
pub async fn test_state(reply: SourceReply) -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());

    let mut user = User {
        login: "acme-bot".to_string(),
        ..Default::default()
    };
    store.save_user(&mut user).await.unwrap();
    let mut repo = Repo::new(user.id, "github.com", "acme", "widgets");
    store.save_repo(&mut repo).await.unwrap();

    let pool = WorkerPool::start(1, Arc::new(InstantRunner)).unwrap();
    let dispatcher = Dispatcher::new(
        store.clone(),
        Arc::new(StaticSource(reply)),
        Arc::new(YamlParser),
        pool,
    );

    (AppState::new(Arc::new(dispatcher)), store)
}
