//! Recording builds that never reached a worker.

use chrono::Utc;
use ferry_core::{Build, BuildStatus, Commit, Result, Store};

/// Record `commit` as failed with a single failed build carrying `message`.
///
/// Both records are stamped with the same instant and a zero duration. The
/// commit is saved first so the build can reference its id.
pub async fn record_failed_build(
    store: &dyn Store,
    commit: &mut Commit,
    message: impl Into<String>,
) -> Result<Build> {
    let now = Utc::now();

    commit.status = BuildStatus::Failure;
    commit.created = Some(now);
    commit.finished = Some(now);
    commit.duration = 0;
    store.save_commit(commit).await?;

    let mut build = Build {
        status: BuildStatus::Failure,
        stdout: message.into(),
        created: Some(now),
        started: Some(now),
        finished: Some(now),
        duration: 0,
        ..Build::pending(commit.id)
    };
    store.save_build(&mut build).await?;

    Ok(build)
}
