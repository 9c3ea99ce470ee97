//! Build runner port.

use async_trait::async_trait;

use crate::{BuildId, BuildTask, Result};

/// Executes a build task to completion.
///
/// The runner owns live status updates of the task's commit and build. It
/// returns the build id once a terminal status has been recorded, whether
/// the script passed or not; an `Err` means the build could not be run or
/// recorded at all.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, task: &BuildTask) -> Result<BuildId>;
}
