//! Worker that runs builds from the pool's queue.

use ferry_core::{BuildTask, Runner, TaskOutcome};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// A build task together with the channel its outcome is reported on.
pub(crate) struct Submission {
    pub task: BuildTask,
    pub reply: oneshot::Sender<TaskOutcome>,
}

/// Queue shared by every worker of a pool.
pub(crate) type SharedQueue = Arc<Mutex<mpsc::UnboundedReceiver<Submission>>>;

/// A worker that takes builds off the queue and runs them one at a time.
pub struct Worker {
    id: String,
    queue: SharedQueue,
    runner: Arc<dyn Runner>,
}

impl Worker {
    pub(crate) fn new(id: impl Into<String>, queue: SharedQueue, runner: Arc<dyn Runner>) -> Self {
        Self {
            id: id.into(),
            queue,
            runner,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run the worker loop until the queue is closed.
    pub async fn run(self) {
        info!(worker_id = %self.id, "Starting worker");

        loop {
            let next = {
                let mut queue = self.queue.lock().await;
                queue.recv().await
            };

            let Some(Submission { task, reply }) = next else {
                info!(worker_id = %self.id, "Queue closed, stopping worker");
                break;
            };

            let outcome = self.execute(task).await;

            if reply.send(outcome).is_err() {
                debug!(worker_id = %self.id, ?outcome, "Submitter stopped waiting for the build");
            }
        }
    }

    async fn execute(&self, task: BuildTask) -> TaskOutcome {
        let build_id = task.build.id;
        info!(
            worker_id = %self.id,
            repo = %task.repo.slug,
            commit = %task.commit.short_hash(),
            build_id = %build_id,
            "Running build"
        );

        // Run on its own task so a panicking runner only fails this build.
        let runner = self.runner.clone();
        let handle = tokio::spawn(async move { runner.run(&task).await });

        match handle.await {
            Ok(Ok(id)) => {
                info!(worker_id = %self.id, build_id = %id, "Build finished");
                TaskOutcome::Completed(id)
            }
            Ok(Err(e)) => {
                warn!(worker_id = %self.id, build_id = %build_id, error = %e, "Build runner failed");
                TaskOutcome::Failed
            }
            Err(e) => {
                error!(worker_id = %self.id, build_id = %build_id, error = %e, "Build runner panicked");
                TaskOutcome::Failed
            }
        }
    }
}
