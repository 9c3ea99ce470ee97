//! Fixed-size pool of build workers.

use crate::worker::{SharedQueue, Submission, Worker};
use ferry_core::{BuildTask, Error, Result, Runner, TaskOutcome};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

/// Workers sharing one unbounded build queue.
///
/// At most `size` builds run at once; further submissions wait in the queue.
/// Each submission gets its own reply channel, so an outcome only ever
/// reaches the caller that submitted the build.
pub struct WorkerPool {
    sender: mpsc::UnboundedSender<Submission>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers on the current runtime.
    pub fn start(size: usize, runner: Arc<dyn Runner>) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidInput(
                "worker pool needs at least one worker".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let queue: SharedQueue = Arc::new(Mutex::new(receiver));

        let workers = (1..=size)
            .map(|n| {
                let worker = Worker::new(format!("worker-{}", n), queue.clone(), runner.clone());
                tokio::spawn(worker.run())
            })
            .collect();

        info!(workers = size, "Started worker pool");
        Ok(Self { sender, workers })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a build and return a handle to its outcome.
    pub fn submit(&self, task: BuildTask) -> Result<PendingBuild> {
        let (reply, outcome) = oneshot::channel();
        self.sender
            .send(Submission { task, reply })
            .map_err(|_| Error::Internal("worker pool is shut down".to_string()))?;
        Ok(PendingBuild { outcome })
    }

    /// Stop accepting builds and wait for queued ones to drain.
    pub async fn shutdown(self) {
        let Self { sender, workers } = self;
        drop(sender);

        for worker in workers {
            let _ = worker.await;
        }
        info!("Worker pool stopped");
    }
}

/// Outcome of one submitted build.
#[derive(Debug)]
pub struct PendingBuild {
    outcome: oneshot::Receiver<TaskOutcome>,
}

impl PendingBuild {
    /// Wait for the worker's report. A worker that went away counts as a
    /// failure.
    pub async fn wait(self) -> TaskOutcome {
        self.outcome.await.unwrap_or(TaskOutcome::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRunner, build_task, capture_logs};
    use ferry_core::BuildId;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let result = WorkerPool::start(0, Arc::new(FakeRunner::new()));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_outcome_reaches_submitter() {
        let pool = WorkerPool::start(2, Arc::new(FakeRunner::new())).unwrap();
        assert_eq!(pool.size(), 2);

        let first = pool.submit(build_task(11)).unwrap();
        let second = pool.submit(build_task(22)).unwrap();

        assert_eq!(second.wait().await, TaskOutcome::Completed(BuildId::new(22)));
        assert_eq!(first.wait().await, TaskOutcome::Completed(BuildId::new(11)));
    }

    #[tokio::test]
    async fn test_runner_error_fails_task_and_worker_survives() {
        let runner = FakeRunner::new().fail_build(11);
        let pool = WorkerPool::start(1, Arc::new(runner)).unwrap();

        let failed = pool.submit(build_task(11)).unwrap();
        assert_eq!(failed.wait().await, TaskOutcome::Failed);

        let next = pool.submit(build_task(12)).unwrap();
        assert_eq!(next.wait().await, TaskOutcome::Completed(BuildId::new(12)));
    }

    #[tokio::test]
    async fn test_runner_panic_fails_task_and_worker_survives() {
        let runner = FakeRunner::new().panic_on_build(11);
        let pool = WorkerPool::start(1, Arc::new(runner)).unwrap();

        let failed = pool.submit(build_task(11)).unwrap();
        assert_eq!(failed.wait().await, TaskOutcome::Failed);

        let next = pool.submit(build_task(12)).unwrap();
        assert_eq!(next.wait().await, TaskOutcome::Completed(BuildId::new(12)));
    }

    #[tokio::test]
    async fn test_non_ascii_hash_does_not_stop_worker() {
        let _logs = capture_logs();
        let pool = WorkerPool::start(1, Arc::new(FakeRunner::new())).unwrap();

        let mut task = build_task(7);
        task.commit.hash = "ééééé".to_string();
        let odd = pool.submit(task).unwrap();
        assert_eq!(odd.wait().await, TaskOutcome::Completed(BuildId::new(7)));

        let next = pool.submit(build_task(8)).unwrap();
        assert_eq!(next.wait().await, TaskOutcome::Completed(BuildId::new(8)));
    }

    #[tokio::test]
    async fn test_single_worker_runs_builds_one_at_a_time() {
        let runner = Arc::new(FakeRunner::new().with_delay(Duration::from_millis(50)));
        let pool = WorkerPool::start(1, runner.clone()).unwrap();

        let started = Instant::now();
        let first = pool.submit(build_task(1)).unwrap();
        let second = pool.submit(build_task(2)).unwrap();
        let (a, b) = tokio::join!(first.wait(), second.wait());

        assert_eq!(a, TaskOutcome::Completed(BuildId::new(1)));
        assert_eq!(b, TaskOutcome::Completed(BuildId::new(2)));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(runner.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_two_workers_run_builds_in_parallel() {
        let runner = Arc::new(FakeRunner::new().with_barrier(2));
        let pool = WorkerPool::start(2, runner.clone()).unwrap();

        let first = pool.submit(build_task(1)).unwrap();
        let second = pool.submit(build_task(2)).unwrap();

        // Both builds must be inside the runner at once to pass the barrier.
        let both = async { tokio::join!(first.wait(), second.wait()) };
        let (a, b) = tokio::time::timeout(Duration::from_secs(5), both)
            .await
            .unwrap();

        assert_eq!(a, TaskOutcome::Completed(BuildId::new(1)));
        assert_eq!(b, TaskOutcome::Completed(BuildId::new(2)));
        assert_eq!(runner.max_concurrent(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let runner = Arc::new(FakeRunner::new());
        let pool = WorkerPool::start(1, runner.clone()).unwrap();

        let pending = pool.submit(build_task(5)).unwrap();
        pool.shutdown().await;

        assert_eq!(pending.wait().await, TaskOutcome::Completed(BuildId::new(5)));
        assert_eq!(runner.runs(), 1);
    }
}
