//! Local Docker build runner.

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use chrono::{DateTime, Utc};
use ferry_core::{Build, BuildId, BuildStatus, BuildTask, Commit, Error, Result, Runner, Store};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Directory the repository is cloned into inside the build container.
pub const BUILD_DIR: &str = "/var/cache/ferry/src";

/// Runs builds in containers on the local Docker daemon.
///
/// The runner records `Started` when the container is about to be created and
/// `Success` or `Failure` from the script's exit code, with the container
/// output as the build's stdout. When the daemon itself fails the build is
/// recorded as `Error` and the error is returned.
pub struct DockerRunner {
    docker: Docker,
    store: Arc<dyn Store>,
}

/// Exit code and combined output of a finished container.
#[derive(Debug)]
struct ContainerRun {
    exit_code: i64,
    output: String,
}

impl DockerRunner {
    /// Create a runner connected to the local Docker daemon.
    pub fn new(store: Arc<dyn Store>) -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self { docker, store })
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker, store: Arc<dyn Store>) -> Self {
        Self { docker, store }
    }

    /// Whether the daemon answers.
    pub async fn ping(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    fn container_name(build_id: BuildId) -> String {
        format!("ferry-build-{}", build_id)
    }

    fn service_name(build_id: BuildId, index: usize) -> String {
        format!("ferry-build-{}-service-{}", build_id, index)
    }

    async fn pull(&self, image: &str) {
        info!(image = %image, "Pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut pull_stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = pull_stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    warn!(image = %image, error = %e, "Pull warning");
                }
            }
        }
    }

    async fn start_container(&self, name: &str, config: Config<String>) -> Result<()> {
        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };

        debug!(container = %name, "Creating container");
        self.docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| Error::ExecutionFailed(format!("Failed to create container: {}", e)))?;

        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::ExecutionFailed(format!("Failed to start container: {}", e)))?;

        Ok(())
    }

    async fn remove_container(&self, name: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        if let Err(e) = self.docker.remove_container(name, Some(options)).await {
            warn!(container = %name, error = %e, "Failed to remove container");
        }
    }

    /// Start the plan's services, the build container, and collect its output.
    async fn execute(&self, task: &BuildTask, services: &[String]) -> Result<ContainerRun> {
        for (name, image) in services.iter().zip(&task.plan.services) {
            self.pull(image).await;
            let config = Config {
                image: Some(image.clone()),
                ..Default::default()
            };
            self.start_container(name, config).await?;
        }

        self.pull(&task.plan.image).await;

        let name = Self::container_name(task.build.id);
        info!(container = %name, image = %task.plan.image, "Starting build container");
        self.start_container(&name, container_config(task, services)).await?;

        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut output = String::new();
        let mut logs = self.docker.logs(&name, Some(options));
        while let Some(line) = logs.next().await {
            match line {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(container = %name, error = %e, "Error reading container logs");
                    break;
                }
            }
        }

        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let exit_code = match self.docker.wait_container(&name, Some(options)).next().await {
            Some(Ok(response)) => response.status_code,
            // A non-zero exit is reported as an error by the daemon client.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => {
                return Err(Error::ExecutionFailed(format!("Container wait failed: {}", e)));
            }
            None => {
                return Err(Error::ExecutionFailed(
                    "Container wait returned no result".to_string(),
                ));
            }
        };

        Ok(ContainerRun { exit_code, output })
    }

    async fn save(&self, commit: &mut Commit, build: &mut Build) -> Result<()> {
        self.store.save_commit(commit).await?;
        self.store.save_build(build).await
    }
}

#[async_trait]
impl Runner for DockerRunner {
    async fn run(&self, task: &BuildTask) -> Result<BuildId> {
        let mut commit = task.commit.clone();
        let mut build = task.build.clone();

        let started = Utc::now();
        commit.status = BuildStatus::Started;
        commit.started = Some(started);
        build.status = BuildStatus::Started;
        build.started = Some(started);
        self.save(&mut commit, &mut build).await?;

        let services: Vec<String> = (0..task.plan.services.len())
            .map(|index| Self::service_name(build.id, index))
            .collect();

        let result = self.execute(task, &services).await;

        self.remove_container(&Self::container_name(build.id)).await;
        for service in &services {
            self.remove_container(service).await;
        }

        let finished = Utc::now();
        let (status, stdout) = match &result {
            Ok(run) if run.exit_code == 0 => (BuildStatus::Success, run.output.clone()),
            Ok(run) => (BuildStatus::Failure, run.output.clone()),
            Err(e) => (BuildStatus::Error, e.to_string()),
        };

        let duration = elapsed_secs(started, finished);
        commit.status = status;
        commit.finished = Some(finished);
        commit.duration = duration;
        build.status = status;
        build.finished = Some(finished);
        build.duration = duration;
        build.stdout = stdout;
        self.save(&mut commit, &mut build).await?;

        match result {
            Ok(run) => {
                info!(build_id = %build.id, exit_code = run.exit_code, status = %status, "Build finished");
                Ok(build.id)
            }
            Err(e) => Err(e),
        }
    }
}

fn elapsed_secs(started: DateTime<Utc>, finished: DateTime<Utc>) -> i64 {
    (finished - started).num_seconds().max(0)
}

/// Quote `value` for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Host name a service is reachable under from the build container.
///
/// `library/postgres:16` becomes `postgres`.
fn service_alias(image: &str) -> String {
    let name = image.rsplit('/').next().unwrap_or(image);
    let name = name.split(['@', ':']).next().unwrap_or(name);
    name.to_string()
}

/// Shell script that checks out the commit and runs the plan's commands.
fn build_script(task: &BuildTask) -> String {
    let mut steps = vec![format!(
        "git clone --quiet {} {}",
        shell_quote(&task.repo.url),
        BUILD_DIR
    )];
    steps.push(format!("cd {}", BUILD_DIR));

    match task.commit.pull_request {
        Some(number) => {
            steps.push(format!(
                "git fetch --quiet origin +refs/pull/{}/head",
                number
            ));
            steps.push("git checkout --quiet -f FETCH_HEAD".to_string());
        }
        None => steps.push(format!(
            "git checkout --quiet -f {}",
            shell_quote(&task.commit.hash)
        )),
    }

    steps.extend(task.plan.script.iter().cloned());
    steps.join(" && ")
}

/// Environment of the build container: CI variables, then the plan's own.
fn build_env(task: &BuildTask) -> Vec<String> {
    let mut env = vec![
        "CI=true".to_string(),
        "DRONE=true".to_string(),
        format!("DRONE_COMMIT={}", task.commit.hash),
        format!("DRONE_BRANCH={}", task.commit.branch),
        format!("DRONE_BUILD_DIR={}", BUILD_DIR),
    ];
    if let Some(number) = task.commit.pull_request {
        env.push(format!("DRONE_PR={}", number));
    }
    env.extend(task.plan.env.iter().cloned());
    env
}

fn container_config(task: &BuildTask, services: &[String]) -> Config<String> {
    let links: Vec<String> = services
        .iter()
        .zip(&task.plan.services)
        .map(|(name, image)| format!("{}:{}", name, service_alias(image)))
        .collect();

    let host_config = HostConfig {
        links: (!links.is_empty()).then_some(links),
        extra_hosts: (!task.plan.hosts.is_empty()).then(|| task.plan.hosts.clone()),
        ..Default::default()
    };

    Config {
        image: Some(task.plan.image.clone()),
        cmd: Some(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            build_script(task),
        ]),
        env: Some(build_env(task)),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        host_config: Some(host_config),
        ..Default::default()
    }
}


/// Integration tests that require Docker to be running.
/// Run with: cargo test -- --ignored
#[cfg(test)]
mod integration_tests {
    use super::*;
    use ferry_core::{BuildPlan, Repo, User};
    use ferry_db::MemoryStore;

    async fn seeded_task(store: &MemoryStore, script: &str) -> BuildTask {
        let mut user = User {
            login: "octocat".to_string(),
            ..Default::default()
        };
        store.save_user(&mut user).await.unwrap();

        let mut repo = Repo::new(user.id, "github.com", "octocat", "Hello-World");
        store.save_repo(&mut repo).await.unwrap();

        let mut commit = Commit::new("7fd1a60b01f91b314f59955a4e4d4e80d8edf11d", "master");
        commit.repo_id = repo.id;
        store.save_commit(&mut commit).await.unwrap();

        let mut build = Build::pending(commit.id);
        store.save_build(&mut build).await.unwrap();

        BuildTask {
            repo,
            commit,
            build,
            plan: BuildPlan {
                image: "alpine/git:latest".to_string(),
                script: vec![script.to_string()],
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_successful_build_is_recorded() {
        let store = Arc::new(MemoryStore::new());
        let runner = DockerRunner::new(store.clone()).unwrap();
        let task = seeded_task(&store, "echo hello from ferry").await;

        let id = runner.run(&task).await.unwrap();

        let build = store.get_build(id).await.unwrap();
        assert_eq!(build.status, BuildStatus::Success);
        assert!(build.stdout.contains("hello from ferry"));
        assert!(build.finished.is_some());
    }

    #[tokio::test]
    #[ignore]
    async fn test_failing_script_is_recorded() {
        let store = Arc::new(MemoryStore::new());
        let runner = DockerRunner::new(store.clone()).unwrap();
        let task = seeded_task(&store, "exit 42").await;

        let id = runner.run(&task).await.unwrap();

        let build = store.get_build(id).await.unwrap();
        assert_eq!(build.status, BuildStatus::Failure);
        let commit = store.get_commit(task.commit.id).await.unwrap();
        assert_eq!(commit.status, BuildStatus::Failure);
    }
}
