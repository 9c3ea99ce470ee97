//! Core domain types and traits for the Ferry CI build dispatcher.
//!
//! This crate contains:
//! - Record identifiers
//! - Repository, user, commit and build records
//! - The parsed build plan and the unit of work handed to workers
//! - Port traits for the store, the config source, the parser and the runner

pub mod commit;
pub mod error;
pub mod id;
pub mod plan;
pub mod repository;
pub mod runner;
pub mod source;
pub mod store;
pub mod task;

pub use commit::{Build, BuildStatus, Commit};
pub use error::{Error, Result};
pub use id::{BuildId, CommitId, RepoId, UserId};
pub use plan::{BuildPlan, PlanParser};
pub use repository::{Repo, Settings, User};
pub use runner::Runner;
pub use source::{ConfigSource, DEFAULT_CONFIG_PATH};
pub use store::Store;
pub use task::{BuildTask, TaskIdentity, TaskOutcome};
