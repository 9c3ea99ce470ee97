//! Build runners for Ferry CI.
//!
//! Provides the Docker runner that executes a build plan in a container on
//! the local daemon.

pub mod docker;

pub use docker::DockerRunner;
pub use ferry_core::Runner;
