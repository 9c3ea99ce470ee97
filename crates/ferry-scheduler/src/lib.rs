//! Build dispatching for Ferry CI.
//!
//! The [`Dispatcher`] turns a trigger for a commit into a build. Concurrent
//! triggers for the same commit are coalesced through the
//! [`PendingRegistry`]: the first caller leads the work, later callers wait
//! for its outcome. Builds run on a fixed-size [`WorkerPool`].

pub mod dispatcher;
pub mod failure;
pub mod pool;
pub mod registry;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{DispatchOptions, Dispatcher};
pub use failure::record_failed_build;
pub use pool::{PendingBuild, WorkerPool};
pub use registry::{Claim, Completion, LeaderClaim, PendingRegistry};
pub use worker::Worker;
