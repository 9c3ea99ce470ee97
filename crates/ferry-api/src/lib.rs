//! HTTP server for Ferry CI.
//!
//! Receives provider webhooks and manual triggers and hands them to the
//! dispatcher. Also provides the provider clients that fetch build
//! configuration.

pub mod error;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use state::AppState;
