//! Manual build trigger.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::Router;
use ferry_core::{Commit, Repo};
use serde::Deserialize;
use tracing::{info, warn};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/commit/{host}/{owner}/{name}/{hash}", get(trigger_commit))
}

#[derive(Debug, Deserialize)]
pub struct TriggerQuery {
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "master".to_string()
}

/// Build a commit of a connected repository and report the outcome.
async fn trigger_commit(
    State(state): State<AppState>,
    Path((host, owner, name, hash)): Path<(String, String, String, String)>,
    Query(query): Query<TriggerQuery>,
) -> Result<String, ApiError> {
    let slug = Repo::make_slug(&host, &owner, &name);
    let commit = Commit::new(hash, query.branch);

    info!(repo = %slug, commit = %commit.short_hash(), "Manual build trigger");

    match state.dispatcher.process(&slug, commit).await {
        Ok(build_id) => Ok(format!("build {} finished", build_id)),
        Err(e) => {
            warn!(repo = %slug, error = %e, "Manual build failed");
            Err(e.into())
        }
    }
}
