//! Webhook endpoints for Git providers.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use ferry_core::Commit;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/github", post(github_hook))
        .route("/bitbucket", post(bitbucket_hook))
}

/// Query string of a hook URL: `?id=<repository slug>`.
#[derive(Debug, Deserialize)]
pub struct HookQuery {
    pub id: String,
}

/// Handle GitHub push, pull request and ping events.
async fn github_hook(
    State(state): State<AppState>,
    Query(query): Query<HookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    if let Some(secret) = &state.webhook_secret {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok());
        if !verify_github_signature(secret, &body, signature) {
            warn!(repo = %query.id, "Invalid webhook signature");
            return Err(ApiError::Unauthorized("invalid webhook signature".to_string()));
        }
    }

    let event = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("push");

    if event == "ping" {
        info!(repo = %query.id, "Ping event received - webhook is configured correctly");
        return Ok(StatusCode::OK);
    }

    let payload = hook_payload(&headers, &body)?;
    let commit = match event {
        "pull_request" => parse_payload::<PullRequestHook>(&payload)?.into_commit(),
        _ => parse_payload::<PushHook>(&payload)?.into_commit(),
    };

    let Some(commit) = commit else {
        debug!(repo = %query.id, event = %event, "Hook does not describe a buildable commit");
        return Ok(StatusCode::OK);
    };

    trigger(&state, &query.id, commit).await
}

/// Handle Bitbucket push events.
async fn bitbucket_hook(
    State(state): State<AppState>,
    Query(query): Query<HookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let payload = hook_payload(&headers, &body)?;
    let commit = parse_payload::<BitbucketHook>(&payload)?
        .into_commit()
        .ok_or_else(|| ApiError::BadRequest("push contains no commits".to_string()))?;

    trigger(&state, &query.id, commit).await
}

async fn trigger(state: &AppState, slug: &str, commit: Commit) -> Result<StatusCode, ApiError> {
    info!(
        repo = %slug,
        commit = %commit.short_hash(),
        branch = %commit.branch,
        "Triggering build from webhook"
    );

    match state.dispatcher.process(slug, commit).await {
        Ok(build_id) => {
            info!(repo = %slug, build_id = %build_id, "Webhook build finished");
            Ok(StatusCode::OK)
        }
        Err(e) => {
            warn!(repo = %slug, error = %e, "Webhook build failed");
            Err(e.into())
        }
    }
}

/// JSON payload of a hook, sent either as the body or as the `payload` form field.
fn hook_payload(headers: &HeaderMap, body: &[u8]) -> Result<Vec<u8>, ApiError> {
    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    if !is_form {
        return Ok(body.to_vec());
    }

    url::form_urlencoded::parse(body)
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned().into_bytes())
        .ok_or_else(|| ApiError::BadRequest("missing payload field".to_string()))
}

fn parse_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(payload)
        .map_err(|e| ApiError::BadRequest(format!("Invalid hook payload: {}", e)))
}

/// Verify GitHub webhook signature.
fn verify_github_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    // Signature format: "sha256=<hex>"
    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}

/// Email inside `Name <email>`, or the whole string when there are no brackets.
fn author_email(raw: &str) -> &str {
    raw.split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map(|(email, _)| email.trim())
        .unwrap_or_else(|| raw.trim())
}

const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

/// GitHub `push` event.
#[derive(Debug, Deserialize)]
pub struct PushHook {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub after: String,
    #[serde(default)]
    pub deleted: bool,
    pub head_commit: Option<PushCommit>,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
}

#[derive(Debug, Deserialize)]
pub struct PushCommit {
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
    pub author: Option<PushAuthor>,
}

#[derive(Debug, Deserialize)]
pub struct PushAuthor {
    #[serde(default)]
    pub email: String,
}

impl PushHook {
    pub fn is_tag(&self) -> bool {
        self.git_ref.starts_with("refs/tags/")
    }

    pub fn is_github_pages(&self) -> bool {
        self.git_ref.ends_with("/gh-pages")
    }

    pub fn is_head(&self) -> bool {
        self.git_ref.starts_with("refs/heads/")
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted || self.after == ZERO_SHA
    }

    pub fn branch(&self) -> &str {
        self.git_ref.trim_start_matches("refs/heads/")
    }

    /// The pushed head as a commit to build, or `None` for tags, GitHub
    /// Pages, deletions and refs that are not branches.
    pub fn into_commit(self) -> Option<Commit> {
        if self.is_tag() || self.is_github_pages() || !self.is_head() || self.is_deleted() {
            return None;
        }

        let hash = match &self.head_commit {
            Some(head) => head.id.clone(),
            None if !self.after.is_empty() => self.after.clone(),
            None => return None,
        };
        let mut commit = Commit::new(hash, self.branch());

        // Author details come from the head commit, or the first listed one.
        let described = self
            .head_commit
            .as_ref()
            .filter(|c| c.author.is_some())
            .or_else(|| self.commits.first().filter(|c| c.author.is_some()));
        if let Some(source) = described {
            commit.message = source.message.clone();
            commit.timestamp = source.timestamp.clone();
            if let Some(author) = &source.author {
                commit.set_author(&author.email);
            }
        }

        Some(commit)
    }
}

/// GitHub `pull_request` event.
#[derive(Debug, Deserialize)]
pub struct PullRequestHook {
    pub action: String,
    pub number: u64,
    pub pull_request: PullRequest,
}

#[derive(Debug, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub title: String,
    pub head: PullRequestHead,
    pub user: PullRequestUser,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestHead {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestUser {
    pub login: String,
    #[serde(default)]
    pub gravatar_id: String,
}

impl PullRequestHook {
    /// The pull request head as a commit to build. Only opened and
    /// synchronized pull requests are built.
    pub fn into_commit(self) -> Option<Commit> {
        if self.action != "opened" && self.action != "synchronize" {
            return None;
        }

        let pr = self.pull_request;
        let mut commit = Commit::new(pr.head.sha, pr.head.git_ref);
        commit.pull_request = Some(self.number);
        commit.author = pr.user.login;
        commit.gravatar = pr.user.gravatar_id;
        commit.message = pr.title;
        Some(commit)
    }
}

/// Bitbucket push event.
#[derive(Debug, Deserialize)]
pub struct BitbucketHook {
    #[serde(default)]
    pub commits: Vec<BitbucketCommit>,
}

#[derive(Debug, Deserialize)]
pub struct BitbucketCommit {
    #[serde(default)]
    pub branch: String,
    pub raw_node: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub raw_author: String,
}

impl BitbucketHook {
    /// The last pushed commit.
    pub fn into_commit(mut self) -> Option<Commit> {
        let last = self.commits.pop()?;

        let mut commit = Commit::new(last.raw_node, last.branch);
        commit.message = last.message;
        commit.timestamp = chrono::Utc::now().to_rfc3339();
        commit.set_author(author_email(&last.raw_author));
        Some(commit)
    }
}
