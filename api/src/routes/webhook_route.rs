//! Webhook ingestor.
//!
//! `POST /review/webhook` accepts both GitLab and GitHub payloads on one
//! endpoint: a `X-GitHub-Event` header marks GitHub, everything else is
//! treated as GitLab. The handler resolves the platform base URL and
//! credential, parses the payload into a normalized
//! [`review_pipeline::WebhookEvent`], hands it to a spawned worker, and
//! acknowledges immediately; the sender never waits on VCS or model
//! latency.
//!
//! Resolution priority:
//! - GitLab URL: `GITLAB_URL` env → `X-Gitlab-Instance` header → the
//!   payload's project homepage.
//! - GitLab token: `X-Gitlab-Token` header → `GITLAB_ACCESS_TOKEN` env.
//! - GitHub token: `GITHUB_ACCESS_TOKEN` env → `X-GitHub-Token` header.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};

use review_pipeline::{
    MergeRequestEvent, Orchestrator, Platform, PushEvent, WebhookEvent,
    events::{ProjectRef, PushCommit},
    gateway::{GatewayConfig, PlatformGateway},
};

use crate::core::app_state::AppState;

/// Entry point for both platforms.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    match headers.get("X-GitHub-Event").and_then(|v| v.to_str().ok()) {
        Some(event_type) => handle_github(state, &headers, event_type.to_string(), payload).await,
        None => handle_gitlab(state, &headers, payload).await,
    }
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "message": message.into() }))).into_response()
}

fn accepted(kind: &str) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "message": format!("Request received ({kind}), will process asynchronously.")
        })),
    )
        .into_response()
}

/// Builds the gateway, spawns the pipeline worker, and returns at once.
fn spawn_worker(state: AppState, gateway_cfg: GatewayConfig, event: WebhookEvent) -> Response {
    let kind = match &event {
        WebhookEvent::MergeRequest(_) => "merge_request",
        WebhookEvent::Push(_) => "push",
    };

    let gateway = match PlatformGateway::from_config(gateway_cfg) {
        Ok(g) => g,
        Err(e) => {
            error!(error = %e, "failed to construct platform gateway");
            return bad_request(format!("invalid platform configuration: {e}"));
        }
    };

    info!(kind, project = %event.project().name, "webhook accepted");

    let orchestrator = Orchestrator::new(
        state.review_cfg.clone(),
        gateway,
        state.llm.clone(),
        state.dispatcher.clone(),
    );
    let status = state.status.clone();
    status.worker_started();
    tokio::spawn(async move {
        orchestrator.handle_event(event).await;
        status.worker_finished();
    });

    accepted(kind)
}

/* ------------------------------------------------------------------------- */
/* GitLab                                                                    */
/* ------------------------------------------------------------------------- */

async fn handle_gitlab(state: AppState, headers: &HeaderMap, payload: Value) -> Response {
    let token = headers
        .get("X-Gitlab-Token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| std::env::var("GITLAB_ACCESS_TOKEN").ok());
    let Some(token) = token else {
        return bad_request("Missing GitLab access token");
    };

    let Some(base_url) = resolve_gitlab_url(headers, &payload) else {
        return bad_request("Missing GitLab URL");
    };
    let base_api = format!("{}/api/v4", base_url.trim_end_matches('/'));

    let object_kind = payload
        .get("object_kind")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let event = match object_kind.as_str() {
        "merge_request" => match serde_json::from_value::<GitLabMrHook>(payload) {
            Ok(hook) => WebhookEvent::MergeRequest(hook.into_event()),
            Err(e) => return bad_request(format!("malformed merge_request payload: {e}")),
        },
        "push" => match serde_json::from_value::<GitLabPushHook>(payload) {
            Ok(hook) => WebhookEvent::Push(hook.into_event()),
            Err(e) => return bad_request(format!("malformed push payload: {e}")),
        },
        other => {
            return bad_request(format!(
                "Only merge_request and push events are supported, but received: {other}."
            ));
        }
    };

    let gateway_cfg = GatewayConfig {
        platform: Platform::GitLab,
        base_api,
        token,
        timeout_secs: state.review_cfg.http_timeout_secs,
    };
    spawn_worker(state, gateway_cfg, event)
}

/// URL priority: environment, then instance header, then project homepage.
fn resolve_gitlab_url(headers: &HeaderMap, payload: &Value) -> Option<String> {
    if let Ok(url) = std::env::var("GITLAB_URL") {
        if !url.trim().is_empty() {
            return Some(url);
        }
    }
    if let Some(url) = headers.get("X-Gitlab-Instance").and_then(|v| v.to_str().ok()) {
        return Some(url.to_string());
    }
    payload
        .get("project")
        .and_then(|p| p.get("homepage"))
        .and_then(Value::as_str)
        .and_then(origin_of)
}

/// `https://host/group/project` → `https://host`.
fn origin_of(url: &str) -> Option<String> {
    let scheme_end = url.find("://")? + 3;
    let host_end = url[scheme_end..]
        .find('/')
        .map(|i| scheme_end + i)
        .unwrap_or(url.len());
    Some(url[..host_end].to_string())
}

#[derive(Debug, Deserialize)]
struct GitLabMrHook {
    object_attributes: GitLabMrAttributes,
    project: GitLabProject,
    #[serde(default)]
    user: Option<GitLabUser>,
}

#[derive(Debug, Deserialize)]
struct GitLabMrAttributes {
    iid: u64,
    state: String,
    source_branch: String,
    target_branch: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    target_project_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GitLabProject {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitLabUser {
    username: String,
}

impl GitLabMrHook {
    fn into_event(self) -> MergeRequestEvent {
        let project_id = self
            .object_attributes
            .target_project_id
            .unwrap_or(self.project.id);
        MergeRequestEvent {
            platform: Platform::GitLab,
            project: ProjectRef {
                id: project_id.to_string(),
                name: self.project.name,
            },
            iid: self.object_attributes.iid,
            action: self.object_attributes.state,
            title: self.object_attributes.title,
            author: self.user.map(|u| u.username).unwrap_or_default(),
            source_branch: self.object_attributes.source_branch,
            target_branch: self.object_attributes.target_branch,
            url: self.object_attributes.url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitLabPushHook {
    #[serde(default)]
    before: String,
    #[serde(default)]
    after: String,
    #[serde(rename = "ref", default)]
    git_ref: String,
    #[serde(default)]
    user_username: String,
    project: GitLabProject,
    #[serde(default)]
    commits: Vec<GitLabPushCommit>,
}

#[derive(Debug, Deserialize)]
struct GitLabPushCommit {
    id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    author: Option<GitLabCommitAuthor>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitLabCommitAuthor {
    #[serde(default)]
    name: String,
}

impl GitLabPushHook {
    fn into_event(self) -> PushEvent {
        PushEvent {
            platform: Platform::GitLab,
            project: ProjectRef {
                id: self.project.id.to_string(),
                name: self.project.name,
            },
            branch: self
                .git_ref
                .strip_prefix("refs/heads/")
                .unwrap_or(&self.git_ref)
                .to_string(),
            author: self.user_username,
            before: self.before,
            after: self.after,
            commits: self
                .commits
                .into_iter()
                .map(|c| PushCommit {
                    id: c.id,
                    message: c.message,
                    author: c.author.map(|a| a.name).unwrap_or_default(),
                    timestamp: c.timestamp,
                    url: c.url,
                })
                .collect(),
        }
    }
}

/* ------------------------------------------------------------------------- */
/* GitHub                                                                    */
/* ------------------------------------------------------------------------- */

async fn handle_github(
    state: AppState,
    headers: &HeaderMap,
    event_type: String,
    payload: Value,
) -> Response {
    let token = std::env::var("GITHUB_ACCESS_TOKEN").ok().or_else(|| {
        headers
            .get("X-GitHub-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });
    let Some(token) = token else {
        return bad_request("Missing GitHub access token");
    };

    let base_api =
        std::env::var("GITHUB_API_URL").unwrap_or_else(|_| "https://api.github.com".to_string());

    let event = match event_type.as_str() {
        "pull_request" => match serde_json::from_value::<GitHubPrHook>(payload) {
            Ok(hook) => WebhookEvent::MergeRequest(hook.into_event()),
            Err(e) => return bad_request(format!("malformed pull_request payload: {e}")),
        },
        "push" => match serde_json::from_value::<GitHubPushHook>(payload) {
            Ok(hook) => WebhookEvent::Push(hook.into_event()),
            Err(e) => return bad_request(format!("malformed push payload: {e}")),
        },
        other => {
            return bad_request(format!(
                "Only pull_request and push events are supported for GitHub, but received: {other}."
            ));
        }
    };

    let gateway_cfg = GatewayConfig {
        platform: Platform::GitHub,
        base_api,
        token,
        timeout_secs: state.review_cfg.http_timeout_secs,
    };
    spawn_worker(state, gateway_cfg, event)
}

#[derive(Debug, Deserialize)]
struct GitHubPrHook {
    action: String,
    number: u64,
    pull_request: GitHubPr,
    repository: GitHubRepository,
}

#[derive(Debug, Deserialize)]
struct GitHubPr {
    #[serde(default)]
    title: String,
    #[serde(default)]
    html_url: String,
    user: GitHubUser,
    head: GitHubPrRef,
    base: GitHubPrRef,
}

#[derive(Debug, Deserialize)]
struct GitHubPrRef {
    #[serde(rename = "ref")]
    branch: String,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubRepository {
    full_name: String,
    name: String,
}

impl GitHubPrHook {
    fn into_event(self) -> MergeRequestEvent {
        MergeRequestEvent {
            platform: Platform::GitHub,
            project: ProjectRef {
                id: self.repository.full_name,
                name: self.repository.name,
            },
            iid: self.number,
            action: self.action,
            title: self.pull_request.title,
            author: self.pull_request.user.login,
            source_branch: self.pull_request.head.branch,
            target_branch: self.pull_request.base.branch,
            url: self.pull_request.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubPushHook {
    #[serde(default)]
    before: String,
    #[serde(default)]
    after: String,
    #[serde(rename = "ref", default)]
    git_ref: String,
    repository: GitHubRepository,
    #[serde(default)]
    sender: Option<GitHubUser>,
    #[serde(default)]
    commits: Vec<GitHubPushCommit>,
}

#[derive(Debug, Deserialize)]
struct GitHubPushCommit {
    id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    author: Option<GitHubCommitAuthor>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitAuthor {
    #[serde(default)]
    name: String,
}

impl GitHubPushHook {
    fn into_event(self) -> PushEvent {
        PushEvent {
            platform: Platform::GitHub,
            project: ProjectRef {
                id: self.repository.full_name,
                name: self.repository.name,
            },
            branch: self
                .git_ref
                .strip_prefix("refs/heads/")
                .unwrap_or(&self.git_ref)
                .to_string(),
            author: self.sender.map(|s| s.login).unwrap_or_default(),
            before: self.before,
            after: self.after,
            commits: self
                .commits
                .into_iter()
                .map(|c| PushCommit {
                    id: c.id,
                    message: c.message,
                    author: c.author.map(|a| a.name).unwrap_or_default(),
                    timestamp: c.timestamp,
                    url: c.url,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_strips_path() {
        assert_eq!(
            origin_of("https://gitlab.example.com/group/project").as_deref(),
            Some("https://gitlab.example.com")
        );
        assert_eq!(
            origin_of("http://host").as_deref(),
            Some("http://host")
        );
        assert_eq!(origin_of("not a url"), None);
    }

    #[test]
    fn gitlab_mr_hook_parses_into_event() {
        let payload = serde_json::json!({
            "object_kind": "merge_request",
            "user": { "username": "alice" },
            "project": { "id": 7, "name": "demo", "homepage": "https://gitlab.example.com/g/demo" },
            "object_attributes": {
                "iid": 42,
                "state": "opened",
                "source_branch": "feature",
                "target_branch": "main",
                "title": "Add thing",
                "url": "https://gitlab.example.com/g/demo/-/merge_requests/42",
                "target_project_id": 7
            }
        });
        let hook: GitLabMrHook = serde_json::from_value(payload).unwrap();
        let ev = hook.into_event();
        assert_eq!(ev.iid, 42);
        assert_eq!(ev.action, "opened");
        assert_eq!(ev.project.id, "7");
        assert_eq!(ev.author, "alice");
    }

    #[test]
    fn github_push_hook_strips_ref_prefix() {
        let payload = serde_json::json!({
            "ref": "refs/heads/main",
            "before": "aaa",
            "after": "bbb",
            "repository": { "full_name": "owner/repo", "name": "repo" },
            "sender": { "login": "bob" },
            "commits": [ { "id": "bbb", "message": "fix" } ]
        });
        let hook: GitHubPushHook = serde_json::from_value(payload).unwrap();
        let ev = hook.into_event();
        assert_eq!(ev.branch, "main");
        assert_eq!(ev.author, "bob");
        assert_eq!(ev.commits.len(), 1);
    }
}
