//! Platform-agnostic webhook event model.
//!
//! These types are the "normalized input" of the pipeline: the ingestor
//! parses raw GitLab/GitHub payloads into them once, and nothing downstream
//! touches the original JSON again. Immutable after parsing.

use serde::{Deserialize, Serialize};

/// Supported hosting platforms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Platform {
    GitLab,
    GitHub,
}

/// Project identity inside a platform.
///
/// * `id`   – GitLab: numeric project ID (stringified) or "group/project";
///            GitHub: "owner/repo".
/// * `name` – display name used in outcome records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: String,
    pub name: String,
}

/// Which side of a merge request a file should be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    /// The proposed changes (new content).
    Source,
    /// The merge target (old content).
    Target,
}

/// One merge/pull-request webhook, normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequestEvent {
    pub platform: Platform,
    pub project: ProjectRef,
    /// GitLab MR IID or GitHub PR number.
    pub iid: u64,
    /// Action/state reported by the hook (`opened`, `reopened`, `closed`, ...).
    pub action: String,
    pub title: String,
    /// Username of the human who opened the request.
    pub author: String,
    pub source_branch: String,
    pub target_branch: String,
    pub url: String,
}

impl MergeRequestEvent {
    /// Resolves a branch discriminator to a concrete ref name.
    pub fn resolve_branch(&self, kind: BranchKind) -> &str {
        match kind {
            BranchKind::Source => &self.source_branch,
            BranchKind::Target => &self.target_branch,
        }
    }
}

/// One commit carried inside a push payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushCommit {
    pub id: String,
    pub message: String,
    pub author: String,
    pub timestamp: Option<String>,
    pub url: Option<String>,
}

/// One push webhook, normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    pub platform: Platform,
    pub project: ProjectRef,
    /// Branch name with the `refs/heads/` prefix already stripped.
    pub branch: String,
    /// Username of the pusher.
    pub author: String,
    /// Commit sha before the push (all-zero on branch creation).
    pub before: String,
    /// Commit sha after the push (all-zero on branch deletion).
    pub after: String,
    pub commits: Vec<PushCommit>,
}

/// Discriminated union over everything the ingestor can deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WebhookEvent {
    MergeRequest(MergeRequestEvent),
    Push(PushEvent),
}

impl WebhookEvent {
    pub fn platform(&self) -> Platform {
        match self {
            WebhookEvent::MergeRequest(e) => e.platform,
            WebhookEvent::Push(e) => e.platform,
        }
    }

    pub fn project(&self) -> &ProjectRef {
        match self {
            WebhookEvent::MergeRequest(e) => &e.project,
            WebhookEvent::Push(e) => &e.project,
        }
    }
}
