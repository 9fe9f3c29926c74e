//! VCS gateway: retry-aware client abstraction over the hosting platform's
//! REST surface.
//!
//! The capability set is a plain trait with `impl Future` returns (no
//! `async-trait`, no boxed futures) so the orchestrator stays statically
//! dispatched and tests can plug in in-memory fakes. Concrete clients are
//! composed behind the [`PlatformGateway`] enum, mirroring how runtime
//! platform selection works.
//!
//! Degradation contract: read calls never fail the pipeline. They retry per
//! their call class and then return empty/partial results; only write calls
//! (notes, line comments) surface errors, so the caller can fall back.

pub mod github;
pub mod gitlab;
pub mod retry;
pub mod types;

use std::future::Future;
use std::time::Duration;

use crate::errors::{ConfigError, GatewayError, PipelineResult};
use crate::events::Platform;

pub use types::{ChangeRequestRef, CommentPosition, CommitInfo, RawChange, ShaTriple};

/// Runtime configuration for a platform gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub platform: Platform,
    /// API base, e.g. "https://gitlab.example.com/api/v4" or
    /// "https://api.github.com".
    pub base_api: String,
    /// Access token (PAT or app token).
    pub token: String,
    /// Per-call timeout, seconds.
    pub timeout_secs: u64,
}

/// Capability set required of a hosting platform.
pub trait VcsGateway: Send + Sync {
    /// File changes of a merge request (eventual-consistency read; retried
    /// while empty, degrades to an empty list).
    fn get_changes(&self, id: &ChangeRequestRef)
    -> impl Future<Output = Vec<RawChange>> + Send;

    /// Same data through the platform's diff listing endpoint.
    fn get_diffs(&self, id: &ChangeRequestRef) -> impl Future<Output = Vec<RawChange>> + Send;

    /// Commits attached to the merge request (empty on failure).
    fn get_commits(&self, id: &ChangeRequestRef)
    -> impl Future<Output = Vec<CommitInfo>> + Send;

    /// Sha triple anchoring line comments; best-effort partial after retries.
    fn get_sha_triple(&self, id: &ChangeRequestRef) -> impl Future<Output = ShaTriple> + Send;

    /// Raw file content at a ref; `None` means "absent on this ref" (expected
    /// for added/deleted files) or an unrecoverable read failure.
    fn get_file_content(
        &self,
        project: &str,
        path: &str,
        git_ref: &str,
    ) -> impl Future<Output = Option<String>> + Send;

    /// Top-level note on the merge request.
    fn post_note(
        &self,
        id: &ChangeRequestRef,
        body: &str,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Line-anchored comment; never retried. Failure is signalled upward so
    /// the caller can fall back to a top-level note.
    fn post_line_comment(
        &self,
        id: &ChangeRequestRef,
        body: &str,
        position: &CommentPosition,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Names/patterns of protected branches (empty on failure).
    fn list_protected_branches(&self, project: &str)
    -> impl Future<Output = Vec<String>> + Send;

    /// File changes between two commits (push path; empty on failure).
    fn compare(
        &self,
        project: &str,
        from: &str,
        to: &str,
    ) -> impl Future<Output = Vec<RawChange>> + Send;

    /// First parent of a commit, used to anchor branch-creation pushes.
    fn get_parent_commit(
        &self,
        project: &str,
        commit_id: &str,
    ) -> impl Future<Output = Option<String>> + Send;

    /// Comment on a single commit (push review results).
    fn post_commit_comment(
        &self,
        project: &str,
        commit_id: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Concrete platform gateway (enum-dispatch).
#[derive(Debug, Clone)]
pub enum PlatformGateway {
    GitLab(gitlab::GitLabGateway),
    GitHub(github::GitHubGateway),
}

impl PlatformGateway {
    /// Constructs a concrete gateway from generic config.
    pub fn from_config(cfg: GatewayConfig) -> PipelineResult<Self> {
        if cfg.token.trim().is_empty() {
            return Err(ConfigError::MissingToken.into());
        }
        if !(cfg.base_api.starts_with("http://") || cfg.base_api.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(cfg.base_api).into());
        }

        let http = reqwest::Client::builder()
            .user_agent("codereview-backend/0.1")
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        Ok(match cfg.platform {
            Platform::GitLab => {
                Self::GitLab(gitlab::GitLabGateway::new(http, cfg.base_api, cfg.token))
            }
            Platform::GitHub => {
                Self::GitHub(github::GitHubGateway::new(http, cfg.base_api, cfg.token))
            }
        })
    }
}

impl VcsGateway for PlatformGateway {
    async fn get_changes(&self, id: &ChangeRequestRef) -> Vec<RawChange> {
        match self {
            Self::GitLab(c) => c.get_changes(id).await,
            Self::GitHub(c) => c.get_changes(id).await,
        }
    }

    async fn get_diffs(&self, id: &ChangeRequestRef) -> Vec<RawChange> {
        match self {
            Self::GitLab(c) => c.get_diffs(id).await,
            Self::GitHub(c) => c.get_diffs(id).await,
        }
    }

    async fn get_commits(&self, id: &ChangeRequestRef) -> Vec<CommitInfo> {
        match self {
            Self::GitLab(c) => c.get_commits(id).await,
            Self::GitHub(c) => c.get_commits(id).await,
        }
    }

    async fn get_sha_triple(&self, id: &ChangeRequestRef) -> ShaTriple {
        match self {
            Self::GitLab(c) => c.get_sha_triple(id).await,
            Self::GitHub(c) => c.get_sha_triple(id).await,
        }
    }

    async fn get_file_content(&self, project: &str, path: &str, git_ref: &str) -> Option<String> {
        match self {
            Self::GitLab(c) => c.get_file_content(project, path, git_ref).await,
            Self::GitHub(c) => c.get_file_content(project, path, git_ref).await,
        }
    }

    async fn post_note(&self, id: &ChangeRequestRef, body: &str) -> Result<(), GatewayError> {
        match self {
            Self::GitLab(c) => c.post_note(id, body).await,
            Self::GitHub(c) => c.post_note(id, body).await,
        }
    }

    async fn post_line_comment(
        &self,
        id: &ChangeRequestRef,
        body: &str,
        position: &CommentPosition,
    ) -> Result<(), GatewayError> {
        match self {
            Self::GitLab(c) => c.post_line_comment(id, body, position).await,
            Self::GitHub(c) => c.post_line_comment(id, body, position).await,
        }
    }

    async fn list_protected_branches(&self, project: &str) -> Vec<String> {
        match self {
            Self::GitLab(c) => c.list_protected_branches(project).await,
            Self::GitHub(c) => c.list_protected_branches(project).await,
        }
    }

    async fn compare(&self, project: &str, from: &str, to: &str) -> Vec<RawChange> {
        match self {
            Self::GitLab(c) => c.compare(project, from, to).await,
            Self::GitHub(c) => c.compare(project, from, to).await,
        }
    }

    async fn get_parent_commit(&self, project: &str, commit_id: &str) -> Option<String> {
        match self {
            Self::GitLab(c) => c.get_parent_commit(project, commit_id).await,
            Self::GitHub(c) => c.get_parent_commit(project, commit_id).await,
        }
    }

    async fn post_commit_comment(
        &self,
        project: &str,
        commit_id: &str,
        body: &str,
    ) -> Result<(), GatewayError> {
        match self {
            Self::GitLab(c) => c.post_commit_comment(project, commit_id, body).await,
            Self::GitHub(c) => c.post_commit_comment(project, commit_id, body).await,
        }
    }
}
