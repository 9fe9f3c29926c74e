//! GitHub gateway (REST).
//!
//! Endpoints used:
//! - GET  /repos/{owner}/{repo}/pulls/{number}                  (sha triple)
//! - GET  /repos/{owner}/{repo}/pulls/{number}/files            (patches)
//! - GET  /repos/{owner}/{repo}/pulls/{number}/commits
//! - GET  /repos/{owner}/{repo}/contents/{path}?ref=...         (raw accept)
//! - GET  /repos/{owner}/{repo}/compare/{base}...{head}
//! - GET  /repos/{owner}/{repo}/branches?protected=true
//! - POST /repos/{owner}/{repo}/issues/{number}/comments        (note)
//! - POST /repos/{owner}/{repo}/pulls/{number}/comments         (line comment)
//! - POST /repos/{owner}/{repo}/commits/{sha}/comments
//!
//! Auth via `Authorization: Bearer <token>`. GitHub exposes no `start_sha`;
//! the triple is completed with the base sha so the publisher has one path.

use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::errors::GatewayError;
use crate::gateway::retry::{Attempt, RetryPolicy, run_until_ready};
use crate::gateway::types::*;

#[derive(Debug, Clone)]
pub struct GitHubGateway {
    http: Client,
    base_api: String, // e.g. "https://api.github.com"
    token: String,
}

impl GitHubGateway {
    /// Constructs a GitHub gateway with a shared reqwest instance and token.
    pub fn new(http: Client, base_api: String, token: String) -> Self {
        Self {
            http,
            base_api: base_api.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn repo_url(&self, project: &str, tail: &str) -> String {
        format!("{}/repos/{}{}", self.base_api, project, tail)
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/vnd.github+json")
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/vnd.github+json")
    }

    /// Base/head shas from PR metadata; `start_sha` mirrors the base.
    ///
    /// Same retry discipline as the GitLab side: exponential backoff on
    /// 5xx/429/transport errors, immediate stop on other client errors,
    /// best-effort partial result after exhaustion.
    pub async fn get_sha_triple(&self, id: &ChangeRequestRef) -> ShaTriple {
        let policy = RetryPolicy::metadata();
        let url = self.repo_url(&id.project, &format!("/pulls/{}", id.iid));
        let mut result = ShaTriple::default();

        for attempt in 0..policy.max_attempts {
            debug!(attempt = attempt + 1, %url, "fetching pull request metadata");

            let retry_this = match self.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => match resp.json::<GitHubPr>().await {
                    Ok(pr) => {
                        let base = pr.base.sha.unwrap_or_default();
                        let head = pr.head.sha.unwrap_or_default();
                        result = ShaTriple {
                            start_sha: base.clone(),
                            base_sha: base,
                            head_sha: head,
                        };
                        if result.is_complete() {
                            info!(number = id.iid, "sha triple resolved");
                            return result;
                        }
                        warn!(
                            number = id.iid,
                            missing = ?result.missing_fields(),
                            "sha triple incomplete, will retry"
                        );
                        true
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to decode pull request metadata");
                        true
                    }
                },
                Ok(resp) => {
                    let status = resp.status();
                    if status.as_u16() >= 500 || status == StatusCode::TOO_MANY_REQUESTS {
                        warn!(%status, "server error fetching metadata, will retry");
                        true
                    } else {
                        error!(%status, "client error fetching metadata, giving up");
                        false
                    }
                }
                Err(e) => {
                    warn!(error = %e, "network error fetching metadata, will retry");
                    true
                }
            };

            if !retry_this {
                break;
            }
            if attempt + 1 < policy.max_attempts {
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
        }

        if !result.is_complete() {
            error!(
                number = id.iid,
                missing = ?result.missing_fields(),
                "sha triple still incomplete after retries"
            );
        }
        result
    }

    /// PR file list; the `patch` field carries the unified diff. Retried
    /// while empty (files can lag behind the webhook).
    pub async fn get_changes(&self, id: &ChangeRequestRef) -> Vec<RawChange> {
        let policy = RetryPolicy::eventual_consistency();
        let url = self.repo_url(&id.project, &format!("/pulls/{}/files?per_page=100", id.iid));
        let this = self;
        let url_ref = url.as_str();

        let out = run_until_ready(&policy, |attempt| async move {
            debug!(attempt = attempt + 1, url = %url_ref, "fetching pull request files");
            match this.get(url_ref).send().await {
                Ok(resp) if resp.status().is_success() => {
                    match resp.json::<Vec<GitHubPrFile>>().await {
                        Ok(files) if files.is_empty() => Attempt::Pending,
                        Ok(files) => Attempt::Ready(files),
                        Err(e) => {
                            warn!(error = %e, "failed to decode pull request files");
                            Attempt::Halt
                        }
                    }
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "pull request files request failed");
                    Attempt::Halt
                }
                Err(e) => {
                    warn!(error = %e, "network error fetching pull request files");
                    Attempt::Pending
                }
            }
        })
        .await;

        out.unwrap_or_else(|| {
            warn!(%url, "pull request files still empty after retries");
            Vec::new()
        })
        .into_iter()
        .map(GitHubPrFile::into_raw)
        .collect()
    }

    /// GitHub has a single change-listing endpoint; `/files` serves both.
    pub async fn get_diffs(&self, id: &ChangeRequestRef) -> Vec<RawChange> {
        self.get_changes(id).await
    }

    /// Commits of the PR; empty on any failure.
    pub async fn get_commits(&self, id: &ChangeRequestRef) -> Vec<CommitInfo> {
        let url = self.repo_url(&id.project, &format!("/pulls/{}/commits", id.iid));
        match self.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<Vec<GitHubPrCommit>>()
                .await
                .map(|cs| cs.into_iter().map(GitHubPrCommit::into_info).collect())
                .unwrap_or_else(|e| {
                    warn!(error = %e, "failed to decode pull request commits");
                    Vec::new()
                }),
            Ok(resp) => {
                warn!(status = %resp.status(), "failed to fetch pull request commits");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "network error fetching pull request commits");
                Vec::new()
            }
        }
    }

    /// Raw file content at a ref via the contents endpoint.
    pub async fn get_file_content(
        &self,
        project: &str,
        path: &str,
        git_ref: &str,
    ) -> Option<String> {
        let url = format!(
            "{}?ref={}",
            self.repo_url(project, &format!("/contents/{}", path)),
            urlencoding::encode(git_ref)
        );
        match self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/vnd.github.raw+json")
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                debug!(%path, %git_ref, "file absent on this ref");
                None
            }
            Ok(resp) => {
                warn!(status = %resp.status(), %path, "failed to fetch file content");
                None
            }
            Err(e) => {
                warn!(error = %e, %path, "network error fetching file content");
                None
            }
        }
    }

    /// Top-level note = issue comment on the PR.
    pub async fn post_note(&self, id: &ChangeRequestRef, body: &str) -> Result<(), GatewayError> {
        if self.token.trim().is_empty() {
            return Err(GatewayError::MissingCredential);
        }
        let url = self.repo_url(&id.project, &format!("/issues/{}/comments", id.iid));

        #[derive(serde::Serialize)]
        struct Req<'a> {
            body: &'a str,
        }

        let resp = self
            .post(&url)
            .json(&Req { body })
            .send()
            .await
            .map_err(GatewayError::from)?;

        if resp.status() == StatusCode::CREATED {
            info!(number = id.iid, "comment added to pull request");
            Ok(())
        } else {
            let status = resp.status().as_u16();
            error!(status, "failed to add pull request comment");
            Err(GatewayError::HttpStatus(status))
        }
    }

    /// Review comment anchored to a diff line. New side preferred; pure
    /// deletions anchor on the left side.
    pub async fn post_line_comment(
        &self,
        id: &ChangeRequestRef,
        body: &str,
        position: &CommentPosition,
    ) -> Result<(), GatewayError> {
        if self.token.trim().is_empty() {
            return Err(GatewayError::MissingCredential);
        }
        let url = self.repo_url(&id.project, &format!("/pulls/{}/comments", id.iid));

        let (line, side, path) = match (position.new_line, position.old_line) {
            (Some(n), _) => (n, "RIGHT", position.new_path.as_str()),
            (None, Some(o)) => (o, "LEFT", position.old_path.as_str()),
            (None, None) => return Err(GatewayError::InvalidResponse("no line anchor".into())),
        };

        #[derive(serde::Serialize)]
        struct Req<'a> {
            body: &'a str,
            commit_id: &'a str,
            path: &'a str,
            line: u64,
            side: &'a str,
        }

        debug!(%path, line, side, "posting review comment");

        let resp = self
            .post(&url)
            .json(&Req {
                body,
                commit_id: &position.sha.head_sha,
                path,
                line,
                side,
            })
            .send()
            .await
            .map_err(GatewayError::from)?;

        if resp.status() == StatusCode::CREATED {
            info!(%path, line, "review comment added");
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.ok();
            error!(
                status,
                %path,
                body = ?body,
                "review comment rejected"
            );
            Err(GatewayError::HttpStatus(status))
        }
    }

    /// Protected branch names; empty on failure.
    pub async fn list_protected_branches(&self, project: &str) -> Vec<String> {
        let url = self.repo_url(project, "/branches?protected=true");
        match self.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<Vec<GitHubBranch>>()
                .await
                .map(|bs| bs.into_iter().map(|b| b.name).collect())
                .unwrap_or_default(),
            Ok(resp) => {
                warn!(status = %resp.status(), "failed to list protected branches");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "network error listing protected branches");
                Vec::new()
            }
        }
    }

    /// File changes between two commits; empty on failure.
    pub async fn compare(&self, project: &str, from: &str, to: &str) -> Vec<RawChange> {
        let url = self.repo_url(project, &format!("/compare/{}...{}", from, to));
        match self.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<GitHubCompareResponse>()
                .await
                .map(|c| c.files.into_iter().map(GitHubPrFile::into_raw).collect())
                .unwrap_or_default(),
            Ok(resp) => {
                warn!(status = %resp.status(), "compare request failed");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "network error on compare");
                Vec::new()
            }
        }
    }

    /// First parent of a commit (branch-creation anchoring).
    pub async fn get_parent_commit(&self, project: &str, commit_id: &str) -> Option<String> {
        let url = self.repo_url(project, &format!("/commits/{}", commit_id));
        match self.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<GitHubCommitDetail>()
                .await
                .ok()
                .and_then(|c| c.parents.into_iter().next())
                .map(|p| p.sha),
            _ => None,
        }
    }

    /// Comment on a single commit (push review results).
    pub async fn post_commit_comment(
        &self,
        project: &str,
        commit_id: &str,
        body: &str,
    ) -> Result<(), GatewayError> {
        if self.token.trim().is_empty() {
            return Err(GatewayError::MissingCredential);
        }
        let url = self.repo_url(project, &format!("/commits/{}/comments", commit_id));

        #[derive(serde::Serialize)]
        struct Req<'a> {
            body: &'a str,
        }

        let resp = self
            .post(&url)
            .json(&Req { body })
            .send()
            .await
            .map_err(GatewayError::from)?;

        if resp.status() == StatusCode::CREATED {
            info!(%commit_id, "comment added to push commit");
            Ok(())
        } else {
            let status = resp.status().as_u16();
            error!(status, %commit_id, "failed to comment on commit");
            Err(GatewayError::HttpStatus(status))
        }
    }
}

/// --- GitHub response shapes (subset of fields we actually use) ---

#[derive(Debug, Deserialize)]
struct GitHubPr {
    base: GitHubPrRef,
    head: GitHubPrRef,
}

#[derive(Debug, Deserialize)]
struct GitHubPrRef {
    #[serde(default)]
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubPrFile {
    filename: String,
    #[serde(default)]
    previous_filename: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    patch: Option<String>, // unified diff; None for binary/too-large
}

impl GitHubPrFile {
    fn into_raw(self) -> RawChange {
        let old_path = self
            .previous_filename
            .unwrap_or_else(|| self.filename.clone());
        RawChange {
            old_path,
            new_path: self.filename,
            new_file: self.status == "added",
            deleted_file: self.status == "removed",
            diff: self.patch.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubPrCommit {
    sha: String,
    commit: GitHubCommitInner,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitInner {
    #[serde(default)]
    message: String,
    #[serde(default)]
    author: Option<GitHubCommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitAuthor {
    #[serde(default)]
    name: String,
}

impl GitHubPrCommit {
    fn into_info(self) -> CommitInfo {
        let title = self
            .commit
            .message
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        CommitInfo {
            id: self.sha,
            title,
            message: self.commit.message,
            author_name: self.commit.author.map(|a| a.name).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubBranch {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubCompareResponse {
    #[serde(default)]
    files: Vec<GitHubPrFile>,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitDetail {
    #[serde(default)]
    parents: Vec<GitHubParent>,
}

#[derive(Debug, Deserialize)]
struct GitHubParent {
    sha: String,
}
