//! GitLab gateway (REST v4).
//!
//! Endpoints used:
//! - GET  /projects/:id/merge_requests/:iid                     (sha triple)
//! - GET  /projects/:id/merge_requests/:iid/changes             (change list)
//! - GET  /projects/:id/merge_requests/:iid/diffs               (diff list)
//! - GET  /projects/:id/merge_requests/:iid/commits
//! - GET  /projects/:id/repository/files/:path/raw?ref=...
//! - GET  /projects/:id/repository/compare?from=...&to=...
//! - GET  /projects/:id/repository/commits?ref_name=...
//! - GET  /projects/:id/protected_branches
//! - POST /projects/:id/merge_requests/:iid/notes
//! - POST /projects/:id/merge_requests/:iid/discussions         (line comment)
//! - POST /projects/:id/repository/commits/:sha/comments
//!
//! Auth via the `PRIVATE-TOKEN` header on every request.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::errors::GatewayError;
use crate::gateway::retry::{Attempt, RetryPolicy, run_until_ready};
use crate::gateway::types::*;

#[derive(Debug, Clone)]
pub struct GitLabGateway {
    http: Client,
    base_api: String, // e.g. "https://gitlab.com/api/v4"
    token: String,
}

impl GitLabGateway {
    /// Constructs a GitLab gateway with a shared reqwest instance and token.
    pub fn new(http: Client, base_api: String, token: String) -> Self {
        Self {
            http,
            base_api: base_api.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn mr_url(&self, id: &ChangeRequestRef, tail: &str) -> String {
        format!(
            "{}/projects/{}/merge_requests/{}{}",
            self.base_api,
            urlencoding::encode(&id.project),
            id.iid,
            tail
        )
    }

    fn project_url(&self, project: &str, tail: &str) -> String {
        format!(
            "{}/projects/{}{}",
            self.base_api,
            urlencoding::encode(project),
            tail
        )
    }

    /// Fetches the sha triple from MR metadata.
    ///
    /// Retries with exponential backoff on 5xx/429, transport failures, and
    /// incomplete triples; other client errors stop immediately. Always
    /// returns a best-effort triple, with empty fields where unobtainable.
    pub async fn get_sha_triple(&self, id: &ChangeRequestRef) -> ShaTriple {
        let policy = RetryPolicy::metadata();
        let url = self.mr_url(id, "");
        let mut result = ShaTriple::default();

        for attempt in 0..policy.max_attempts {
            debug!(
                attempt = attempt + 1,
                max = policy.max_attempts,
                %url,
                "fetching merge request metadata"
            );

            let retry_this = match self
                .http
                .get(&url)
                .header("PRIVATE-TOKEN", &self.token)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    match resp.json::<GitLabMr>().await {
                        Ok(mr) => {
                            result = ShaTriple {
                                base_sha: mr.diff_refs.base_sha.unwrap_or_default(),
                                head_sha: mr.diff_refs.head_sha.unwrap_or_default(),
                                start_sha: mr.diff_refs.start_sha.unwrap_or_default(),
                            };
                            if result.is_complete() {
                                info!(iid = id.iid, "sha triple resolved");
                                return result;
                            }
                            warn!(
                                iid = id.iid,
                                missing = ?result.missing_fields(),
                                "sha triple incomplete, will retry"
                            );
                            true
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to decode merge request metadata");
                            true
                        }
                    }
                }
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
                iid = id.iid,
                missing = ?result.missing_fields(),
                "sha triple still incomplete after retries"
            );
        }
        result
    }

    /// Fetches the MR change list (`/changes` endpoint, raw diffs included).
    ///
    /// The list can lag behind the webhook; retried while empty.
    pub async fn get_changes(&self, id: &ChangeRequestRef) -> Vec<RawChange> {
        let url = self.mr_url(id, "/changes?access_raw_diffs=true");
        self.fetch_change_list::<GitLabChangesResponse>(&url, |body| body.changes)
            .await
    }

    /// Fetches the MR diff list (`/diffs` endpoint).
    pub async fn get_diffs(&self, id: &ChangeRequestRef) -> Vec<RawChange> {
        let url = self.mr_url(id, "/diffs");
        self.fetch_change_list::<Vec<GitLabChangeEntry>>(&url, |body| body)
            .await
    }

    async fn fetch_change_list<B>(
        &self,
        url: &str,
        extract: fn(B) -> Vec<GitLabChangeEntry>,
    ) -> Vec<RawChange>
    where
        B: serde::de::DeserializeOwned,
    {
        let policy = RetryPolicy::eventual_consistency();
        let this = self;
        let out = run_until_ready(&policy, |attempt| async move {
            debug!(attempt = attempt + 1, %url, "fetching change list");
            match this
                .http
                .get(url)
                .header("PRIVATE-TOKEN", &this.token)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => match resp.json::<B>().await {
                    Ok(body) => {
                        let entries = extract(body);
                        if entries.is_empty() {
                            Attempt::Pending
                        } else {
                            Attempt::Ready(entries)
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to decode change list");
                        Attempt::Halt
                    }
                },
                Ok(resp) => {
                    warn!(status = %resp.status(), %url, "change list request failed");
                    Attempt::Halt
                }
                Err(e) => {
                    warn!(error = %e, "network error fetching change list");
                    Attempt::Pending
                }
            }
        })
        .await;

        let entries = out.unwrap_or_else(|| {
            warn!(%url, "change list still empty after retries");
            Vec::new()
        });

        entries.into_iter().map(GitLabChangeEntry::into_raw).collect()
    }

    /// Commits attached to the MR; empty on any failure.
    pub async fn get_commits(&self, id: &ChangeRequestRef) -> Vec<CommitInfo> {
        let url = self.mr_url(id, "/commits");
        match self
            .http
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp
                .json::<Vec<GitLabCommitEntry>>()
                .await
                .map(|cs| cs.into_iter().map(GitLabCommitEntry::into_info).collect())
                .unwrap_or_else(|e| {
                    warn!(error = %e, "failed to decode commits");
                    Vec::new()
                }),
            Ok(resp) => {
                warn!(status = %resp.status(), "failed to fetch commits");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "network error fetching commits");
                Vec::new()
            }
        }
    }

    /// Raw file content at a ref. 404 means the file is absent on this ref
    /// (expected for added/deleted files) and is not an error.
    pub async fn get_file_content(
        &self,
        project: &str,
        path: &str,
        git_ref: &str,
    ) -> Option<String> {
        let url = format!(
            "{}/repository/files/{}/raw?ref={}",
            self.project_url(project, ""),
            urlencoding::encode(path),
            urlencoding::encode(git_ref)
        );
        match self
            .http
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
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

    /// Posts a top-level note on the MR.
    pub async fn post_note(&self, id: &ChangeRequestRef, body: &str) -> Result<(), GatewayError> {
        if self.token.trim().is_empty() {
            return Err(GatewayError::MissingCredential);
        }
        let url = self.mr_url(id, "/notes");

        #[derive(serde::Serialize)]
        struct Req<'a> {
            body: &'a str,
        }

        let resp = self
            .http
            .post(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .json(&Req { body })
            .send()
            .await
            .map_err(GatewayError::from)?;

        if resp.status() == StatusCode::CREATED {
            info!(iid = id.iid, "note added to merge request");
            Ok(())
        } else {
            let status = resp.status().as_u16();
            error!(status, "failed to add note");
            Err(GatewayError::HttpStatus(status))
        }
    }

    /// Posts a line-anchored discussion. Not retried; failure is signalled so
    /// the caller can fall back to a top-level note.
    pub async fn post_line_comment(
        &self,
        id: &ChangeRequestRef,
        body: &str,
        position: &CommentPosition,
    ) -> Result<(), GatewayError> {
        if self.token.trim().is_empty() {
            return Err(GatewayError::MissingCredential);
        }
        let url = self.mr_url(id, "/discussions");

        #[derive(serde::Serialize)]
        struct Position<'a> {
            position_type: &'a str,
            base_sha: &'a str,
            head_sha: &'a str,
            start_sha: &'a str,
            old_path: &'a str,
            new_path: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            old_line: Option<u64>,
            #[serde(skip_serializing_if = "Option::is_none")]
            new_line: Option<u64>,
        }
        #[derive(serde::Serialize)]
        struct Req<'a> {
            body: &'a str,
            position: Position<'a>,
        }

        let req = Req {
            body,
            position: Position {
                position_type: "text",
                base_sha: &position.sha.base_sha,
                head_sha: &position.sha.head_sha,
                start_sha: &position.sha.start_sha,
                old_path: &position.old_path,
                new_path: &position.new_path,
                old_line: position.old_line,
                new_line: position.new_line,
            },
        };

        debug!(
            path = %position.new_path,
            old_line = ?position.old_line,
            new_line = ?position.new_line,
            "posting line-anchored discussion"
        );

        let resp = self
            .http
            .post(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .json(&req)
            .send()
            .await
            .map_err(GatewayError::from)?;

        if resp.status() == StatusCode::CREATED {
            info!(
                path = %position.new_path,
                new_line = ?position.new_line,
                "line comment added"
            );
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.ok();
            error!(
                status,
                path = %position.new_path,
                body = ?body,
                "line comment rejected"
            );
            Err(GatewayError::HttpStatus(status))
        }
    }

    /// Protected-branch name patterns; empty on failure.
    pub async fn list_protected_branches(&self, project: &str) -> Vec<String> {
        let url = self.project_url(project, "/protected_branches");
        match self
            .http
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp
                .json::<Vec<GitLabProtectedBranch>>()
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
        let url = format!(
            "{}/repository/compare?from={}&to={}",
            self.project_url(project, ""),
            urlencoding::encode(from),
            urlencoding::encode(to)
        );
        match self
            .http
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp
                .json::<GitLabCompareResponse>()
                .await
                .map(|c| c.diffs.into_iter().map(GitLabChangeEntry::into_raw).collect())
                .unwrap_or_default(),
            Ok(resp) => {
                warn!(status = %resp.status(), "repository compare failed");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "network error on repository compare");
                Vec::new()
            }
        }
    }

    /// First parent of a commit (branch-creation anchoring).
    pub async fn get_parent_commit(&self, project: &str, commit_id: &str) -> Option<String> {
        let url = format!(
            "{}/repository/commits?ref_name={}&per_page=1&page=1",
            self.project_url(project, ""),
            urlencoding::encode(commit_id)
        );
        match self
            .http
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp
                .json::<Vec<GitLabRepoCommit>>()
                .await
                .ok()
                .and_then(|cs| cs.into_iter().next())
                .and_then(|c| c.parent_ids.into_iter().next()),
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
        let url = format!(
            "{}/repository/commits/{}/comments",
            self.project_url(project, ""),
            urlencoding::encode(commit_id)
        );

        #[derive(serde::Serialize)]
        struct Req<'a> {
            note: &'a str,
        }

        let resp = self
            .http
            .post(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .json(&Req { note: body })
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

/// --- GitLab response shapes (subset of fields we actually use) ---

#[derive(Debug, Deserialize)]
struct GitLabMr {
    #[serde(default)]
    diff_refs: GitLabDiffRefs,
}

#[derive(Debug, Default, Deserialize)]
struct GitLabDiffRefs {
    #[serde(default)]
    base_sha: Option<String>,
    #[serde(default)]
    head_sha: Option<String>,
    #[serde(default)]
    start_sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitLabChangesResponse {
    #[serde(default)]
    changes: Vec<GitLabChangeEntry>,
}

#[derive(Debug, Deserialize)]
struct GitLabChangeEntry {
    old_path: String,
    new_path: String,
    #[serde(default)]
    new_file: bool,
    #[serde(default)]
    deleted_file: bool,
    #[serde(default)]
    diff: Option<String>, // unified diff; None for binary/too-large
}

impl GitLabChangeEntry {
    fn into_raw(self) -> RawChange {
        RawChange {
            old_path: self.old_path,
            new_path: self.new_path,
            new_file: self.new_file,
            deleted_file: self.deleted_file,
            diff: self.diff.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitLabCommitEntry {
    id: String,
    title: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    author_name: String,
}

impl GitLabCommitEntry {
    fn into_info(self) -> CommitInfo {
        CommitInfo {
            id: self.id,
            title: self.title,
            message: self.message,
            author_name: self.author_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitLabProtectedBranch {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitLabCompareResponse {
    #[serde(default)]
    diffs: Vec<GitLabChangeEntry>,
}

#[derive(Debug, Deserialize)]
struct GitLabRepoCommit {
    #[serde(default)]
    parent_ids: Vec<String>,
}
