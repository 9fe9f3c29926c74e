//! Platform-agnostic wire types for the VCS gateway.
//!
//! These are the normalized shapes the gateway produces; provider response
//! structs (modeling only the fields actually used) live next to each client.

use serde::{Deserialize, Serialize};

/// A unique reference to a change request inside a platform.
///
/// * `project` – GitLab: numeric ID or "group/project"; GitHub: "owner/repo".
/// * `iid`     – GitLab MR IID or GitHub PR number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequestRef {
    pub project: String,
    pub iid: u64,
}

/// The three commit references required to anchor a line comment to an exact
/// diff version.
///
/// Fields left empty when a best-effort fetch could not obtain them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShaTriple {
    pub base_sha: String,
    pub head_sha: String,
    pub start_sha: String,
}

impl ShaTriple {
    /// All three references resolved.
    pub fn is_complete(&self) -> bool {
        !self.base_sha.is_empty() && !self.head_sha.is_empty() && !self.start_sha.is_empty()
    }

    /// Names of the still-empty fields (used for retry decisions and logs).
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.base_sha.is_empty() {
            missing.push("base_sha");
        }
        if self.head_sha.is_empty() {
            missing.push("head_sha");
        }
        if self.start_sha.is_empty() {
            missing.push("start_sha");
        }
        missing
    }
}

/// One file's change as reported by the platform, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChange {
    pub old_path: String,
    pub new_path: String,
    pub new_file: bool,
    pub deleted_file: bool,
    /// Unified diff text; empty for binary/too-large entries.
    pub diff: String,
}

/// One commit belonging to the change request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    pub id: String,
    pub title: String,
    pub message: String,
    pub author_name: String,
}

/// Position payload for a line-anchored comment.
#[derive(Debug, Clone)]
pub struct CommentPosition {
    pub sha: ShaTriple,
    pub old_path: String,
    pub new_path: String,
    pub old_line: Option<u64>,
    pub new_line: Option<u64>,
}
