//! Diff normalization: platform change lists → addressable hunks.
//!
//! Features:
//! - Filters out deleted files and non-allow-listed extensions.
//! - Derives addition/deletion counts with a line-anchored scan
//!   (`+` lines excluding `+++`, `-` lines excluding `---`).
//! - Splits a file's unified diff into independent `@@ ... @@` blocks,
//!   keeping header and body text verbatim (blank lines carry line-number
//!   semantics, so nothing is trimmed).
//! - Extracts old/new line positions from hunk headers without ever raising
//!   on malformed input.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::gateway::types::RawChange;

lazy_static! {
    /// Start of a unified-diff hunk header, anchored to line starts.
    static ref HUNK_HEADER: Regex =
        Regex::new(r"(?m)^@@ -\d+(?:,\d+)? \+\d+(?:,\d+)? @@").unwrap();
}

/// One file's change record, normalized and counted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub old_path: String,
    pub new_path: String,
    pub is_new: bool,
    pub is_deleted: bool,
    /// Raw unified diff text for the whole file.
    pub diff: String,
    pub additions: usize,
    pub deletions: usize,
}

/// One `@@ ... @@` block of a file's diff, header and body verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffHunk {
    pub text: String,
}

impl DiffHunk {
    /// Line position derived from this hunk's header.
    pub fn position(&self) -> LinePosition {
        extract_line_numbers(&self.text)
    }
}

/// Old/new line anchor derived from a hunk header.
///
/// Exactly one side is absent for pure-addition or pure-deletion hunks;
/// both are present for modification hunks; both absent when the header was
/// malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePosition {
    pub old_line: Option<u64>,
    pub new_line: Option<u64>,
}

impl LinePosition {
    pub fn unknown() -> Self {
        Self {
            old_line: None,
            new_line: None,
        }
    }

    /// At least one side resolved.
    pub fn is_known(&self) -> bool {
        self.old_line.is_some() || self.new_line.is_some()
    }

    /// The line the review should center on (new side preferred).
    pub fn target_line(&self) -> Option<u64> {
        self.new_line.or(self.old_line)
    }
}

/// Filters a platform change list down to reviewable files and derives
/// addition/deletion counts.
///
/// Deleted files are dropped unconditionally; the rest are kept only when
/// the new path ends with one of the allow-listed extensions (case-sensitive
/// suffix match).
pub fn normalize(raw: &[RawChange], allowlist: &[String]) -> Vec<FileChange> {
    raw.iter()
        .filter(|c| !c.deleted_file)
        .filter(|c| allowlist.iter().any(|ext| c.new_path.ends_with(ext)))
        .map(|c| FileChange {
            old_path: c.old_path.clone(),
            new_path: c.new_path.clone(),
            is_new: c.new_file,
            is_deleted: c.deleted_file,
            diff: c.diff.clone(),
            additions: count_additions(&c.diff),
            deletions: count_deletions(&c.diff),
        })
        .collect()
}

/// Counts added lines: `+`-prefixed, excluding the `+++` file header.
pub fn count_additions(diff: &str) -> usize {
    diff.lines()
        .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
        .count()
}

/// Counts removed lines: `-`-prefixed, excluding the `---` file header.
pub fn count_deletions(diff: &str) -> usize {
    diff.lines()
        .filter(|l| l.starts_with('-') && !l.starts_with("---"))
        .count()
}

/// Splits a file's diff text into independent hunks.
///
/// Each block starts at an `@@ ... @@` header and runs to the next header or
/// the end of the text. Body text is kept byte-for-byte; blocks that are
/// empty after trimming are discarded.
pub fn split(change: &FileChange) -> Vec<DiffHunk> {
    split_text(&change.diff)
}

fn split_text(diff: &str) -> Vec<DiffHunk> {
    let starts: Vec<usize> = HUNK_HEADER.find_iter(diff).map(|m| m.start()).collect();
    let mut hunks = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(diff.len());
        let block = &diff[start..end];
        if !block.trim().is_empty() {
            hunks.push(DiffHunk {
                text: block.to_string(),
            });
        }
    }
    hunks
}

/// Extracts the old/new line anchor from the first hunk header in `diff_text`.
///
/// Header shape: `@@ -<oldStart>[,<oldLen>] +<newStart>[,<newLen>] @@`.
/// An old start of `0` classifies the hunk as pure addition, a new start of
/// `0` as pure deletion; anything else is a modification carrying both.
/// Malformed or non-numeric headers yield `(None, None)`.
pub fn extract_line_numbers(diff_text: &str) -> LinePosition {
    for line in diff_text.lines() {
        if !(line.starts_with("@@") && line[2..].contains("@@")) {
            continue;
        }
        // Middle section between the two `@@` markers, e.g. "-30,7 +30,7".
        let Some(info) = line.split("@@").nth(1) else {
            continue;
        };
        let parts: Vec<&str> = info.split_whitespace().collect();
        if parts.len() != 2 {
            continue;
        }

        let old_start = start_of(parts[0].strip_prefix('-').unwrap_or(parts[0]));
        let new_start = start_of(parts[1].strip_prefix('+').unwrap_or(parts[1]));

        return match (old_start, new_start) {
            (Some(0), _) => LinePosition {
                old_line: None,
                new_line: new_start,
            },
            (_, Some(0)) => LinePosition {
                old_line: old_start,
                new_line: None,
            },
            _ => LinePosition {
                old_line: old_start,
                new_line: new_start,
            },
        };
    }
    LinePosition::unknown()
}

/// Parses "30,7" or "30" into its start component; `None` when non-numeric.
fn start_of(part: &str) -> Option<u64> {
    let head = part.split(',').next().unwrap_or(part);
    head.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(new_path: &str, diff: &str, deleted: bool) -> RawChange {
        RawChange {
            old_path: new_path.to_string(),
            new_path: new_path.to_string(),
            new_file: false,
            deleted_file: deleted,
            diff: diff.to_string(),
        }
    }

    const TWO_HUNKS: &str = "@@ -10,3 +10,4 @@ def f():\n a\n-b\n+b2\n+b3\n a\n\n@@ -40,2 +41,2 @@\n-x\n+y\n x\n";

    #[test]
    fn modification_header_yields_both_lines() {
        let pos = extract_line_numbers("@@ -30,7 +30,7 @@ fn main()\n-a\n+b\n");
        assert_eq!(pos.old_line, Some(30));
        assert_eq!(pos.new_line, Some(30));
    }

    #[test]
    fn pure_addition_drops_old_line() {
        let pos = extract_line_numbers("@@ -0,0 +1,12 @@\n+line\n");
        assert_eq!(pos.old_line, None);
        assert_eq!(pos.new_line, Some(1));
    }

    #[test]
    fn pure_deletion_drops_new_line() {
        let pos = extract_line_numbers("@@ -5,3 +0,0 @@\n-line\n");
        assert_eq!(pos.old_line, Some(5));
        assert_eq!(pos.new_line, None);
    }

    #[test]
    fn malformed_header_yields_unknown() {
        assert_eq!(
            extract_line_numbers("@@ garbage @@\n+x\n"),
            LinePosition::unknown()
        );
        assert_eq!(extract_line_numbers("no hunks here"), LinePosition::unknown());
        assert_eq!(
            extract_line_numbers("@@ -a,7 +b,7 @@\n"),
            LinePosition::unknown()
        );
    }

    #[test]
    fn single_line_header_without_lengths() {
        let pos = extract_line_numbers("@@ -5 +5,2 @@\n-line\n+l1\n+l2\n");
        assert_eq!(pos.old_line, Some(5));
        assert_eq!(pos.new_line, Some(5));
    }

    #[test]
    fn split_keeps_every_change_line() {
        let fc = FileChange {
            old_path: "a.py".into(),
            new_path: "a.py".into(),
            is_new: false,
            is_deleted: false,
            diff: TWO_HUNKS.into(),
            additions: count_additions(TWO_HUNKS),
            deletions: count_deletions(TWO_HUNKS),
        };
        let hunks = split(&fc);
        assert_eq!(hunks.len(), 2);

        // Concatenated hunk bodies reproduce exactly the add/del counts of
        // the original text.
        let merged: String = hunks.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(count_additions(&merged), fc.additions);
        assert_eq!(count_deletions(&merged), fc.deletions);

        // Blank lines inside a block survive splitting untouched.
        assert!(hunks[0].text.contains("\n\n"));
    }

    #[test]
    fn split_positions_match_headers() {
        let fc = FileChange {
            old_path: "a.py".into(),
            new_path: "a.py".into(),
            is_new: false,
            is_deleted: false,
            diff: TWO_HUNKS.into(),
            additions: 0,
            deletions: 0,
        };
        let hunks = split(&fc);
        assert_eq!(hunks[0].position().old_line, Some(10));
        assert_eq!(hunks[1].position().new_line, Some(41));
    }

    #[test]
    fn normalize_drops_deleted_regardless_of_extension() {
        let changes = vec![
            raw("kept.py", "@@ -1,1 +1,1 @@\n-a\n+b\n", false),
            raw("gone.py", "@@ -1,1 +0,0 @@\n-a\n", true),
            raw("other.rs", "@@ -1,1 +1,1 @@\n-a\n+b\n", false),
        ];
        let allow = vec![".java".to_string(), ".py".to_string(), ".php".to_string()];
        let out = normalize(&changes, &allow);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].new_path, "kept.py");
        assert_eq!(out[0].additions, 1);
        assert_eq!(out[0].deletions, 1);
    }

    #[test]
    fn counts_exclude_file_headers() {
        let diff = "--- a/x.py\n+++ b/x.py\n@@ -1,2 +1,3 @@\n a\n+b\n+c\n-d\n";
        assert_eq!(count_additions(diff), 2);
        assert_eq!(count_deletions(diff), 1);
    }
}
