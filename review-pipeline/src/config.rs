//! Immutable pipeline configuration.
//!
//! Built once at process start from the environment and passed to
//! constructors; there is no runtime mutation and no global state.

use std::str::FromStr;

/// Tone selector for review prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStyle {
    Professional,
    Gentle,
    Humorous,
}

impl FromStr for ReviewStyle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "professional" => Ok(ReviewStyle::Professional),
            "gentle" => Ok(ReviewStyle::Gentle),
            "humorous" => Ok(ReviewStyle::Humorous),
            _ => Err(()),
        }
    }
}

/// Pipeline knobs, read once from the environment.
#[derive(Debug, Clone)]
pub struct ReviewConfig {
    /// Allow-list of reviewable file extensions (case-sensitive suffixes).
    pub supported_extensions: Vec<String>,
    /// Token ceiling per completion call.
    pub review_max_tokens: usize,
    /// Prompt tone.
    pub review_style: ReviewStyle,
    /// Review pushes (not just merge requests).
    pub push_review_enabled: bool,
    /// Review merge requests only when the target branch is protected.
    pub merge_review_only_protected_branches: bool,
    /// Half-width of the file-content window used when a file blows the
    /// token ceiling.
    pub context_window_lines: usize,
    /// Per-call HTTP timeout for platform requests, seconds.
    pub http_timeout_secs: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            supported_extensions: split_extensions(".java,.py,.php"),
            review_max_tokens: 10_000,
            review_style: ReviewStyle::Professional,
            push_review_enabled: false,
            merge_review_only_protected_branches: false,
            context_window_lines: 500,
            http_timeout_secs: 10,
        }
    }
}

impl ReviewConfig {
    /// Reads the configuration surface from the environment, falling back to
    /// defaults field by field.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            supported_extensions: std::env::var("SUPPORTED_EXTENSIONS")
                .map(|v| split_extensions(&v))
                .unwrap_or(defaults.supported_extensions),
            review_max_tokens: env_usize("REVIEW_MAX_TOKENS", defaults.review_max_tokens),
            review_style: std::env::var("REVIEW_STYLE")
                .ok()
                .and_then(|v| ReviewStyle::from_str(&v).ok())
                .unwrap_or(defaults.review_style),
            push_review_enabled: env_bool("PUSH_REVIEW_ENABLED", defaults.push_review_enabled),
            merge_review_only_protected_branches: env_bool(
                "MERGE_REVIEW_ONLY_PROTECTED_BRANCHES_ENABLED",
                defaults.merge_review_only_protected_branches,
            ),
            context_window_lines: defaults.context_window_lines,
            http_timeout_secs: defaults.http_timeout_secs,
        }
    }
}

fn split_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub(crate) fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

pub(crate) fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_extension_set() {
        let cfg = ReviewConfig::default();
        assert_eq!(cfg.supported_extensions, vec![".java", ".py", ".php"]);
        assert_eq!(cfg.review_max_tokens, 10_000);
    }

    #[test]
    fn extension_splitting_trims_and_drops_empties() {
        assert_eq!(
            split_extensions(" .py, .rs ,,.go"),
            vec![".py", ".rs", ".go"]
        );
    }
}
