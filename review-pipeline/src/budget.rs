//! Token-budget planning for one completion call.
//!
//! Enforces the configured token ceiling before any provider call:
//!
//! 1. If the reviewable diff alone meets the ceiling, it is truncated to the
//!    first tokens that fit and all surrounding context is dropped. Language
//!    detection is re-run on the truncated text; if that is inconclusive the
//!    pre-truncation result is kept.
//! 2. Otherwise, when diff + context meets the ceiling and full file content
//!    was supplied, the content is replaced by a window of ± N lines around
//!    the hunk's target line, always recomputed from the original content,
//!    never from an already-windowed copy.
//! 3. Context pieces that still don't fit are dropped in order (content,
//!    then whole-file diff).
//! 4. If nothing fits, the planner returns an "exceeds budget" sentinel and
//!    no provider call is made.
//!
//! Estimates are conservative (see `llm-service`'s estimator), so a request
//! that plans under the ceiling stays under it at the provider.

use llm_service::TokenEstimator;
use tracing::{debug, info};

use crate::lang::{self, Language};

/// The budgeted bundle handed to the completion provider.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    /// The diff under review (single hunk, or aggregate on the push path).
    pub diff_text: String,
    /// Whole-file diff given as surrounding context, when it fits.
    pub context_diff: Option<String>,
    /// Full or windowed file content, when it fits.
    pub file_content: Option<String>,
    /// Joined commit titles/messages.
    pub commits_text: String,
    /// Language after any truncation-time re-detection.
    pub language: Language,
    /// Estimated input tokens after planning.
    pub token_count: usize,
}

/// Planner outcome: a provider-ready request, or the sentinel that stops the
/// call entirely.
#[derive(Debug, Clone)]
pub enum Planned {
    Ready(ReviewRequest),
    ExceedsBudget { tokens: usize, budget: usize },
}

/// Inputs for planning one review call.
#[derive(Debug, Clone)]
pub struct PlanInput<'a> {
    pub diff_text: &'a str,
    pub context_diff: Option<&'a str>,
    pub file_content: Option<&'a str>,
    pub commits_text: &'a str,
    /// Line the hunk centers on (new side preferred), for windowing.
    pub target_line: Option<u64>,
    /// Language detected before any reduction.
    pub language: Language,
}

/// Plans one review call against `budget` tokens.
pub fn plan(
    input: PlanInput<'_>,
    estimator: TokenEstimator,
    budget: usize,
    window_lines: usize,
) -> Planned {
    let diff_tokens = estimator.count(input.diff_text);

    // The diff alone blows the ceiling: truncate it and drop all context.
    if diff_tokens >= budget {
        info!(
            tokens = diff_tokens,
            budget, "diff exceeds token budget, truncating"
        );
        let truncated = truncate_to_tokens(input.diff_text, budget.saturating_sub(1), estimator);
        let tokens = estimator.count(&truncated);
        if truncated.trim().is_empty() || tokens >= budget {
            return Planned::ExceedsBudget {
                tokens: diff_tokens,
                budget,
            };
        }

        // Truncation may have cut away the path headers the detector needs.
        let re_detected = lang::detect(&[], &truncated);
        let language = if re_detected.is_known() {
            re_detected
        } else {
            input.language
        };
        debug!(?language, tokens, "diff truncated to fit budget");

        return Planned::Ready(ReviewRequest {
            diff_text: truncated,
            context_diff: None,
            file_content: None,
            commits_text: input.commits_text.to_string(),
            language,
            token_count: tokens,
        });
    }

    let mut context_diff = input.context_diff.map(|s| s.to_string());
    let mut file_content = input.file_content.map(|s| s.to_string());

    let total = |ctx: &Option<String>, content: &Option<String>| {
        diff_tokens
            + ctx.as_deref().map(|s| estimator.count(s)).unwrap_or(0)
            + content.as_deref().map(|s| estimator.count(s)).unwrap_or(0)
    };

    // Full file content too big: window ± N lines around the target line,
    // from the original content.
    if total(&context_diff, &file_content) >= budget {
        if let (Some(original), Some(line)) = (input.file_content, input.target_line) {
            let windowed = window_around_line(original, line, window_lines);
            info!(
                full_tokens = estimator.count(original),
                windowed_tokens = estimator.count(&windowed),
                line,
                "file content windowed to fit budget"
            );
            file_content = Some(windowed);
        }
    }

    // Drop pieces that still don't fit, least essential first.
    if total(&context_diff, &file_content) >= budget {
        debug!("windowed content still over budget, dropping file content");
        file_content = None;
    }
    if total(&context_diff, &file_content) >= budget {
        debug!("context diff over budget, dropping it");
        context_diff = None;
    }

    let tokens = total(&context_diff, &file_content);
    if tokens >= budget {
        return Planned::ExceedsBudget { tokens, budget };
    }

    Planned::Ready(ReviewRequest {
        diff_text: input.diff_text.to_string(),
        context_diff,
        file_content,
        commits_text: input.commits_text.to_string(),
        language: input.language,
        token_count: tokens,
    })
}

/// Keeps whole lines from the start of `text` while the estimate stays
/// within `max_tokens`. Falls back to a byte cut on a char boundary when
/// even the first line is too large.
fn truncate_to_tokens(text: &str, max_tokens: usize, estimator: TokenEstimator) -> String {
    if estimator.count(text) <= max_tokens {
        return text.to_string();
    }

    let mut kept = String::new();
    for line in text.split_inclusive('\n') {
        if estimator.count(&kept) + estimator.count(line) > max_tokens {
            break;
        }
        kept.push_str(line);
    }

    if kept.is_empty() {
        let mut cut = estimator.max_bytes(max_tokens).min(text.len());
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        kept = text[..cut].to_string();
    }

    kept
}

/// Extracts ± `half_width` lines around `line` (1-based), newlines kept.
/// Out-of-range lines clamp to the nearest valid position.
fn window_around_line(text: &str, line: u64, half_width: usize) -> String {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    if lines.is_empty() {
        return String::new();
    }

    let total = lines.len();
    let center = (line.max(1) as usize).min(total) - 1;
    let start = center.saturating_sub(half_width);
    let end = (center + half_width + 1).min(total);

    lines[start..end].concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn est() -> TokenEstimator {
        TokenEstimator::generic()
    }

    fn input<'a>(diff: &'a str, content: Option<&'a str>) -> PlanInput<'a> {
        PlanInput {
            diff_text: diff,
            context_diff: None,
            file_content: content,
            commits_text: "",
            target_line: Some(1),
            language: Language::Python,
        }
    }

    #[test]
    fn small_request_passes_through() {
        let planned = plan(input("+tiny\n", Some("content\n")), est(), 10_000, 500);
        match planned {
            Planned::Ready(req) => {
                assert_eq!(req.file_content.as_deref(), Some("content\n"));
                assert!(req.token_count < 10_000);
            }
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn oversized_content_is_windowed_then_fits() {
        // ~40 tokens of content against a 30-token budget; the window keeps
        // only lines near the target.
        let content: String = (1..=40).map(|i| format!("line {i}\n")).collect();
        let mut inp = input("+x\n", Some(&content));
        inp.target_line = Some(20);
        let planned = plan(inp, est(), 30, 2);
        match planned {
            Planned::Ready(req) => {
                let windowed = req.file_content.unwrap();
                assert!(windowed.contains("line 20"));
                assert!(!windowed.contains("line 1\n"));
                assert!(req.token_count < 30);
            }
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn planned_request_never_exceeds_budget_after_reduction() {
        let content: String = (1..=200).map(|i| format!("content line {i}\n")).collect();
        let diff: String = (1..=20).map(|i| format!("+diff line {i}\n")).collect();
        let budget = 120;
        match plan(input(&diff, Some(&content)), est(), budget, 5) {
            Planned::Ready(req) => assert!(req.token_count < budget),
            Planned::ExceedsBudget { .. } => {}
        }
    }

    #[test]
    fn oversized_diff_is_truncated_and_context_dropped() {
        let diff: String = std::iter::once("+++ b/big.py\n".to_string())
            .chain((1..=500).map(|i| format!("+statement_{i}()\n")))
            .collect();
        let planned = plan(input(&diff, Some("ctx\n")), est(), 100, 500);
        match planned {
            Planned::Ready(req) => {
                assert!(req.token_count < 100);
                assert!(req.file_content.is_none());
                assert!(req.diff_text.len() < diff.len());
                // Path header survived, so detection still says Python.
                assert_eq!(req.language, Language::Python);
            }
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn truncation_keeps_pre_detected_language_when_signal_is_lost() {
        // One enormous first line: truncation falls back to a byte cut that
        // destroys any path/content signal.
        let diff = format!("+{}\n", "x".repeat(4_000));
        let mut inp = input(&diff, None);
        inp.language = Language::Java;
        match plan(inp, est(), 50, 500) {
            Planned::Ready(req) => assert_eq!(req.language, Language::Java),
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn nothing_fits_yields_sentinel() {
        let diff = "+abcdefgh\n".repeat(10);
        match plan(input(&diff, None), est(), 1, 500) {
            Planned::ExceedsBudget { budget, .. } => assert_eq!(budget, 1),
            other => panic!("expected sentinel, got {other:?}"),
        }
    }

    #[test]
    fn window_clamps_at_file_edges() {
        let text = "a\nb\nc\n";
        assert_eq!(window_around_line(text, 1, 1), "a\nb\n");
        assert_eq!(window_around_line(text, 99, 1), "b\nc\n");
        assert_eq!(window_around_line("", 5, 10), "");
    }
}
