//! Review orchestration: one webhook event, end to end.
//!
//! State machine per event:
//! `Received → Filtered → (Skipped | ReadyForReview) → PerHunkReview* →
//! Aggregated → Published → Dispatched`.
//!
//! - Merge/pull requests are reviewed per hunk: each hunk gets its own
//!   budgeted context and its own completion call, never aggregated into one
//!   prompt, so cost and latency stay bounded regardless of MR size.
//! - Pushes (when enabled) are reviewed as one aggregate call and the result
//!   is posted as a commit comment; there is no line anchor to attach to.
//! - A single hunk failing its completion call is isolated: logged, its
//!   annotation skipped, processing continues with the remaining hunks.
//! - Any error escaping a run is caught at [`Orchestrator::handle_event`],
//!   logged with context, and reported to the alert channel; it never takes
//!   the worker down or blocks other events.

pub mod score;
pub mod strategy;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::budget::{self, PlanInput, Planned};
use crate::config::ReviewConfig;
use crate::diff;
use crate::dispatch::{CommitSummary, EventDispatcher, OutcomeKind, ReviewOutcome};
use crate::errors::PipelineResult;
use crate::events::{BranchKind, MergeRequestEvent, PushEvent, WebhookEvent};
use crate::gateway::{ChangeRequestRef, VcsGateway};
use crate::lang;
use crate::provider::CompletionProvider;
use crate::publish::publish_annotation;

/// Actions that make a merge/pull request reviewable.
const REVIEWABLE_ACTIONS: &[&str] = &["opened", "reopened"];

/// Placeholder context used for newly added files, whose diff already is the
/// full content.
const NEW_FILE_NOTICE: &str = "The change adds a new file; the diff is its full content.";

/// Outcome text when a push touched no allow-listed files.
const NO_REVIEWABLE_CHANGES: &str = "No files of interest were modified.";

/// Terminal state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Filtered out before any review work (wrong action, no survivors).
    Skipped,
    /// Ran to the end and dispatched an outcome.
    Completed,
    /// Provider was unreachable for the whole event; alerted, no outcome.
    Dropped,
}

/// Sequences normalization → budgeting → completion → publication for one
/// webhook event.
pub struct Orchestrator<G, P> {
    cfg: Arc<ReviewConfig>,
    gateway: G,
    provider: P,
    dispatcher: EventDispatcher,
}

impl<G, P> Orchestrator<G, P>
where
    G: VcsGateway,
    P: CompletionProvider,
{
    pub fn new(cfg: Arc<ReviewConfig>, gateway: G, provider: P, dispatcher: EventDispatcher) -> Self {
        Self {
            cfg,
            gateway,
            provider,
            dispatcher,
        }
    }

    /// Runs the pipeline for one event, absorbing every error at this
    /// boundary: failures are logged with full context and pushed to the
    /// alert channel, never propagated to the worker.
    pub async fn handle_event(&self, event: WebhookEvent) -> RunStatus {
        let t0 = Instant::now();
        let result = match event {
            WebhookEvent::MergeRequest(ev) => self.review_merge_request(ev).await,
            WebhookEvent::Push(ev) => self.review_push(ev).await,
        };
        match result {
            Ok(status) => {
                info!(?status, elapsed_ms = t0.elapsed().as_millis(), "run finished");
                status
            }
            Err(e) => {
                error!(target: "alerts", error = %e, "pipeline run failed");
                RunStatus::Dropped
            }
        }
    }

    /// Merge-request path: per-hunk review with line-anchored annotations.
    async fn review_merge_request(&self, ev: MergeRequestEvent) -> PipelineResult<RunStatus> {
        let id = ChangeRequestRef {
            project: ev.project.id.clone(),
            iid: ev.iid,
        };

        // Filtered: only freshly opened/reopened requests are reviewed;
        // `updated` would re-review and duplicate comments.
        if !REVIEWABLE_ACTIONS.contains(&ev.action.as_str()) {
            info!(action = %ev.action, iid = ev.iid, "action not reviewable, skipping");
            return Ok(RunStatus::Skipped);
        }

        if self.cfg.merge_review_only_protected_branches {
            let patterns = self.gateway.list_protected_branches(&id.project).await;
            if !patterns
                .iter()
                .any(|p| wildcard_match(p, &ev.target_branch))
            {
                info!(
                    target = %ev.target_branch,
                    "target branch not protected, skipping"
                );
                return Ok(RunStatus::Skipped);
            }
        }

        let commits = self.gateway.get_commits(&id).await;
        if commits.is_empty() {
            warn!(iid = ev.iid, "no commits available for merge request");
            return Ok(RunStatus::Skipped);
        }
        let commits_text = commits
            .iter()
            .map(|c| c.title.as_str())
            .collect::<Vec<_>>()
            .join(";");
        debug!(%commits_text, "commit context assembled");

        let raw = self.gateway.get_changes(&id).await;
        let changes = diff::normalize(&raw, &self.cfg.supported_extensions);
        if changes.is_empty() {
            info!(
                iid = ev.iid,
                "no changes survive the extension filter, skipping"
            );
            return Ok(RunStatus::Skipped);
        }
        let additions: usize = changes.iter().map(|c| c.additions).sum();
        let deletions: usize = changes.iter().map(|c| c.deletions).sum();
        info!(
            files = changes.len(),
            additions, deletions, "ready for review"
        );

        // Fetched once per run, cached in locals for its lifetime only.
        let sha = self.gateway.get_sha_triple(&id).await;

        let mut reviewed = 0usize;
        let mut completion_failures = 0usize;
        let mut last_review_text = String::new();
        let mut last_score = 0u32;

        for change in &changes {
            // Modified files get their post-change content as context; for
            // new files the hunk already is the whole story.
            let file_content = if change.is_new {
                Some(NEW_FILE_NOTICE.to_string())
            } else {
                self.gateway
                    .get_file_content(
                        &id.project,
                        &change.new_path,
                        ev.resolve_branch(BranchKind::Source),
                    )
                    .await
            };

            for hunk in diff::split(change) {
                let position = hunk.position();
                let language = lang::detect(&[change.new_path.as_str()], &hunk.text);

                let planned = budget::plan(
                    PlanInput {
                        diff_text: &hunk.text,
                        context_diff: Some(&change.diff),
                        file_content: file_content.as_deref(),
                        commits_text: &commits_text,
                        target_line: position.target_line(),
                        language,
                    },
                    self.provider.estimator(),
                    self.cfg.review_max_tokens,
                    self.cfg.context_window_lines,
                );

                let request = match planned {
                    Planned::Ready(r) => r,
                    Planned::ExceedsBudget { tokens, budget } => {
                        warn!(
                            path = %change.new_path,
                            tokens,
                            budget,
                            "hunk exceeds token budget even after reduction, skipping"
                        );
                        continue;
                    }
                };

                let messages = strategy::hunk_messages(&request, self.cfg.review_style);
                let review_text = match self.provider.complete(&messages).await {
                    Ok(t) => strip_markdown_fence(t.trim()).to_string(),
                    Err(e) => {
                        // Isolation: one failed hunk never aborts the event.
                        completion_failures += 1;
                        warn!(
                            error = %e,
                            path = %change.new_path,
                            "completion call failed for hunk, continuing"
                        );
                        continue;
                    }
                };

                // Annotations post sequentially so comments read
                // top-to-bottom in hunk order.
                if let Err(e) = publish_annotation(
                    &self.gateway,
                    &id,
                    &review_text,
                    position,
                    &change.old_path,
                    &change.new_path,
                    &sha,
                )
                .await
                {
                    warn!(error = %e, path = %change.new_path, "annotation lost for hunk");
                }

                last_score = score::parse_review_score(&review_text);
                last_review_text = review_text;
                reviewed += 1;
            }
        }

        if reviewed == 0 {
            if completion_failures > 0 {
                error!(
                    target: "alerts",
                    iid = ev.iid,
                    failures = completion_failures,
                    "completion provider unreachable for every hunk, dropping event"
                );
            } else {
                warn!(iid = ev.iid, "no hunk fit the review budget, dropping event");
            }
            return Ok(RunStatus::Dropped);
        }

        self.dispatcher.dispatch(ReviewOutcome {
            kind: OutcomeKind::MergeRequest,
            project_name: ev.project.name.clone(),
            author: ev.author.clone(),
            source_branch: ev.source_branch.clone(),
            target_branch: ev.target_branch.clone(),
            url: Some(ev.url.clone()),
            commits: summarize_commits(&commits),
            additions,
            deletions,
            score: last_score,
            review_text: last_review_text,
            updated_at: Utc::now().timestamp(),
        });

        Ok(RunStatus::Completed)
    }

    /// Push path: aggregate review of the compared range, posted as a commit
    /// comment. Runs only when enabled; the outcome record is dispatched
    /// either way so reporting sees every push.
    async fn review_push(&self, ev: PushEvent) -> PipelineResult<RunStatus> {
        if ev.commits.is_empty() {
            warn!(branch = %ev.branch, "push carries no commits, skipping");
            return Ok(RunStatus::Skipped);
        }

        let commit_summaries: Vec<CommitSummary> = ev
            .commits
            .iter()
            .map(|c| CommitSummary {
                id: c.id.clone(),
                title: c.message.lines().next().unwrap_or_default().to_string(),
                author: c.author.clone(),
            })
            .collect();

        let mut review_text = String::new();
        let mut score = 0u32;
        let mut additions = 0usize;
        let mut deletions = 0usize;

        if self.cfg.push_review_enabled {
            let changes = self.fetch_push_changes(&ev).await;
            let changes = diff::normalize(&changes, &self.cfg.supported_extensions);

            review_text = NO_REVIEWABLE_CHANGES.to_string();

            if !changes.is_empty() {
                additions = changes.iter().map(|c| c.additions).sum();
                deletions = changes.iter().map(|c| c.deletions).sum();

                let aggregate = aggregate_diff_text(&changes);
                let language = lang::detect(&[], &aggregate);
                let commits_text = ev
                    .commits
                    .iter()
                    .map(|c| c.message.trim())
                    .collect::<Vec<_>>()
                    .join(";");

                let planned = budget::plan(
                    PlanInput {
                        diff_text: &aggregate,
                        context_diff: None,
                        file_content: None,
                        commits_text: &commits_text,
                        target_line: None,
                        language,
                    },
                    self.provider.estimator(),
                    self.cfg.review_max_tokens,
                    self.cfg.context_window_lines,
                );

                match planned {
                    Planned::Ready(request) => {
                        let messages =
                            strategy::aggregate_messages(&request, self.cfg.review_style);
                        match self.provider.complete(&messages).await {
                            Ok(t) => {
                                review_text = strip_markdown_fence(t.trim()).to_string();
                                score = score::parse_review_score(&review_text);
                            }
                            Err(e) => {
                                error!(
                                    target: "alerts",
                                    error = %e,
                                    branch = %ev.branch,
                                    "completion call failed for push, dropping event"
                                );
                                return Ok(RunStatus::Dropped);
                            }
                        }
                    }
                    Planned::ExceedsBudget { tokens, budget } => {
                        warn!(tokens, budget, "push diff exceeds review budget");
                        review_text =
                            "The pushed change set exceeds the review budget and was not reviewed."
                                .to_string();
                    }
                }
            }

            // Push results land on the head commit; a lost comment is logged
            // but the outcome still gets dispatched.
            if let Some(last) = ev.commits.last() {
                let body = format!("Auto review result:\n{}", review_text);
                if let Err(e) = self
                    .gateway
                    .post_commit_comment(&ev.project.id, &last.id, &body)
                    .await
                {
                    warn!(error = %e, commit = %last.id, "failed to comment on push commit");
                }
            }
        }

        self.dispatcher.dispatch(ReviewOutcome {
            kind: OutcomeKind::Push,
            project_name: ev.project.name.clone(),
            author: ev.author.clone(),
            source_branch: ev.branch.clone(),
            target_branch: String::new(),
            url: None,
            commits: commit_summaries,
            additions,
            deletions,
            score,
            review_text,
            updated_at: Utc::now().timestamp(),
        });

        Ok(RunStatus::Completed)
    }

    /// Resolves the compare range for a push. Branch deletions have nothing
    /// to review; branch creations anchor on the first commit's parent.
    async fn fetch_push_changes(&self, ev: &PushEvent) -> Vec<crate::gateway::RawChange> {
        if ev.before.is_empty() || ev.after.is_empty() {
            return Vec::new();
        }
        if ev.after.starts_with("0000000") {
            debug!(branch = %ev.branch, "branch deleted, nothing to review");
            return Vec::new();
        }

        let mut before = ev.before.clone();
        if before.starts_with("0000000") {
            if let Some(first) = ev.commits.first() {
                if let Some(parent) = self
                    .gateway
                    .get_parent_commit(&ev.project.id, &first.id)
                    .await
                {
                    debug!(%parent, "branch created, comparing from first parent");
                    before = parent;
                }
            }
        }

        self.gateway.compare(&ev.project.id, &before, &ev.after).await
    }
}

fn summarize_commits(commits: &[crate::gateway::CommitInfo]) -> Vec<CommitSummary> {
    commits
        .iter()
        .map(|c| CommitSummary {
            id: c.id.clone(),
            title: c.title.clone(),
            author: c.author_name.clone(),
        })
        .collect()
}

/// Joins normalized changes back into one reviewable diff document, adding
/// file headers where the platform stripped them.
fn aggregate_diff_text(changes: &[diff::FileChange]) -> String {
    let mut out = String::new();
    for change in changes {
        if !change.diff.starts_with("diff --git") {
            out.push_str(&format!(
                "diff --git a/{old} b/{new}\n--- a/{old}\n+++ b/{new}\n",
                old = change.old_path,
                new = change.new_path
            ));
        }
        out.push_str(&change.diff);
        if !change.diff.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// Strips a surrounding ```` ```markdown ```` fence when the model wrapped
/// its whole answer in one.
fn strip_markdown_fence(text: &str) -> &str {
    if let Some(rest) = text.strip_prefix("```markdown") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    text
}

/// Minimal `*`/`?` wildcard match used for protected-branch patterns
/// (`release/*`, `main`). Case-sensitive, whole-string.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();

    // Iterative glob with single backtrack point for '*'.
    let (mut pi, mut ni) = (0usize, 0usize);
    let (mut star, mut mark) = (usize::MAX, 0usize);

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = pi;
            mark = ni;
            pi += 1;
        } else if star != usize::MAX {
            pi = star + 1;
            mark += 1;
            ni = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_patterns() {
        assert!(wildcard_match("main", "main"));
        assert!(wildcard_match("release/*", "release/1.2"));
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("v?", "v1"));
        assert!(!wildcard_match("release/*", "hotfix/1.2"));
        assert!(!wildcard_match("main", "maintenance"));
    }

    #[test]
    fn markdown_fence_stripping() {
        assert_eq!(
            strip_markdown_fence("```markdown\n# Review\nok\n```"),
            "# Review\nok"
        );
        assert_eq!(strip_markdown_fence("plain text"), "plain text");
        assert_eq!(strip_markdown_fence("```markdown unclosed"), "```markdown unclosed");
    }

    #[test]
    fn aggregate_adds_missing_file_headers() {
        let changes = vec![diff::FileChange {
            old_path: "a.py".into(),
            new_path: "a.py".into(),
            is_new: false,
            is_deleted: false,
            diff: "@@ -1 +1 @@\n-a\n+b\n".into(),
            additions: 1,
            deletions: 1,
        }];
        let text = aggregate_diff_text(&changes);
        assert!(text.starts_with("diff --git a/a.py b/a.py\n"));
        assert!(text.contains("+++ b/a.py\n"));
    }
}
