//! End-to-end pipeline scenarios against in-memory gateway/provider fakes.

use std::sync::{Arc, Mutex};

use llm_service::error_handler::{ProviderError, ProviderErrorKind};
use llm_service::{ChatMessage, LlmError, LlmProvider, TokenEstimator};

use review_pipeline::config::ReviewConfig;
use review_pipeline::dispatch::EventDispatcher;
use review_pipeline::errors::GatewayError;
use review_pipeline::events::{MergeRequestEvent, Platform, ProjectRef, WebhookEvent};
use review_pipeline::gateway::{
    ChangeRequestRef, CommentPosition, CommitInfo, RawChange, ShaTriple, VcsGateway,
};
use review_pipeline::provider::CompletionProvider;
use review_pipeline::publish::FALLBACK_NOTICE;
use review_pipeline::review::{Orchestrator, RunStatus};

/// Gateway double: canned responses, every interaction recorded.
#[derive(Clone, Default)]
struct FakeGateway {
    changes: Vec<RawChange>,
    commits: Vec<CommitInfo>,
    sha: ShaTriple,
    reject_line_comments: bool,
    calls: Arc<Mutex<Vec<String>>>,
    line_comments: Arc<Mutex<Vec<(CommentPosition, String)>>>,
    notes: Arc<Mutex<Vec<String>>>,
}

impl FakeGateway {
    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

impl VcsGateway for FakeGateway {
    async fn get_changes(&self, _id: &ChangeRequestRef) -> Vec<RawChange> {
        self.record("get_changes");
        self.changes.clone()
    }

    async fn get_diffs(&self, _id: &ChangeRequestRef) -> Vec<RawChange> {
        self.record("get_diffs");
        self.changes.clone()
    }

    async fn get_commits(&self, _id: &ChangeRequestRef) -> Vec<CommitInfo> {
        self.record("get_commits");
        self.commits.clone()
    }

    async fn get_sha_triple(&self, _id: &ChangeRequestRef) -> ShaTriple {
        self.record("get_sha_triple");
        self.sha.clone()
    }

    async fn get_file_content(
        &self,
        _project: &str,
        _path: &str,
        _git_ref: &str,
    ) -> Option<String> {
        self.record("get_file_content");
        Some("def f():\n    return 1\n".to_string())
    }

    async fn post_note(&self, _id: &ChangeRequestRef, body: &str) -> Result<(), GatewayError> {
        self.record("post_note");
        self.notes.lock().unwrap().push(body.to_string());
        Ok(())
    }

    async fn post_line_comment(
        &self,
        _id: &ChangeRequestRef,
        body: &str,
        position: &CommentPosition,
    ) -> Result<(), GatewayError> {
        self.record("post_line_comment");
        self.line_comments
            .lock()
            .unwrap()
            .push((position.clone(), body.to_string()));
        if self.reject_line_comments {
            Err(GatewayError::HttpStatus(422))
        } else {
            Ok(())
        }
    }

    async fn list_protected_branches(&self, _project: &str) -> Vec<String> {
        self.record("list_protected_branches");
        Vec::new()
    }

    async fn compare(&self, _project: &str, _from: &str, _to: &str) -> Vec<RawChange> {
        self.record("compare");
        self.changes.clone()
    }

    async fn get_parent_commit(&self, _project: &str, _commit_id: &str) -> Option<String> {
        self.record("get_parent_commit");
        None
    }

    async fn post_commit_comment(
        &self,
        _project: &str,
        _commit_id: &str,
        body: &str,
    ) -> Result<(), GatewayError> {
        self.record("post_commit_comment");
        self.notes.lock().unwrap().push(body.to_string());
        Ok(())
    }
}

/// Provider double: fixed reply, call counting, optional hard failure.
#[derive(Clone)]
struct FakeProvider {
    reply: String,
    fail: bool,
    calls: Arc<Mutex<usize>>,
}

impl FakeProvider {
    fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail: false,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    fn unreachable() -> Self {
        Self {
            reply: String::new(),
            fail: true,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl CompletionProvider for FakeProvider {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            Err(ProviderError::new(LlmProvider::OpenAi, ProviderErrorKind::EmptyResult).into())
        } else {
            Ok(self.reply.clone())
        }
    }

    fn count_tokens(&self, text: &str) -> usize {
        TokenEstimator::generic().count(text)
    }

    fn estimator(&self) -> TokenEstimator {
        TokenEstimator::generic()
    }
}

const PY_HUNK: &str = "@@ -10,3 +10,4 @@ def f():\n a\n-b\n+b2\n+b3\n a\n";

fn python_change() -> RawChange {
    RawChange {
        old_path: "app/main.py".into(),
        new_path: "app/main.py".into(),
        new_file: false,
        deleted_file: false,
        diff: PY_HUNK.into(),
    }
}

fn sha() -> ShaTriple {
    ShaTriple {
        base_sha: "base000".into(),
        head_sha: "head000".into(),
        start_sha: "start000".into(),
    }
}

fn one_commit() -> Vec<CommitInfo> {
    vec![CommitInfo {
        id: "head000".into(),
        title: "fix: adjust f".into(),
        message: "fix: adjust f\n".into(),
        author_name: "Alice".into(),
    }]
}

fn mr_event(action: &str) -> WebhookEvent {
    WebhookEvent::MergeRequest(MergeRequestEvent {
        platform: Platform::GitLab,
        project: ProjectRef {
            id: "7".into(),
            name: "demo".into(),
        },
        iid: 42,
        action: action.into(),
        title: "Adjust f".into(),
        author: "alice".into(),
        source_branch: "feature".into(),
        target_branch: "main".into(),
        url: "https://git.example.com/demo/-/merge_requests/42".into(),
    })
}

fn orchestrator(
    gateway: FakeGateway,
    provider: FakeProvider,
) -> (Orchestrator<FakeGateway, FakeProvider>, EventDispatcher) {
    let dispatcher = EventDispatcher::new(8);
    let orch = Orchestrator::new(
        Arc::new(ReviewConfig::default()),
        gateway,
        provider,
        dispatcher.clone(),
    );
    (orch, dispatcher)
}

#[tokio::test]
async fn opened_merge_request_yields_one_line_comment_and_one_outcome() {
    let gateway = FakeGateway {
        changes: vec![python_change()],
        commits: one_commit(),
        sha: sha(),
        ..Default::default()
    };
    let provider = FakeProvider::replying("Tight change.\nTotal score: 88");
    let (orch, dispatcher) = orchestrator(gateway.clone(), provider.clone());
    let mut outcomes = dispatcher.subscribe();

    let status = orch.handle_event(mr_event("opened")).await;
    assert_eq!(status, RunStatus::Completed);

    // Exactly one line-anchored comment at the hunk's position.
    let comments = gateway.line_comments.lock().unwrap();
    assert_eq!(comments.len(), 1);
    let (position, body) = &comments[0];
    assert_eq!(position.old_line, Some(10));
    assert_eq!(position.new_line, Some(10));
    assert_eq!(position.new_path, "app/main.py");
    assert_eq!(position.sha.head_sha, "head000");
    assert!(body.contains("Tight change."));

    // No fallback note was needed.
    assert!(gateway.notes.lock().unwrap().is_empty());
    assert_eq!(provider.call_count(), 1);

    // Exactly one outcome, with counts matching the diff's +/- lines.
    let outcome = outcomes.try_recv().expect("one outcome dispatched");
    assert_eq!(outcome.additions, 2);
    assert_eq!(outcome.deletions, 1);
    assert_eq!(outcome.score, 88);
    assert_eq!(outcome.author, "alice");
    assert_eq!(outcome.commits.len(), 1);
    assert!(outcomes.try_recv().is_err());
}

#[tokio::test]
async fn closed_event_is_fully_skipped() {
    let gateway = FakeGateway {
        changes: vec![python_change()],
        commits: one_commit(),
        sha: sha(),
        ..Default::default()
    };
    let provider = FakeProvider::replying("irrelevant");
    let (orch, dispatcher) = orchestrator(gateway.clone(), provider.clone());
    let mut outcomes = dispatcher.subscribe();

    let status = orch.handle_event(mr_event("closed")).await;
    assert_eq!(status, RunStatus::Skipped);

    // No VCS calls, no provider calls, no dispatched outcome.
    assert!(gateway.calls.lock().unwrap().is_empty());
    assert_eq!(provider.call_count(), 0);
    assert!(outcomes.try_recv().is_err());
}

#[tokio::test]
async fn rejected_annotation_falls_back_to_exactly_one_note() {
    let gateway = FakeGateway {
        changes: vec![python_change()],
        commits: one_commit(),
        sha: sha(),
        reject_line_comments: true,
        ..Default::default()
    };
    let provider = FakeProvider::replying("Consider renaming b2.\nTotal score: 70");
    let (orch, dispatcher) = orchestrator(gateway.clone(), provider.clone());
    let mut outcomes = dispatcher.subscribe();

    let status = orch.handle_event(mr_event("opened")).await;
    assert_eq!(status, RunStatus::Completed);

    // One inline attempt, then exactly one fallback note carrying the
    // original text plus the explicit notice.
    assert_eq!(gateway.line_comments.lock().unwrap().len(), 1);
    let notes = gateway.notes.lock().unwrap();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].starts_with(FALLBACK_NOTICE));
    assert!(notes[0].contains("Consider renaming b2."));

    assert!(outcomes.try_recv().is_ok());
}

#[tokio::test]
async fn non_allowlisted_files_skip_the_event() {
    let gateway = FakeGateway {
        changes: vec![RawChange {
            old_path: "main.rs".into(),
            new_path: "main.rs".into(),
            new_file: false,
            deleted_file: false,
            diff: PY_HUNK.into(),
        }],
        commits: one_commit(),
        sha: sha(),
        ..Default::default()
    };
    let provider = FakeProvider::replying("irrelevant");
    let (orch, dispatcher) = orchestrator(gateway.clone(), provider.clone());
    let mut outcomes = dispatcher.subscribe();

    let status = orch.handle_event(mr_event("opened")).await;
    assert_eq!(status, RunStatus::Skipped);
    assert_eq!(provider.call_count(), 0);
    assert!(gateway.line_comments.lock().unwrap().is_empty());
    assert!(outcomes.try_recv().is_err());
}

#[tokio::test]
async fn unreachable_provider_drops_event_without_comments_or_outcome() {
    let gateway = FakeGateway {
        changes: vec![python_change()],
        commits: one_commit(),
        sha: sha(),
        ..Default::default()
    };
    let provider = FakeProvider::unreachable();
    let (orch, dispatcher) = orchestrator(gateway.clone(), provider.clone());
    let mut outcomes = dispatcher.subscribe();

    let status = orch.handle_event(mr_event("opened")).await;
    assert_eq!(status, RunStatus::Dropped);

    // No partial or garbled comment is ever posted, and no outcome leaves
    // the pipeline.
    assert!(gateway.line_comments.lock().unwrap().is_empty());
    assert!(gateway.notes.lock().unwrap().is_empty());
    assert!(outcomes.try_recv().is_err());
}

#[tokio::test]
async fn push_with_review_enabled_comments_on_head_commit() {
    let gateway = FakeGateway {
        changes: vec![python_change()],
        commits: one_commit(),
        sha: sha(),
        ..Default::default()
    };
    let provider = FakeProvider::replying("Push looks safe.\nTotal score: 95");
    let dispatcher = EventDispatcher::new(8);
    let cfg = ReviewConfig {
        push_review_enabled: true,
        ..ReviewConfig::default()
    };
    let orch = Orchestrator::new(Arc::new(cfg), gateway.clone(), provider.clone(), dispatcher.clone());
    let mut outcomes = dispatcher.subscribe();

    let event = WebhookEvent::Push(review_pipeline::events::PushEvent {
        platform: Platform::GitLab,
        project: ProjectRef {
            id: "7".into(),
            name: "demo".into(),
        },
        branch: "main".into(),
        author: "alice".into(),
        before: "aaa111".into(),
        after: "bbb222".into(),
        commits: vec![review_pipeline::events::PushCommit {
            id: "bbb222".into(),
            message: "feat: push change\n".into(),
            author: "Alice".into(),
            timestamp: None,
            url: None,
        }],
    });

    let status = orch.handle_event(event).await;
    assert_eq!(status, RunStatus::Completed);
    assert_eq!(provider.call_count(), 1);

    let notes = gateway.notes.lock().unwrap();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].contains("Push looks safe."));

    let outcome = outcomes.try_recv().unwrap();
    assert_eq!(outcome.score, 95);
    assert_eq!(outcome.additions, 2);
    assert_eq!(outcome.source_branch, "main");
}

#[tokio::test]
async fn push_with_review_disabled_still_dispatches_an_outcome() {
    let gateway = FakeGateway {
        changes: vec![python_change()],
        commits: one_commit(),
        sha: sha(),
        ..Default::default()
    };
    let provider = FakeProvider::replying("irrelevant");
    let (orch, dispatcher) = orchestrator(gateway.clone(), provider.clone());
    let mut outcomes = dispatcher.subscribe();

    let event = WebhookEvent::Push(review_pipeline::events::PushEvent {
        platform: Platform::GitLab,
        project: ProjectRef {
            id: "7".into(),
            name: "demo".into(),
        },
        branch: "main".into(),
        author: "alice".into(),
        before: "aaa111".into(),
        after: "bbb222".into(),
        commits: vec![review_pipeline::events::PushCommit {
            id: "bbb222".into(),
            message: "chore: tweak\n".into(),
            author: "Alice".into(),
            timestamp: None,
            url: None,
        }],
    });

    let status = orch.handle_event(event).await;
    assert_eq!(status, RunStatus::Completed);

    // Review gated off: no gateway traffic, no provider call, outcome only.
    assert!(gateway.calls.lock().unwrap().is_empty());
    assert_eq!(provider.call_count(), 0);

    let outcome = outcomes.try_recv().unwrap();
    assert_eq!(outcome.score, 0);
    assert_eq!(outcome.review_text, "");
    assert_eq!(outcome.commits.len(), 1);
}

#[tokio::test]
async fn multi_hunk_failure_is_isolated_per_hunk() {
    // Two files; the provider succeeds, so both hunks get comments and the
    // totals aggregate across files.
    let second = RawChange {
        old_path: "lib/util.py".into(),
        new_path: "lib/util.py".into(),
        new_file: false,
        deleted_file: false,
        diff: "@@ -3,2 +3,3 @@\n a\n+added\n a\n".into(),
    };
    let gateway = FakeGateway {
        changes: vec![python_change(), second],
        commits: one_commit(),
        sha: sha(),
        ..Default::default()
    };
    let provider = FakeProvider::replying("Fine.\nTotal score: 90");
    let (orch, dispatcher) = orchestrator(gateway.clone(), provider.clone());
    let mut outcomes = dispatcher.subscribe();

    let status = orch.handle_event(mr_event("opened")).await;
    assert_eq!(status, RunStatus::Completed);
    assert_eq!(gateway.line_comments.lock().unwrap().len(), 2);
    assert_eq!(provider.call_count(), 2);

    let outcome = outcomes.try_recv().unwrap();
    assert_eq!(outcome.additions, 3);
    assert_eq!(outcome.deletions, 1);
}
