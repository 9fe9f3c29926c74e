//! Completed-review fan-out.
//!
//! One producer per finished orchestration run publishes exactly one
//! [`ReviewOutcome`]; zero or more independently registered subscribers
//! consume it over a `tokio::sync::broadcast` channel. A slow, failed, or
//! absent subscriber never affects the publisher or its siblings; lagged
//! receivers drop messages on their own side only.
//!
//! Bundled subscribers: an append-only JSONL log (persistence for later
//! reporting) started with [`spawn_jsonl_sink`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Which kind of run produced the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeKind {
    MergeRequest,
    Push,
}

/// One commit, summarized for the outcome record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSummary {
    pub id: String,
    pub title: String,
    pub author: String,
}

/// Terminal record of one completed pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub kind: OutcomeKind,
    pub project_name: String,
    pub author: String,
    pub source_branch: String,
    /// Empty on the push path.
    pub target_branch: String,
    pub url: Option<String>,
    pub commits: Vec<CommitSummary>,
    pub additions: usize,
    pub deletions: usize,
    pub score: u32,
    pub review_text: String,
    /// Epoch seconds at dispatch time.
    pub updated_at: i64,
}

/// Broadcast fan-out for review outcomes.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    tx: broadcast::Sender<ReviewOutcome>,
}

impl EventDispatcher {
    /// Creates a dispatcher with the given per-subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Registers a new independent subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<ReviewOutcome> {
        self.tx.subscribe()
    }

    /// Publishes one outcome. Having no live subscriber is not an error.
    pub fn dispatch(&self, outcome: ReviewOutcome) {
        match self.tx.send(outcome) {
            Ok(n) => debug!(subscribers = n, "review outcome dispatched"),
            Err(_) => debug!("review outcome dispatched with no subscribers"),
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Spawns the append-only JSONL persistence sink.
///
/// Each outcome becomes one line in `path`. I/O and lag errors are logged
/// and skipped; the sink never propagates failure to the dispatcher.
pub fn spawn_jsonl_sink(dispatcher: &EventDispatcher, path: PathBuf) -> JoinHandle<()> {
    let mut rx = dispatcher.subscribe();
    tokio::spawn(async move {
        loop {
            let outcome = match rx.recv().await {
                Ok(o) => o,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "outcome sink lagged behind, entries lost");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let line = match serde_json::to_string(&outcome) {
                Ok(l) => l,
                Err(e) => {
                    warn!(error = %e, "failed to serialize outcome, skipping");
                    continue;
                }
            };

            let write = async {
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await?;
                file.write_all(line.as_bytes()).await?;
                file.write_all(b"\n").await?;
                file.flush().await
            };

            if let Err(e) = write.await {
                warn!(error = %e, path = %path.display(), "failed to append outcome");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(score: u32) -> ReviewOutcome {
        ReviewOutcome {
            kind: OutcomeKind::MergeRequest,
            project_name: "demo".into(),
            author: "alice".into(),
            source_branch: "feature".into(),
            target_branch: "main".into(),
            url: None,
            commits: vec![],
            additions: 1,
            deletions: 2,
            score,
            review_text: "ok".into(),
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn each_subscriber_receives_the_outcome_once() {
        let dispatcher = EventDispatcher::new(8);
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();

        dispatcher.dispatch(outcome(42));

        assert_eq!(a.recv().await.unwrap().score, 42);
        assert_eq!(b.recv().await.unwrap().score, 42);
        assert!(a.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_affect_publisher_or_siblings() {
        let dispatcher = EventDispatcher::new(8);
        let dead = dispatcher.subscribe();
        let mut alive = dispatcher.subscribe();
        drop(dead);

        dispatcher.dispatch(outcome(7));
        assert_eq!(alive.recv().await.unwrap().score, 7);
    }

    #[tokio::test]
    async fn dispatch_without_subscribers_is_silent() {
        let dispatcher = EventDispatcher::new(8);
        dispatcher.dispatch(outcome(1));
    }
}
