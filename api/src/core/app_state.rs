//! Shared application state for the HTTP front door.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use llm_service::CompletionClient;
use review_pipeline::{EventDispatcher, ReviewConfig};

/// State shared across all routes. Cheap to clone; everything heavy sits
/// behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub review_cfg: Arc<ReviewConfig>,
    pub llm: CompletionClient,
    pub dispatcher: EventDispatcher,
    pub status: Arc<ServiceStatus>,
}

/// Runtime health record with explicit read/write access points.
///
/// The probes read it; webhook workers bump it. No other code touches the
/// inner state.
#[derive(Debug)]
pub struct ServiceStatus {
    started_at: Instant,
    inner: RwLock<StatusInner>,
}

#[derive(Debug, Default)]
struct StatusInner {
    active_workers: usize,
    events_accepted: u64,
}

/// Read-only view the probes serialize.
#[derive(Debug, Clone, Copy)]
pub struct StatusSnapshot {
    pub uptime_seconds: u64,
    pub active_workers: usize,
    pub events_accepted: u64,
}

impl ServiceStatus {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            inner: RwLock::new(StatusInner::default()),
        }
    }

    /// A webhook worker was spawned.
    pub fn worker_started(&self) {
        let mut inner = self.inner.write().expect("status lock poisoned");
        inner.active_workers += 1;
        inner.events_accepted += 1;
    }

    /// A webhook worker finished (successfully or not).
    pub fn worker_finished(&self) {
        let mut inner = self.inner.write().expect("status lock poisoned");
        inner.active_workers = inner.active_workers.saturating_sub(1);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.read().expect("status lock poisoned");
        StatusSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            active_workers: inner.active_workers,
            events_accepted: inner.events_accepted,
        }
    }
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self::new()
    }
}
