//! Public entry for the review pipeline.
//!
//! One webhook event travels through these stages:
//!
//! 1) **Ingestion + normalization**
//!    - The front door parses the raw payload into a [`events::WebhookEvent`]
//!    - [`diff`] filters the platform change list (deleted files out,
//!      extension allow-list applied) and splits surviving files into
//!      addressable hunks
//!
//! 2) **Gateway I/O**
//!    - [`gateway`] fetches commits, changes, the sha triple, and file
//!      content with bounded, class-specific retry policies; reads degrade
//!      to empty/partial results instead of failing the run
//!
//! 3) **Budgeting + completion**
//!    - [`budget`] enforces the token ceiling per call (window → truncate →
//!      sentinel), [`review::strategy`] selects the language-keyed prompt
//!      pair, and the [`provider::CompletionProvider`] capability runs the
//!      call
//!
//! 4) **Publication + fan-out**
//!    - [`publish`] anchors each result to its diff line with a one-shot
//!      top-level fallback, and [`dispatch`] broadcasts exactly one
//!      [`dispatch::ReviewOutcome`] per completed run
//!
//! The pipeline uses `tracing` for stage logging and avoids `async-trait`
//! and heap trait objects; capabilities are plain traits with `impl Future`
//! returns, and platform/provider selection is enum-dispatch.

pub mod budget;
pub mod config;
pub mod diff;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod lang;
pub mod provider;
pub mod publish;
pub mod review;

pub use config::{ReviewConfig, ReviewStyle};
pub use dispatch::{EventDispatcher, ReviewOutcome};
pub use errors::{Error, GatewayError, PipelineResult};
pub use events::{MergeRequestEvent, Platform, PushEvent, WebhookEvent};
pub use gateway::{GatewayConfig, PlatformGateway, VcsGateway};
pub use provider::CompletionProvider;
pub use review::{Orchestrator, RunStatus};
