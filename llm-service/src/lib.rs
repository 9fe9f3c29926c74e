//! Completion-provider adapters with unified errors and token estimation.
//!
//! The crate exposes:
//! - [`client::CompletionClient`] — enum-dispatch over concrete provider
//!   services (OpenAI-compatible chat API, local Ollama). No `async-trait`
//!   and no boxed futures; plain `async fn` on an enum.
//! - [`tokenizer::TokenEstimator`] — model-keyed token estimation used by
//!   callers to budget prompt sizes before a completion call.
//! - [`error_handler`] — one top-level error type for the whole crate with
//!   provider-aware detail.
//!
//! Providers are selected by configuration ([`config::LlmModelConfig`]) and
//! composed by injection; adding a backend means adding a service module and
//! one enum variant.

pub mod client;
pub mod config;
pub mod error_handler;
pub mod services;
pub mod tokenizer;

pub use client::{ChatMessage, ChatRole, CompletionClient};
pub use config::{LlmModelConfig, LlmProvider};
pub use error_handler::{LlmError, LlmResult};
pub use tokenizer::TokenEstimator;
