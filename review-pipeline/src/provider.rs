//! Completion-provider capability consumed by the orchestrator.
//!
//! The pipeline talks to a small trait instead of a concrete client so that
//! adapters are composed by injection and tests can plug in fakes. The real
//! implementation is `llm-service`'s enum-dispatch client.

use std::future::Future;

use llm_service::{ChatMessage, CompletionClient, LlmError, TokenEstimator};

/// Capability required of a completion backend.
pub trait CompletionProvider: Send + Sync {
    /// Runs one completion over role-tagged messages, returning the
    /// generated text.
    fn complete(
        &self,
        messages: &[ChatMessage],
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Estimated token count for `text` under this provider's encoding.
    fn count_tokens(&self, text: &str) -> usize;

    /// Token estimator matching [`CompletionProvider::count_tokens`].
    fn estimator(&self) -> TokenEstimator;
}

impl CompletionProvider for CompletionClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        CompletionClient::complete(self, messages).await
    }

    fn count_tokens(&self, text: &str) -> usize {
        CompletionClient::count_tokens(self, text)
    }

    fn estimator(&self) -> TokenEstimator {
        TokenEstimator::for_model(self.model())
    }
}
