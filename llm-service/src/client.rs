//! Completion client facade w/o async-trait or dynamic trait objects.
//!
//! We expose an enum [`CompletionClient`] with concrete implementations per
//! provider. This keeps async fns simple and avoids boxing futures.

use serde::{Deserialize, Serialize};

use crate::config::{LlmModelConfig, LlmProvider};
use crate::error_handler::LlmResult;
use crate::services::{ollama_service::OllamaService, open_ai_service::OpenAiService};
use crate::tokenizer::TokenEstimator;

/// Message role in a chat-completion exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One role-tagged message handed to the completion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Concrete completion client (enum-dispatch).
#[derive(Debug, Clone)]
pub enum CompletionClient {
    OpenAi(OpenAiService),
    Ollama(OllamaService),
}

impl CompletionClient {
    /// Constructs a concrete client from generic config.
    pub fn from_config(cfg: LlmModelConfig) -> LlmResult<Self> {
        Ok(match cfg.provider {
            LlmProvider::OpenAi => Self::OpenAi(OpenAiService::new(cfg)?),
            LlmProvider::Ollama => Self::Ollama(OllamaService::new(cfg)?),
        })
    }

    /// Convenience: build straight from the environment.
    pub fn from_env() -> LlmResult<Self> {
        Self::from_config(LlmModelConfig::from_env()?)
    }

    /// Model identifier the client was configured with.
    pub fn model(&self) -> &str {
        match self {
            Self::OpenAi(s) => s.model(),
            Self::Ollama(s) => s.model(),
        }
    }

    /// Runs one non-streaming chat completion and returns the generated text.
    pub async fn complete(&self, messages: &[ChatMessage]) -> LlmResult<String> {
        match self {
            Self::OpenAi(s) => s.generate(messages).await,
            Self::Ollama(s) => s.generate(messages).await,
        }
    }

    /// Estimated token count for `text` under this client's model encoding.
    pub fn count_tokens(&self, text: &str) -> usize {
        TokenEstimator::for_model(self.model()).count(text)
    }
}
