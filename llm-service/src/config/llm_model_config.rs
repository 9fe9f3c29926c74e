use std::str::FromStr;

use crate::error_handler::{LlmResult, env_opt_u64, must_env, validate_http_endpoint};

use super::llm_provider::LlmProvider;

/// Configuration for a completion-model invocation.
///
/// Built once at process start from the environment and passed to service
/// constructors; never mutated afterwards.
///
/// Environment surface:
/// - `LLM_PROVIDER` — `openai` (default) or `ollama`
/// - `OPENAI_API_BASE_URL` / `OPENAI_API_KEY` / `OPENAI_API_MODEL`
/// - `OLLAMA_URL` / `OLLAMA_MODEL`
/// - `LLM_TIMEOUT_SECS` / `LLM_MAX_TOKENS` (optional)
#[derive(Debug, Clone)]
pub struct LlmModelConfig {
    /// The backend to call.
    pub provider: LlmProvider,

    /// Model identifier string (e.g., `"gpt-4o-mini"`, `"qwen3:14b"`).
    pub model: String,

    /// Inference endpoint (remote API URL or local Ollama socket).
    pub endpoint: String,

    /// Optional API key for authentication (required for OpenAI).
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Optional request timeout in seconds (default 60).
    pub timeout_secs: Option<u64>,
}

impl LlmModelConfig {
    /// Reads the full model configuration from the environment.
    ///
    /// # Errors
    /// Fails on an unsupported `LLM_PROVIDER`, a missing API key for OpenAI,
    /// or a malformed endpoint.
    pub fn from_env() -> LlmResult<Self> {
        let provider = match std::env::var("LLM_PROVIDER") {
            Ok(v) if !v.trim().is_empty() => LlmProvider::from_str(&v)?,
            _ => LlmProvider::OpenAi,
        };

        let cfg = match provider {
            LlmProvider::OpenAi => {
                let endpoint = std::env::var("OPENAI_API_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com".to_string());
                let api_key = must_env("OPENAI_API_KEY")?;
                let model = std::env::var("OPENAI_API_MODEL")
                    .unwrap_or_else(|_| "gpt-4o-mini".to_string());
                Self {
                    provider,
                    model,
                    endpoint,
                    api_key: Some(api_key),
                    max_tokens: env_opt_u64("LLM_MAX_TOKENS")?.map(|v| v as u32),
                    timeout_secs: env_opt_u64("LLM_TIMEOUT_SECS")?,
                }
            }
            LlmProvider::Ollama => {
                let endpoint = std::env::var("OLLAMA_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:11434".to_string());
                let model =
                    std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "qwen3:14b".to_string());
                Self {
                    provider,
                    model,
                    endpoint,
                    api_key: None,
                    max_tokens: env_opt_u64("LLM_MAX_TOKENS")?.map(|v| v as u32),
                    timeout_secs: env_opt_u64("LLM_TIMEOUT_SECS")?,
                }
            }
        };

        validate_http_endpoint(&cfg.endpoint)?;
        Ok(cfg)
    }
}
