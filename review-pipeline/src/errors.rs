//! Crate-wide error hierarchy for review-pipeline.
//!
//! Goals:
//! - Single root `Error` for all public functions.
//! - Gateway-aware mapping (401→Unauthorized, 429→RateLimited, 5xx→Server, etc.).
//! - Expected absences (missing sha, file absent at ref, budget exceeded) are
//!   values, not errors; only true faults live here.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type PipelineResult<T> = Result<T, Error>;

/// Root error type for the review-pipeline crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Hosting-platform (GitLab/GitHub) related failure.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Completion-provider failure.
    #[error(transparent)]
    Llm(#[from] llm_service::LlmError),

    /// Annotation publishing failure (after the fallback was also attempted).
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Configuration problems (bad/missing tokens, base URL, etc.).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Input validation errors (bad IDs, unsupported payload shapes, etc.).
    #[error("validation error: {0}")]
    Validation(String),
}

/// Detailed platform-specific error used inside the gateway layer.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Unauthorized (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden (HTTP 403).
    #[error("forbidden")]
    Forbidden,

    /// Not found (HTTP 404).
    #[error("not found")]
    NotFound,

    /// Rate limited (HTTP 429).
    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Gateway/Server error (HTTP 5xx).
    #[error("server error: status {0}")]
    Server(u16),

    /// Other HTTP status (4xx/3xx) not covered above.
    #[error("http status error: {0}")]
    HttpStatus(u16),

    /// Timeout at transport level.
    #[error("timeout")]
    Timeout,

    /// Network/transport failure without status (DNS/connect/reset).
    #[error("network error: {0}")]
    Network(String),

    /// JSON deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Unexpected/invalid shape of platform response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Credential required for this call is not configured.
    #[error("missing credential")]
    MissingCredential,
}

impl GatewayError {
    /// Server-side or rate-limit failures qualify for backoff retries;
    /// other client errors never do.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Server(_)
                | GatewayError::RateLimited { .. }
                | GatewayError::Timeout
                | GatewayError::Network(_)
        )
    }
}

/// Annotation publishing errors.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The line-anchored attempt failed and the fallback note also failed.
    #[error("line comment and fallback note both failed: {0}")]
    FallbackFailed(String),
}

/// Configuration and setup errors (base API URL, missing token, etc.).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing platform token")]
    MissingToken,

    #[error("invalid base api url: {0}")]
    InvalidBaseUrl(String),
}

// ===== Conversions for `?` ergonomics =====

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Gateway(GatewayError::from(e))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return GatewayError::Timeout;
        }
        if let Some(status) = e.status() {
            let code = status.as_u16();
            return match code {
                401 => GatewayError::Unauthorized,
                403 => GatewayError::Forbidden,
                404 => GatewayError::NotFound,
                429 => GatewayError::RateLimited {
                    retry_after_secs: None,
                },
                500..=599 => GatewayError::Server(code),
                _ => GatewayError::HttpStatus(code),
            };
        }
        GatewayError::Network(e.to_string())
    }
}
