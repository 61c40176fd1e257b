/// AI text-completion providers
///
/// The recommendation engine only needs "prompt in, text out". Each provider
/// implements that over a concrete API; `UnconfiguredProvider` stands in when no
/// API key is configured so callers always hold a provider and handle
/// `Unavailable` like any other failure.
pub mod openai;

pub use openai::OpenAiProvider;

/// Failure modes of a completion call. None of them is fatal to a recommendation request.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CompletionError {
    #[error("AI completion is not configured")]
    Unavailable,

    #[error("AI completion timed out")]
    Timeout,

    #[error("AI provider error: {0}")]
    Provider(String),
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CompletionError::Timeout
        } else {
            CompletionError::Provider(e.to_string())
        }
    }
}

/// Trait for text-completion providers
///
/// Implementations return the model's raw text and leave interpretation to the
/// caller. They should map their transport and API failures onto
/// `CompletionError` rather than panic or retry: the caller already has a
/// deterministic fallback and a time budget of its own.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Completes `prompt` under `system_prompt` and returns the raw text
    ///
    /// An empty or whitespace-only answer is a `Provider` error, not `Ok("")`.
    async fn complete(&self, prompt: &str, system_prompt: &str) -> Result<String, CompletionError>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Provider used when AI completion is not configured
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredProvider;

#[async_trait::async_trait]
impl CompletionProvider for UnconfiguredProvider {
    async fn complete(&self, _prompt: &str, _system_prompt: &str) -> Result<String, CompletionError> {
        Err(CompletionError::Unavailable)
    }

    fn name(&self) -> &'static str {
        "unconfigured"
    }
}
