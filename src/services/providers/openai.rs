/// OpenAI-compatible chat-completions provider
///
/// Sends one system message and one user message to `{api_url}/chat/completions`
/// and returns the first choice's content. Any API that speaks the same request
/// shape (OpenAI, Azure-style gateways, local servers) works.
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

use super::{CompletionError, CompletionProvider};

const MAX_TOKENS: u32 = 600;
const TEMPERATURE: f32 = 0.3;

#[derive(Clone)]
pub struct OpenAiProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    /// Creates a provider for `model` behind `api_url`.
    ///
    /// `timeout` bounds each HTTP call on the client itself. The engine wraps
    /// the whole re-rank in its own timeout too, so a slow connect cannot hold a
    /// recommendation request past its budget.
    pub fn new(
        api_key: String,
        api_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_url)
    }

    fn parse_response(body: &str) -> Result<String, CompletionError> {
        let response: ChatResponse = serde_json::from_str(body).map_err(|e| {
            CompletionError::Provider(format!("Failed to parse completion response: {}", e))
        })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| CompletionError::Provider("Completion response was empty".to_string()))
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAiProvider {
    #[instrument(
        skip(self, prompt, system_prompt),
        fields(provider = "openai", model = %self.model, prompt_chars = prompt.len())
    )]
    async fn complete(&self, prompt: &str, system_prompt: &str) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Provider(format!(
                "Completion API returned status {}: {}",
                status, body
            )));
        }

        let body = response.text().await?;
        let content = Self::parse_response(&body)?;

        tracing::debug!(
            model = %self.model,
            response_chars = content.len(),
            provider = "openai",
            "Completion received"
        );

        Ok(content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
