/// LLM Client — the single point of entry for assistant calls.
///
/// No other module talks to a model provider directly. The provider is chosen at
/// startup (`LLM_PROVIDER`): `mock` echoes locally, `anthropic` uses the Messages API,
/// `openai` and `groq` use OpenAI-compatible chat completions.
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const MAX_TOKENS: u32 = 400;
const TEMPERATURE: f32 = 0.4;
const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM not configured (missing API key for {0})")]
    NotConfigured(LlmProvider),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Mock,
    Anthropic,
    OpenAi,
    Groq,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Mock => "mock",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::OpenAi => "openai",
            LlmProvider::Groq => "groq",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Mock => "mock",
            LlmProvider::Anthropic => "claude-sonnet-4-5",
            LlmProvider::OpenAi => "gpt-4o-mini",
            LlmProvider::Groq => "llama-3.1-8b-instant",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" | "" => Ok(LlmProvider::Mock),
            "anthropic" => Ok(LlmProvider::Anthropic),
            "openai" => Ok(LlmProvider::OpenAi),
            "groq" => Ok(LlmProvider::Groq),
            other => Err(format!(
                "unknown LLM provider '{other}' (expected mock, anthropic, openai or groq)"
            )),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

fn extract_anthropic_text(body: &str) -> Result<String, LlmError> {
    let response: AnthropicResponse =
        serde_json::from_str(body).map_err(|_| LlmError::EmptyContent)?;
    response
        .content
        .into_iter()
        .find(|b| b.block_type == "text")
        .and_then(|b| b.text)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(LlmError::EmptyContent)
}

fn extract_completion_text(body: &str) -> Result<String, LlmError> {
    let response: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|_| LlmError::EmptyContent)?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(LlmError::EmptyContent)
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// The assistant client shared by all handlers.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    provider: LlmProvider,
    api_key: Option<String>,
    model: String,
}

impl LlmClient {
    pub fn new(
        provider: LlmProvider,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            provider,
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.unwrap_or_else(|| provider.default_model().to_string()),
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Produces the assistant's reply to one user message.
    pub async fn reply(&self, message: &str) -> Result<String, LlmError> {
        self.call(message, prompts::RESUME_ASSISTANT_SYSTEM).await
    }

    /// Makes a call to the configured provider and returns the reply text.
    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        if self.provider == LlmProvider::Mock {
            return Ok(format!("Here’s a clearer version: {prompt}"));
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(LlmError::NotConfigured(self.provider))?;

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.build_request(api_key, prompt, system).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 || status.is_server_error() {
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let message = serde_json::from_str::<ProviderError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let text = match self.provider {
                LlmProvider::Anthropic => extract_anthropic_text(&body)?,
                _ => extract_completion_text(&body)?,
            };
            debug!(
                "LLM call succeeded: provider={}, model={}, chars={}",
                self.provider,
                self.model,
                text.len()
            );
            return Ok(text);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    fn build_request(&self, api_key: &str, prompt: &str, system: &str) -> RequestBuilder {
        match self.provider {
            LlmProvider::Anthropic => self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&AnthropicRequest {
                    model: &self.model,
                    max_tokens: MAX_TOKENS,
                    system,
                    messages: vec![WireMessage {
                        role: "user",
                        content: prompt,
                    }],
                }),
            LlmProvider::OpenAi | LlmProvider::Groq | LlmProvider::Mock => {
                let url = if self.provider == LlmProvider::Groq {
                    GROQ_API_URL
                } else {
                    OPENAI_API_URL
                };
                self.client.post(url).bearer_auth(api_key).json(&ChatCompletionRequest {
                    model: &self.model,
                    messages: vec![
                        WireMessage {
                            role: "system",
                            content: system,
                        },
                        WireMessage {
                            role: "user",
                            content: prompt,
                        },
                    ],
                    temperature: TEMPERATURE,
                    max_tokens: MAX_TOKENS,
                })
            }
        }
    }
}
