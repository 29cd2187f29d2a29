//! OpenAI-compatible chat-completion client
//!
//! Sends a single-turn request (system prompt + user prompt) to
//! `{base_url}/chat/completions` and returns the trimmed text of the first
//! choice. Failures are mapped to `ProviderError` by HTTP status; there is no
//! retry, since the webhook caller is waiting on the answer.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::providers::{CompletionMeta, CompletionProvider, LlmMessage, LlmRole, ProviderError};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "Tu es un assistant utile et concis qui répond en français si l'utilisateur parle français.";

const MAX_TOKENS: u32 = 400;
const TEMPERATURE: f32 = 0.7;

/// Configuration for the OpenAI provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAiConfig {
    /// API key for OpenAI
    pub api_key: String,
    /// Base URL for the API (optional, defaults to the official endpoint)
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    /// Model to use
    #[serde(default = "default_openai_model")]
    pub default_model: String,
    /// System prompt sent ahead of every user prompt
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// HTTP timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_timeout() -> u64 {
    30
}

impl OpenAiConfig {
    /// Creates a new OpenAI configuration with the required API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_openai_base_url(),
            default_model: default_openai_model(),
            system_prompt: default_system_prompt(),
            timeout_seconds: default_timeout(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::config("OpenAI API key is required"));
        }

        if self.base_url.is_empty() {
            return Err(ProviderError::config("OpenAI base URL cannot be empty"));
        }

        if self.default_model.is_empty() {
            return Err(ProviderError::config("OpenAI model cannot be empty"));
        }

        Ok(())
    }
}

/// OpenAI API request body format
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<LlmMessage>,
    max_tokens: u32,
    temperature: f32,
}

/// OpenAI API response format
#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    error: Option<OpenAiError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
}

/// OpenAI-compatible completion provider
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    model: String,
    system_prompt: String,
    timeout_seconds: u64,
    client: Client,
}

impl OpenAiProvider {
    /// Creates a provider from configuration, failing if the config is invalid
    /// or the HTTP client cannot be built.
    pub fn try_new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.default_model,
            system_prompt: config.system_prompt,
            timeout_seconds: config.timeout_seconds,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, prompt: &str) -> OpenAiRequest {
        OpenAiRequest {
            model: self.model.clone(),
            messages: vec![
                LlmMessage::new(LlmRole::System, self.system_prompt.as_str()),
                LlmMessage::new(LlmRole::User, prompt),
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        }
    }

    /// Extracts the first choice's text; blank content counts as no answer.
    fn parse_response(response: OpenAiResponse) -> Result<Option<String>, ProviderError> {
        if let Some(error) = response.error {
            return Err(ProviderError::provider(
                error.message,
                error.code.or(error.error_type),
            ));
        }

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        Ok(content)
    }

    async fn send_request(&self, request: &OpenAiRequest) -> Result<OpenAiResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %request.model, "Making chat completion request");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Completion request failed");
                if e.is_timeout() {
                    ProviderError::timeout(self.timeout_seconds)
                } else if e.is_connect() {
                    ProviderError::network(format!("Connection failed: {}", e))
                } else {
                    ProviderError::network(format!("Request failed: {}", e))
                }
            })?;

        let status = resp.status();
        debug!(status = %status, "Received response");

        if status.is_success() {
            return resp.json::<OpenAiResponse>().await.map_err(|e| {
                ProviderError::serialization(format!("Failed to parse response: {}", e))
            });
        }

        let error_text = resp.text().await.unwrap_or_default();
        Err(error_for_status(status, &error_text))
    }
}

fn error_for_status(status: StatusCode, body: &str) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::auth(format!("Authentication failed ({}): {}", status, body))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            ProviderError::rate_limit(format!("OpenAI error {}: {}", status.as_u16(), body))
        }
        status if status.is_client_error() => {
            ProviderError::invalid_request(format!("Client error ({}): {}", status, body))
        }
        status => ProviderError::provider(
            format!("OpenAI error {}: {}", status.as_u16(), body),
            Some(status.as_u16().to_string()),
        ),
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete_chat(
        &self,
        prompt: &str,
        meta: &CompletionMeta,
    ) -> Result<Option<String>, ProviderError> {
        info!(
            model = %self.model,
            sender = %meta.sender,
            prompt_length = prompt.len(),
            "Sending chat completion request"
        );

        let request = self.build_request(prompt);
        let response = self.send_request(&request).await?;
        let content = Self::parse_response(response)?;

        info!(
            content_length = content.as_ref().map(|c| c.len()).unwrap_or(0),
            "Received completion"
        );

        Ok(content)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
