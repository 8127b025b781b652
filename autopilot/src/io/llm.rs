//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::io::config::LlmConfig;
use crate::io::oracle::OracleError;

/// A model that turns a system prompt plus user content into a reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, OracleError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat client for `{api_base}/chat/completions`.
pub struct OpenAiChat {
    client: Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAiChat {
    /// Build a client from config. Fails when no API key is available.
    /// Client for `cfg`, taking the key from the config file or environment.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self, OracleError> {
        Self::with_api_key(cfg, cfg.resolved_api_key())
    }

    pub fn with_api_key(cfg: &LlmConfig, api_key: Option<String>) -> Result<Self, OracleError> {
        let api_key = api_key.ok_or(OracleError::MissingApiKey)?;
        let client = Client::builder()
            .timeout(cfg.timeout() + Duration::from_secs(5))
            .build()
            .map_err(|err| OracleError::Unavailable(format!("build http client: {err}")))?;
        Ok(Self {
            client,
            url: format!("{}/chat/completions", cfg.api_base.trim_end_matches('/')),
            model: cfg.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, system: &str, user: &str) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| OracleError::Unavailable(format!("HTTP request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|json| {
                    json.get("error")
                        .and_then(|error| error.get("message"))
                        .and_then(|message| message.as_str())
                        .map(str::to_string)
                })
                .unwrap_or(body);
            return Err(OracleError::Unavailable(format!("HTTP {status}: {message}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| OracleError::Unavailable(format!("decode response: {err}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| OracleError::Unavailable("no choices in response".to_string()))?;
        debug!(bytes = content.len(), "chat completion received");
        Ok(content)
    }
}
