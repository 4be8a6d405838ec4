//! Chat-completion clients for the language model collaborators.
//!
//! Both providers speak a `messages` array of role/content pairs. The OpenAI-compatible
//! client walks its configured API keys in order and only gives up once every key has
//! failed; the caller then treats the turn as having no model output.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dokan_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: PromptRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: PromptRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: PromptRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm client could not be built: {0}")]
    Client(String),
    #[error("no llm api key is configured")]
    NoCredentials,
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("llm api returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("llm response carried no message content")]
    EmptyResponse,
    #[error("all {attempts} llm api key(s) failed; last error: {last}")]
    AllKeysFailed { attempts: usize, last: String },
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, LlmError>;
}

pub fn client_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::OpenAi => Arc::new(OpenAiClient::new(
            config.base_url.as_deref().unwrap_or(OPENAI_DEFAULT_BASE_URL),
            &config.model,
            config.api_keys.clone(),
            timeout,
        )?),
        LlmProvider::Ollama => Arc::new(OllamaClient::new(
            config.base_url.as_deref().unwrap_or(OLLAMA_DEFAULT_BASE_URL),
            &config.model,
            timeout,
        )?),
    };
    Ok(client)
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| LlmError::Client(error.to_string()))
}

async fn read_json(response: reqwest::Response) -> Result<Value, LlmError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Api { status, body });
    }
    Ok(response.json().await?)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// `POST {base_url}/chat/completions` with bearer authentication.
pub struct OpenAiClient {
    base_url: String,
    model: String,
    api_keys: Vec<SecretString>,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_keys: Vec<SecretString>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_keys,
            client: http_client(timeout)?,
        })
    }

    async fn complete_with_key(
        &self,
        api_key: &SecretString,
        messages: &[PromptMessage],
    ) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body =
            ChatRequest { model: &self.model, messages, temperature: Some(0.2), stream: None };
        let response =
            self.client.post(&url).bearer_auth(api_key.expose_secret()).json(&body).send().await?;

        let payload = read_json(response).await?;
        message_content(&payload["choices"][0]["message"])
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, LlmError> {
        if self.api_keys.is_empty() {
            return Err(LlmError::NoCredentials);
        }

        let mut last_error = None;
        for (key_index, api_key) in self.api_keys.iter().enumerate() {
            match self.complete_with_key(api_key, messages).await {
                Ok(content) => return Ok(content),
                Err(error) => {
                    warn!(
                        event_name = "llm.request.key_failed",
                        key_index,
                        remaining = self.api_keys.len() - key_index - 1,
                        error = %error,
                        "llm call failed; trying next key"
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(LlmError::AllKeysFailed {
            attempts: self.api_keys.len(),
            last: last_error.map(|error| error.to_string()).unwrap_or_default(),
        })
    }
}

/// `POST {base_url}/api/chat` without streaming.
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let body =
            ChatRequest { model: &self.model, messages, temperature: None, stream: Some(false) };
        let response = self.client.post(&url).json(&body).send().await?;

        let payload = read_json(response).await?;
        message_content(&payload["message"])
    }
}

fn message_content(message: &Value) -> Result<String, LlmError> {
    message["content"]
        .as_str()
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
        .ok_or(LlmError::EmptyResponse)
}
