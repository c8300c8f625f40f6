use crate::error::ModelError;
use crate::traits::ChatModel;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_MAX_TOKENS: u32 = 500;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            api_key: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: GROQ_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [CompletionMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct CompletionMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionContent,
}

#[derive(Debug, Deserialize)]
struct CompletionContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GroqChatModel {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
}

impl GroqChatModel {
    pub fn new(config: LlmConfig) -> Result<Self, ModelError> {
        let base = Url::parse(&format!("{}/", config.base_url.trim_end_matches('/')))?;
        Ok(Self {
            client: Client::new(),
            endpoint: base.join("chat/completions")?,
            model: config.model,
            api_key: config.api_key,
            max_tokens: config.max_tokens,
        })
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl ChatModel for GroqChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<String, ModelError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ModelError::MissingApiKey(self.endpoint.to_string()))?;

        debug!(model = %self.model, prompt_chars = prompt.len(), "invoking chat model");

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&CompletionRequest {
                model: &self.model,
                messages: [CompletionMessage {
                    role: "user",
                    content: prompt,
                }],
                max_tokens: self.max_tokens,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ModelError::BackendResponse {
                backend: self.endpoint.to_string(),
                status: status.as_u16(),
                details,
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        first_completion(parsed).ok_or_else(|| ModelError::EmptyCompletion(self.model.clone()))
    }
}

fn first_completion(response: CompletionResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
}
