/*!
 * OpenAI-compatible chat completions backend.
 *
 * Works against the OpenAI API and any server exposing the same
 * `/chat/completions` surface, such as LM Studio.
 */

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{redact_secret, ProviderError};
use crate::providers::{BackendRequest, TranslatedTask, TranslationBackend};
use crate::translation::prompts::{self, DEFAULT_SYSTEM_PROMPT};

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,

    /// Content of the message
    pub content: String,
}

/// Requested shape of the reply
#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    /// `json_object` asks for a single JSON object
    #[serde(rename = "type")]
    format_type: String,
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    /// The model to use
    model: String,

    /// The messages for the conversation, system prompt first
    messages: Vec<ChatMessage>,

    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    /// JSON mode; left out for servers that reject it
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            response_format: None,
        }
    }

    /// Add a message to the request
    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Ask the server to return a JSON object
    pub fn json_object(mut self) -> Self {
        self.response_format = Some(ResponseFormat {
            format_type: "json_object".to_string(),
        });
        self
    }
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    /// Generated completions; only the first one is used
    pub choices: Vec<ChatChoice>,
}

/// A single completion choice
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    /// The assistant message
    pub message: ChatMessage,

    /// Why generation stopped; `length` means the reply was cut off
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Backend for OpenAI-compatible servers
pub struct OpenAIBackend {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    system_prompt: String,
    json_mode: bool,
    name: String,
}

impl fmt::Debug for OpenAIBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIBackend")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &if self.api_key.is_empty() { "<none>" } else { "<redacted>" })
            .field("json_mode", &self.json_mode)
            .finish()
    }
}

impl OpenAIBackend {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            temperature: 0.0,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            json_mode: true,
            name: "openai".to_string(),
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Toggle `response_format: json_object`; some local servers reject it
    pub fn json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    /// Name reported in logs
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn completions_url(&self) -> Result<Url, ProviderError> {
        let base = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        Url::parse(&base).map_err(|e| ProviderError::RequestError(format!("Invalid endpoint '{}': {}", self.endpoint, e)))
    }

    /// Send a chat completion request
    pub async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletionResponse, ProviderError> {
        let url = self.completions_url()?;
        let mut builder = self.client.post(url).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = redact_secret(&body, &self.api_key);
            debug!("{} API error ({}): {}", self.name, status, body);
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse {} response: {}", self.name, e)))
    }
}

#[async_trait]
impl TranslationBackend for OpenAIBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn translate(&self, request: &BackendRequest<'_>) -> Result<Vec<TranslatedTask>, ProviderError> {
        let mut chat = ChatCompletionRequest::new(&self.model)
            .temperature(self.temperature)
            .add_message("system", prompts::render_system_prompt(&self.system_prompt, request))
            .add_message("user", prompts::build_user_prompt(request)?);
        if self.json_mode {
            chat = chat.json_object();
        }

        let response = self.complete(chat).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))?;
        if choice.finish_reason.as_deref() == Some("length") {
            return Err(ProviderError::PayloadTooLarge("reply was cut off at the output token limit".to_string()));
        }
        prompts::parse_translations(&choice.message.content)
    }
}
