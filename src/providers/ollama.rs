/*!
 * Ollama backend using the `/api/generate` endpoint in JSON mode.
 */

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;
use crate::providers::{BackendRequest, TranslatedTask, TranslationBackend};
use crate::translation::prompts::{self, DEFAULT_SYSTEM_PROMPT};

/// Generate request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The model to use
    model: String,

    /// The prompt listing the items to translate
    prompt: String,

    /// System prompt describing the translation task
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,

    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,

    /// Format to return a response in
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,

    /// Whether to stream the response; always off here
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Generation options for the Ollama API
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Generate response from the Ollama API
#[derive(Debug, Deserialize)]
pub struct GenerationResponse {
    /// The generated text
    pub response: String,

    /// Why generation stopped; `length` means the reply was cut off
    #[serde(default)]
    pub done_reason: Option<String>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            options: None,
            format: None,
            stream: Some(false),
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.get_or_insert_with(GenerationOptions::default).temperature = Some(temperature);
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Backend for a local Ollama server
#[derive(Debug)]
pub struct OllamaBackend {
    base_url: String,
    client: Client,
    model: String,
    temperature: f32,
    system_prompt: String,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            client: Client::builder()
                .timeout(timeout)
                // Ollama serves HTTP/1.1
                .http1_only()
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
            model: model.into(),
            temperature: 0.0,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
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

    /// Generate text from the Ollama API
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("Ollama API error ({}): {}", status, body);
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        response
            .json::<GenerationResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse Ollama response: {}", e)))
    }
}

/// Add a scheme and the default port when they are missing
fn normalize_base_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.is_empty() {
        return "http://localhost:11434".to_string();
    }
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else if host.contains(':') {
        format!("http://{}", host)
    } else {
        format!("http://{}:11434", host)
    }
}

#[async_trait]
impl TranslationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn translate(&self, request: &BackendRequest<'_>) -> Result<Vec<TranslatedTask>, ProviderError> {
        let generation = GenerationRequest::new(&self.model, prompts::build_user_prompt(request)?)
            .system(prompts::render_system_prompt(&self.system_prompt, request))
            .temperature(self.temperature)
            .format("json");

        let response = self.generate(generation).await?;
        if response.done_reason.as_deref() == Some("length") {
            return Err(ProviderError::PayloadTooLarge("reply was cut off at the context limit".to_string()));
        }
        prompts::parse_translations(&response.response)
    }
}
