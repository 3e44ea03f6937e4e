/*!
 * Translation backends.
 *
 * Every backend implements `TranslationBackend`: it turns an ordered batch of
 * tasks into translations carrying the same ids. Implementations:
 * - `dummy`: deterministic offline transformation, used for dry runs and tests
 * - `openai`: OpenAI-compatible chat completions (OpenAI, LM Studio)
 * - `anthropic`: Anthropic messages API
 * - `ollama`: local Ollama server
 *
 * Backends make a single attempt per call. Retries, backoff and batch
 * resizing belong to the scheduler, which reacts to the `ProviderError`
 * classification a backend returns.
 */

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::app_config::{Config, TranslationProvider};
use crate::errors::ProviderError;
use crate::translation::dedup::TranslationTask;

pub mod anthropic;
pub mod dummy;
pub mod ollama;
pub mod openai;

/// Guidance shared by every batch of a run
#[derive(Debug, Clone, Default)]
pub struct TranslationGuidance {
    /// User context followed by the rendered deck profile
    pub shared_context: String,
    /// Required translations, `source -> target`
    pub glossary: BTreeMap<String, String>,
}

/// One backend call
#[derive(Debug, Clone, Copy)]
pub struct BackendRequest<'a> {
    pub tasks: &'a [TranslationTask],
    /// `None` lets the backend detect the source language
    pub source_language: Option<&'a str>,
    pub target_language: &'a str,
    pub guidance: &'a TranslationGuidance,
}

/// A translated task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedTask {
    pub id: String,
    pub text: String,
}

/// Common trait for all translation backends
#[async_trait]
pub trait TranslationBackend: Send + Sync + Debug {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Whether several calls may be in flight at once
    fn supports_concurrency(&self) -> bool {
        true
    }

    /// Translate a batch; the result must answer every task id exactly once
    async fn translate(&self, request: &BackendRequest<'_>) -> Result<Vec<TranslatedTask>, ProviderError>;
}

/// Check that a backend answered each task exactly once and return results in task order
pub fn align_results(
    tasks: &[TranslationTask],
    results: Vec<TranslatedTask>,
) -> Result<Vec<TranslatedTask>, ProviderError> {
    if results.len() != tasks.len() {
        return Err(ProviderError::MalformedResponse(format!(
            "expected {} translations, got {}",
            tasks.len(),
            results.len()
        )));
    }
    let mut by_id: HashMap<String, String> = HashMap::with_capacity(results.len());
    for result in results {
        if by_id.insert(result.id.clone(), result.text).is_some() {
            return Err(ProviderError::MalformedResponse(format!("duplicate id {}", result.id)));
        }
    }
    let expected: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    if let Some(unknown) = by_id.keys().find(|id| !expected.contains(id.as_str())) {
        return Err(ProviderError::MalformedResponse(format!("unknown id {}", unknown)));
    }
    tasks
        .iter()
        .map(|task| {
            by_id
                .remove(&task.id)
                .map(|text| TranslatedTask { id: task.id.clone(), text })
                .ok_or_else(|| ProviderError::MalformedResponse(format!("missing id {}", task.id)))
        })
        .collect()
}

/// Build the backend selected by the configuration
pub fn from_config(config: &Config) -> Result<Arc<dyn TranslationBackend>> {
    let translation = &config.translation;
    let timeout = Duration::from_secs(translation.get_timeout_secs());
    let model = translation.get_model();
    let endpoint = translation.get_endpoint();
    let common = &translation.common;

    let backend: Arc<dyn TranslationBackend> = match translation.provider {
        TranslationProvider::Dummy => Arc::new(dummy::DummyBackend::tagging()),
        TranslationProvider::OpenAI | TranslationProvider::LMStudio => {
            let api_key = translation.get_api_key();
            if translation.provider == TranslationProvider::OpenAI && api_key.is_empty() {
                return Err(anyhow!("OpenAI provider requires an API key (config or OPENAI_API_KEY)"));
            }
            let backend = openai::OpenAIBackend::new(api_key, endpoint, model, timeout)
                .temperature(common.temperature)
                .system_prompt(common.system_prompt.clone());
            if translation.provider == TranslationProvider::LMStudio {
                Arc::new(backend.json_mode(false).named("lmstudio"))
            } else {
                Arc::new(backend)
            }
        }
        TranslationProvider::Anthropic => {
            let api_key = translation.get_api_key();
            if api_key.is_empty() {
                return Err(anyhow!("Anthropic provider requires an API key (config or ANTHROPIC_API_KEY)"));
            }
            Arc::new(
                anthropic::AnthropicBackend::new(api_key, endpoint, model, timeout)
                    .temperature(common.temperature)
                    .system_prompt(common.system_prompt.clone()),
            )
        }
        TranslationProvider::Ollama => Arc::new(
            ollama::OllamaBackend::new(endpoint, model, timeout)
                .temperature(common.temperature)
                .system_prompt(common.system_prompt.clone()),
        ),
    };
    Ok(backend)
}
