use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::translation::dedup::DedupScope;
use crate::translation::prompts::DEFAULT_SYSTEM_PROMPT;

/// Application configuration module
/// This module handles loading, validating and saving the `conf.json` settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO); empty or missing lets the backend detect it
    #[serde(default)]
    pub source_language: Option<String>,

    /// Target language code (ISO)
    pub target_language: String,

    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Which parts of the deck are translated
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Batch sizing and concurrency
    #[serde(default)]
    pub batching: BatchingConfig,

    /// Preset applied on top of the batching and extraction settings
    #[serde(default)]
    pub profile: RunProfile,

    /// Free-text context handed to every batch
    #[serde(default)]
    pub context: Option<String>,

    /// Required translations, `source -> target`
    #[serde(default)]
    pub glossary: BTreeMap<String, String>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    /// Offline tagging backend, no network calls
    Dummy,
    #[default]
    Ollama,
    OpenAI,
    Anthropic,
    /// LM Studio (OpenAI-compatible local server)
    LMStudio,
}

impl TranslationProvider {
    pub fn display_name(&self) -> &str {
        match self {
            Self::Dummy => "Dummy",
            Self::Ollama => "Ollama",
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::LMStudio => "LM Studio",
        }
    }

    /// Lowercase provider identifier, as used in `available_providers`
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Dummy => "dummy".to_string(),
            Self::Ollama => "ollama".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::Anthropic => "anthropic".to_string(),
            Self::LMStudio => "lmstudio".to_string(),
        }
    }

    /// Environment variable holding the API key, if the provider uses one
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            _ => None,
        }
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dummy" => Ok(Self::Dummy),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "lmstudio" => Ok(Self::LMStudio),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    #[serde(default = "String::new")]
    pub model: String,

    #[serde(default = "String::new")]
    pub api_key: String,

    /// Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider_type", &self.provider_type)
            .field("model", &self.model)
            .field("api_key", &if self.api_key.is_empty() { "<none>" } else { "<redacted>" })
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    /// Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        Self {
            provider_type: provider_type.to_lowercase_string(),
            model: default_model(provider_type),
            api_key: String::new(),
            endpoint: default_endpoint(provider_type),
            timeout_secs: default_provider_timeout_secs(provider_type),
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// System prompt template for translation
    /// Placeholders: {source_language}, {target_language}
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Attempts per batch, first call included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Growth factor of the delay between retries
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound for the retry delay, in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Temperature parameter for text generation
    /// Lower values make output more deterministic, higher values more creative
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            temperature: default_temperature(),
        }
    }
}

/// Part selection and deduplication
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Translate speaker notes
    #[serde(default = "default_true")]
    pub include_notes: bool,

    /// Translate slide masters and layouts
    #[serde(default = "default_true")]
    pub include_masters: bool,

    /// Translate identical strings once
    #[serde(default = "default_true")]
    pub dedupe_text: bool,

    /// Whether identical strings in different roles may differ
    #[serde(default)]
    pub dedupe_scope: DedupScope,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            include_notes: true,
            include_masters: true,
            dedupe_text: true,
            dedupe_scope: DedupScope::default(),
        }
    }
}

impl ExtractionConfig {
    /// Scope actually used, taking `dedupe_text` into account
    pub fn effective_dedup_scope(&self) -> DedupScope {
        if self.dedupe_text {
            self.dedupe_scope
        } else {
            DedupScope::Off
        }
    }
}

/// Batch sizing and request concurrency
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatchingConfig {
    /// Soft upper bound of characters per request
    #[serde(default = "default_max_batch_chars")]
    pub max_batch_chars: usize,

    /// Floor the limit never shrinks below
    #[serde(default = "default_min_batch_chars")]
    pub min_batch_chars: usize,

    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Fast successes in a row before the limit grows back
    #[serde(default = "default_grow_after_fast_batches")]
    pub grow_after_fast_batches: usize,

    /// Requests answered faster than this count as fast
    #[serde(default = "default_fast_batch_ms")]
    pub fast_batch_ms: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_chars: default_max_batch_chars(),
            min_batch_chars: default_min_batch_chars(),
            max_concurrent_requests: default_max_concurrent_requests(),
            grow_after_fast_batches: default_grow_after_fast_batches(),
            fast_batch_ms: default_fast_batch_ms(),
        }
    }
}

/// Speed and quality preset
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunProfile {
    /// Large batches, parallel requests, slides only
    Fast,
    #[default]
    Balanced,
    /// Small batches, one request at a time
    Quality,
}

impl std::str::FromStr for RunProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "quality" => Ok(Self::Quality),
            _ => Err(anyhow!("Invalid profile: {}", s)),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_provider_timeout_secs(provider: TranslationProvider) -> u64 {
    match provider {
        TranslationProvider::Anthropic | TranslationProvider::Ollama | TranslationProvider::LMStudio => 60,
        _ => default_timeout_secs(),
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_temperature() -> f32 {
    0.0
}

fn default_true() -> bool {
    true
}

fn default_max_batch_chars() -> usize {
    4000
}

fn default_min_batch_chars() -> usize {
    200
}

fn default_max_concurrent_requests() -> usize {
    1
}

fn default_grow_after_fast_batches() -> usize {
    4
}

fn default_fast_batch_ms() -> u64 {
    2000
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_model(provider: TranslationProvider) -> String {
    match provider {
        TranslationProvider::Dummy => String::new(),
        TranslationProvider::Ollama => "llama3.2:3b".to_string(),
        TranslationProvider::OpenAI => "gpt-4o-mini".to_string(),
        TranslationProvider::Anthropic => "claude-3-haiku-20240307".to_string(),
        // Placeholder; users should set the model loaded in LM Studio
        TranslationProvider::LMStudio => "local-model".to_string(),
    }
}

fn default_endpoint(provider: TranslationProvider) -> String {
    match provider {
        TranslationProvider::Dummy => String::new(),
        TranslationProvider::Ollama => "http://localhost:11434".to_string(),
        TranslationProvider::OpenAI => "https://api.openai.com/v1".to_string(),
        TranslationProvider::Anthropic => "https://api.anthropic.com".to_string(),
        TranslationProvider::LMStudio => "http://localhost:1234/v1".to_string(),
    }
}

impl Config {
    /// Load the configuration, writing a default file first if none exists
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let file = File::open(path).with_context(|| format!("Failed to open config file: {:?}", path))?;
            let config: Config = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            return Ok(config);
        }

        warn!("Config file not found at {:?}, creating default config.", path);
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write config file: {:?}", path))
    }

    /// Apply the run profile to batching and extraction
    pub fn apply_profile(&mut self) {
        match self.profile {
            RunProfile::Fast => {
                self.batching.max_batch_chars = self.batching.max_batch_chars.max(6000);
                self.batching.max_concurrent_requests = self.batching.max_concurrent_requests.max(4);
                self.extraction.include_notes = false;
                self.extraction.include_masters = false;
            }
            RunProfile::Quality => {
                self.batching.max_batch_chars = self.batching.max_batch_chars.min(2500);
                self.batching.max_concurrent_requests = 1;
            }
            RunProfile::Balanced => {}
        }
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if let Some(source) = self.source_language.as_deref().filter(|s| !s.trim().is_empty()) {
            crate::language_utils::get_language_name(source)?;
        }
        crate::language_utils::get_language_name(&self.target_language)?;

        let batching = &self.batching;
        if batching.min_batch_chars == 0 {
            return Err(anyhow!("batching.min_batch_chars must be at least 1"));
        }
        if batching.max_batch_chars < batching.min_batch_chars {
            return Err(anyhow!(
                "batching.max_batch_chars ({}) is below batching.min_batch_chars ({})",
                batching.max_batch_chars,
                batching.min_batch_chars
            ));
        }
        if batching.max_concurrent_requests == 0 {
            return Err(anyhow!("batching.max_concurrent_requests must be at least 1"));
        }

        let common = &self.translation.common;
        if common.max_attempts == 0 {
            return Err(anyhow!("translation.common.max_attempts must be at least 1"));
        }
        if common.backoff_multiplier < 1.0 {
            return Err(anyhow!("translation.common.backoff_multiplier must be at least 1.0"));
        }
        if !(0.0..=2.0).contains(&common.temperature) {
            return Err(anyhow!("translation.common.temperature must be between 0.0 and 2.0"));
        }

        match self.translation.provider {
            TranslationProvider::OpenAI | TranslationProvider::Anthropic => {
                if self.translation.get_api_key().is_empty() {
                    return Err(anyhow!(
                        "Translation API key is required for {} provider",
                        self.translation.provider.display_name()
                    ));
                }
            }
            _ => {}
        }

        if matches!(
            self.translation.provider,
            TranslationProvider::OpenAI | TranslationProvider::Anthropic | TranslationProvider::LMStudio
        ) {
            let endpoint = self.translation.get_endpoint();
            let parsed = url::Url::parse(&endpoint)
                .with_context(|| format!("Invalid endpoint for {}: {}", self.translation.provider, endpoint))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(anyhow!("Endpoint must use http or https: {}", endpoint));
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: Some("en".to_string()),
            target_language: "fr".to_string(),
            translation: TranslationConfig::default(),
            extraction: ExtractionConfig::default(),
            batching: BatchingConfig::default(),
            profile: RunProfile::default(),
            context: None,
            glossary: BTreeMap::new(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    pub fn get_provider_config(&self, provider_type: &TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers.iter().find(|p| p.provider_type == provider_str)
    }

    /// Active provider entry, created with defaults if missing
    pub fn active_provider_config_mut(&mut self) -> &mut ProviderConfig {
        let provider_str = self.provider.to_lowercase_string();
        match self.available_providers.iter().position(|p| p.provider_type == provider_str) {
            Some(i) => &mut self.available_providers[i],
            None => {
                self.available_providers.push(ProviderConfig::new(self.provider));
                let last = self.available_providers.len() - 1;
                &mut self.available_providers[last]
            }
        }
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.model.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| default_model(self.provider))
    }

    /// Get the API key for the active provider, falling back to the environment
    pub fn get_api_key(&self) -> String {
        if let Some(key) = self
            .get_active_provider_config()
            .map(|p| p.api_key.clone())
            .filter(|k| !k.is_empty())
        {
            return key;
        }
        self.provider
            .api_key_env()
            .and_then(|var| std::env::var(var).ok())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.endpoint.clone())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| default_endpoint(self.provider))
    }

    /// Request timeout for the active provider
    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .filter(|t| *t > 0)
            .unwrap_or_else(|| default_provider_timeout_secs(self.provider))
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: vec![
                ProviderConfig::new(TranslationProvider::Ollama),
                ProviderConfig::new(TranslationProvider::OpenAI),
                ProviderConfig::new(TranslationProvider::Anthropic),
                ProviderConfig::new(TranslationProvider::LMStudio),
            ],
            common: TranslationCommonConfig::default(),
        }
    }
}
