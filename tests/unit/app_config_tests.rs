/*!
 * Tests for application configuration and error classification
 */

use anyhow::anyhow;

use decktrans::app_config::{Config, LogLevel, ProviderConfig, RunProfile, TranslationProvider};
use decktrans::errors::{AppError, PackageError, ProviderError};
use decktrans::translation::{DedupScope, PipelineOptions};
use decktrans::TranslationError;

use crate::common;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.source_language.as_deref(), Some("en"));
    assert_eq!(config.target_language, "fr");
    assert_eq!(config.translation.provider, TranslationProvider::Ollama);
    assert_eq!(config.batching.max_batch_chars, 4000);
    assert_eq!(config.batching.max_concurrent_requests, 1);
    assert_eq!(config.translation.common.max_attempts, 4);
    assert_eq!(config.profile, RunProfile::Balanced);
    assert_eq!(config.log_level, LogLevel::Info);
    assert!(config.validate().is_ok());
}

#[test]
fn test_loadOrCreate_withMissingFile_shouldWriteDefaultsThenReadThemBack() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");

    let created = Config::load_or_create(&path).unwrap();
    assert!(path.exists());

    let mut edited = created.clone();
    edited.target_language = "de".to_string();
    edited.extraction.dedupe_scope = DedupScope::Role;
    edited.glossary.insert("Quarterly review".to_string(), "Quartalsbericht".to_string());
    edited.save(&path).unwrap();

    let loaded = Config::load_or_create(&path).unwrap();
    assert_eq!(loaded.target_language, "de");
    assert_eq!(loaded.extraction.effective_dedup_scope(), DedupScope::Role);
    assert_eq!(loaded.glossary.get("Quarterly review").map(String::as_str), Some("Quartalsbericht"));
}

#[test]
fn test_loadOrCreate_withPartialFile_shouldFillDefaults() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");
    std::fs::write(&path, r#"{"target_language": "es", "batching": {"max_batch_chars": 900}}"#).unwrap();

    let config = Config::load_or_create(&path).unwrap();
    assert_eq!(config.target_language, "es");
    assert_eq!(config.batching.max_batch_chars, 900);
    assert_eq!(config.batching.min_batch_chars, 200);
    assert!(config.extraction.include_notes);
}

#[test]
fn test_validate_withBadValues_shouldFail() {
    let mut config = Config::default();
    config.target_language = "zz".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.batching.max_batch_chars = 10;
    config.batching.min_batch_chars = 20;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.translation.common.max_attempts = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_applyProfile_withFastAndQuality_shouldAdjustKnobs() {
    let mut fast = Config::default();
    fast.profile = RunProfile::Fast;
    fast.apply_profile();
    assert!(!fast.extraction.include_notes);
    assert!(fast.batching.max_concurrent_requests >= 4);

    let mut quality = Config::default();
    quality.profile = RunProfile::Quality;
    quality.batching.max_concurrent_requests = 8;
    quality.apply_profile();
    assert_eq!(quality.batching.max_concurrent_requests, 1);
    assert!(quality.batching.max_batch_chars <= 2500);

    let options = PipelineOptions::from_config(&quality);
    assert_eq!(options.max_concurrent, 1);
}

#[test]
fn test_providerConfig_debug_shouldNotExposeApiKey() {
    let mut provider = ProviderConfig::new(TranslationProvider::OpenAI);
    provider.api_key = "sk-live-secret-123".to_string();
    let rendered = format!("{:?}", provider);
    assert!(!rendered.contains("sk-live-secret-123"));
}

#[test]
fn test_providerFromStr_withKnownNames_shouldParse() {
    assert_eq!("openai".parse::<TranslationProvider>().unwrap(), TranslationProvider::OpenAI);
    assert_eq!("lmstudio".parse::<TranslationProvider>().unwrap(), TranslationProvider::LMStudio);
    assert_eq!("dummy".parse::<TranslationProvider>().unwrap(), TranslationProvider::Dummy);
    assert!("bogus".parse::<TranslationProvider>().is_err());
}

#[test]
fn test_appError_fromAnyhow_shouldKeepExitCodes() {
    let package: AppError = anyhow::Error::new(PackageError::MissingPart("ppt/presentation.xml".into())).into();
    assert_eq!(package.exit_code(), 2);

    let backend: AppError =
        anyhow::Error::new(TranslationError::BackendFatal(ProviderError::AuthenticationError("x".into()))).into();
    assert_eq!(backend.exit_code(), 3);

    let other: AppError = anyhow!("something else").into();
    assert_eq!(other.exit_code(), 1);
}

#[test]
fn test_validate_withNonHttpEndpoint_shouldFail() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::LMStudio;
    config.translation.active_provider_config_mut().endpoint = "ftp://models.local/v1".to_string();
    assert!(config.validate().is_err());

    config.translation.active_provider_config_mut().endpoint = "http://127.0.0.1:1234/v1".to_string();
    assert!(config.validate().is_ok());
}
