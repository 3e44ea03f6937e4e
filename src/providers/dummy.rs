/*!
 * Offline backend.
 *
 * Transforms text deterministically without any external call and never
 * fails. `Tag` mode prefixes the target language (`[de] Hello`), which makes
 * untranslated text easy to spot in an output deck; `Identity` mode returns
 * the source unchanged and is used for round-trip checks.
 */

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::errors::ProviderError;
use crate::providers::{BackendRequest, TranslatedTask, TranslationBackend};

/// Behaviour of the dummy backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DummyMode {
    /// Prefix each text with `[<target>] `
    Tag,
    /// Return each text unchanged
    Identity,
}

/// Deterministic backend with no failure modes
#[derive(Debug)]
pub struct DummyBackend {
    mode: DummyMode,
    calls: AtomicUsize,
}

impl DummyBackend {
    pub fn new(mode: DummyMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    /// Backend that tags text with the target language
    pub fn tagging() -> Self {
        Self::new(DummyMode::Tag)
    }

    /// Backend that echoes the source text
    pub fn identity() -> Self {
        Self::new(DummyMode::Identity)
    }

    /// Number of batches handled so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn transform(&self, text: &str, target_language: &str) -> String {
        match self.mode {
            DummyMode::Tag => format!("[{}] {}", target_language, text),
            DummyMode::Identity => text.to_string(),
        }
    }
}

#[async_trait]
impl TranslationBackend for DummyBackend {
    fn name(&self) -> &str {
        "dummy"
    }

    fn supports_concurrency(&self) -> bool {
        false
    }

    async fn translate(&self, request: &BackendRequest<'_>) -> Result<Vec<TranslatedTask>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(request
            .tasks
            .iter()
            .map(|task| TranslatedTask {
                id: task.id.clone(),
                text: self.transform(&task.text, request.target_language),
            })
            .collect())
    }
}
