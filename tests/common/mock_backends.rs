/*!
 * Mock translation backends for testing
 *
 * Each backend records the batches it received so tests can assert on call
 * counts and batch sizes.
 */

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;

use decktrans::errors::ProviderError;
use decktrans::providers::{BackendRequest, TranslatedTask, TranslationBackend};
use decktrans::translation::RunState;

/// Records the weight of every batch a backend saw
#[derive(Debug, Default)]
pub struct CallTracker {
    weights: Mutex<Vec<usize>>,
}

impl CallTracker {
    fn record(&self, request: &BackendRequest<'_>) -> usize {
        let weight = request.tasks.iter().map(|t| t.weight()).sum();
        self.weights.lock().push(weight);
        weight
    }

    pub fn calls(&self) -> usize {
        self.weights.lock().len()
    }

    pub fn weights(&self) -> Vec<usize> {
        self.weights.lock().clone()
    }
}

fn tag_all(request: &BackendRequest<'_>) -> Vec<TranslatedTask> {
    request
        .tasks
        .iter()
        .map(|task| TranslatedTask {
            id: task.id.clone(),
            text: format!("[{}] {}", request.target_language, task.text),
        })
        .collect()
}

/// Tags text after a random delay, answering in reverse order
#[derive(Debug)]
pub struct RandomLatencyBackend {
    pub tracker: CallTracker,
    max_delay_ms: u64,
}

impl RandomLatencyBackend {
    pub fn new(max_delay_ms: u64) -> Self {
        Self {
            tracker: CallTracker::default(),
            max_delay_ms,
        }
    }
}

#[async_trait]
impl TranslationBackend for RandomLatencyBackend {
    fn name(&self) -> &str {
        "random-latency"
    }

    async fn translate(&self, request: &BackendRequest<'_>) -> Result<Vec<TranslatedTask>, ProviderError> {
        self.tracker.record(request);
        let delay = rand::rng().random_range(0..=self.max_delay_ms);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        let mut results = tag_all(request);
        results.reverse();
        Ok(results)
    }
}

/// Rejects any batch heavier than `max_chars` as too large
#[derive(Debug)]
pub struct SizeLimitedBackend {
    pub tracker: CallTracker,
    max_chars: usize,
}

impl SizeLimitedBackend {
    pub fn new(max_chars: usize) -> Self {
        Self {
            tracker: CallTracker::default(),
            max_chars,
        }
    }
}

#[async_trait]
impl TranslationBackend for SizeLimitedBackend {
    fn name(&self) -> &str {
        "size-limited"
    }

    async fn translate(&self, request: &BackendRequest<'_>) -> Result<Vec<TranslatedTask>, ProviderError> {
        let weight = self.tracker.record(request);
        if weight > self.max_chars {
            return Err(ProviderError::PayloadTooLarge(format!(
                "{} chars exceed the context window of {}",
                weight, self.max_chars
            )));
        }
        Ok(tag_all(request))
    }
}

/// One call as seen by a `LimitCheckingBackend`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedCall {
    pub tasks: usize,
    pub weight: usize,
    /// Active batch limit when the call arrived
    pub limit: usize,
}

/// Rejects batches heavier than `max_chars` and notes the run's live limit on every call
#[derive(Debug)]
pub struct LimitCheckingBackend {
    state: Arc<RunState>,
    max_chars: usize,
    calls: Mutex<Vec<ObservedCall>>,
}

impl LimitCheckingBackend {
    pub fn new(state: Arc<RunState>, max_chars: usize) -> Self {
        Self {
            state,
            max_chars,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ObservedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TranslationBackend for LimitCheckingBackend {
    fn name(&self) -> &str {
        "limit-checking"
    }

    async fn translate(&self, request: &BackendRequest<'_>) -> Result<Vec<TranslatedTask>, ProviderError> {
        let weight = request.tasks.iter().map(|t| t.weight()).sum();
        self.calls.lock().push(ObservedCall {
            tasks: request.tasks.len(),
            weight,
            limit: self.state.limit().current(),
        });
        if weight > self.max_chars {
            return Err(ProviderError::PayloadTooLarge(format!("{} chars", weight)));
        }
        Ok(tag_all(request))
    }
}

/// Fails every call with the error produced by `make_error`
pub struct FailingBackend {
    pub tracker: CallTracker,
    make_error: fn() -> ProviderError,
}

impl std::fmt::Debug for FailingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailingBackend").field("calls", &self.tracker.calls()).finish()
    }
}

impl FailingBackend {
    /// Every call times out
    pub fn transient() -> Self {
        Self {
            tracker: CallTracker::default(),
            make_error: || ProviderError::Timeout("request timed out".to_string()),
        }
    }

    /// Every call is rejected as unauthorized
    pub fn unauthorized() -> Self {
        Self {
            tracker: CallTracker::default(),
            make_error: || ProviderError::AuthenticationError("invalid api key".to_string()),
        }
    }
}

#[async_trait]
impl TranslationBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn translate(&self, request: &BackendRequest<'_>) -> Result<Vec<TranslatedTask>, ProviderError> {
        self.tracker.record(request);
        Err((self.make_error)())
    }
}

/// Fails the first `failures` calls with a timeout, then tags text
#[derive(Debug)]
pub struct FlakyBackend {
    pub tracker: CallTracker,
    failures: usize,
}

impl FlakyBackend {
    pub fn new(failures: usize) -> Self {
        Self {
            tracker: CallTracker::default(),
            failures,
        }
    }
}

#[async_trait]
impl TranslationBackend for FlakyBackend {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn translate(&self, request: &BackendRequest<'_>) -> Result<Vec<TranslatedTask>, ProviderError> {
        self.tracker.record(request);
        if self.tracker.calls() <= self.failures {
            return Err(ProviderError::ConnectionError("connection reset".to_string()));
        }
        Ok(tag_all(request))
    }
}

/// Tags text and keeps the shared guidance of every call
#[derive(Debug, Default)]
pub struct GuidanceRecordingBackend {
    contexts: Mutex<Vec<String>>,
    glossaries: Mutex<Vec<Vec<(String, String)>>>,
}

impl GuidanceRecordingBackend {
    pub fn contexts(&self) -> Vec<String> {
        self.contexts.lock().clone()
    }

    pub fn glossaries(&self) -> Vec<Vec<(String, String)>> {
        self.glossaries.lock().clone()
    }
}

#[async_trait]
impl TranslationBackend for GuidanceRecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    async fn translate(&self, request: &BackendRequest<'_>) -> Result<Vec<TranslatedTask>, ProviderError> {
        self.contexts.lock().push(request.guidance.shared_context.clone());
        self.glossaries.lock().push(
            request
                .guidance
                .glossary
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        Ok(tag_all(request))
    }
}
