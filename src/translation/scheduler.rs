/*!
 * Concurrent batch dispatch.
 *
 * The scheduler keeps at most `max_concurrent` backend calls in flight,
 * composing the next batch only when a slot frees up so that limit changes
 * apply to everything not yet sent. Completions arrive in any order; each
 * batch carries its sequence number and results are emitted in sequence
 * order once all of them are in.
 *
 * A failed call is classified by its `ProviderError`:
 * - transient failures are retried with exponential backoff until the
 *   attempt budget runs out,
 * - "payload too large" shrinks the shared limit and re-splits the batch,
 * - anything else aborts the run.
 * Every call, first attempts and re-split pieces alike, goes out under the
 * limit in force when it is sent; a multi-task batch that has become too
 * heavy for it is split again before the call.
 * The first terminal error is returned immediately and every other in-flight
 * call is dropped, so a failed run yields no results at all.
 */

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, warn};

use crate::errors::{FailureKind, ProviderError, TranslationError};
use crate::providers::{align_results, BackendRequest, TranslatedTask, TranslationBackend, TranslationGuidance};
use crate::translation::batch::{take_batch, Batch};
use crate::translation::concurrency::RunState;
use crate::translation::dedup::TranslationTask;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try the same batch again after the delay
    Retry(Duration),
    /// Shrink the limit and resubmit the batch in smaller pieces
    Resplit,
    /// Stop the run
    Abort,
}

/// Backoff and attempt budget for one batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per batch, first call included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Decide how to react to the failure of attempt number `attempt` (1-based)
    pub fn decide(&self, kind: FailureKind, attempt: u32, splittable: bool) -> RetryDecision {
        match kind {
            FailureKind::Fatal => RetryDecision::Abort,
            FailureKind::PayloadTooLarge if splittable => RetryDecision::Resplit,
            FailureKind::PayloadTooLarge | FailureKind::Transient => {
                if attempt >= self.max_attempts.max(1) {
                    RetryDecision::Abort
                } else {
                    RetryDecision::Retry(self.delay(attempt))
                }
            }
        }
    }

    /// Delay before the attempt following attempt number `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Results of one batch, in the batch's task order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedBatch {
    pub seq: usize,
    pub results: Vec<TranslatedTask>,
}

/// Where the next batch comes from
enum BatchSource {
    /// Batches composed up front
    Fixed(VecDeque<Batch>),
    /// Tasks packed on demand under the live limit
    Lazy {
        pending: VecDeque<TranslationTask>,
        next_seq: usize,
    },
}

impl BatchSource {
    fn next(&mut self, limit: usize) -> Option<Batch> {
        match self {
            Self::Fixed(batches) => batches.pop_front(),
            Self::Lazy { pending, next_seq } => {
                let tasks = take_batch(pending, limit)?;
                let batch = Batch::new(*next_seq, tasks);
                *next_seq += 1;
                Some(batch)
            }
        }
    }
}

/// Dispatches batches to a backend for one run
pub struct Scheduler<'a> {
    backend: &'a dyn TranslationBackend,
    state: &'a RunState,
    policy: RetryPolicy,
    max_concurrent: usize,
    source_language: Option<&'a str>,
    target_language: &'a str,
    guidance: &'a TranslationGuidance,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        backend: &'a dyn TranslationBackend,
        state: &'a RunState,
        policy: RetryPolicy,
        max_concurrent: usize,
        source_language: Option<&'a str>,
        target_language: &'a str,
        guidance: &'a TranslationGuidance,
    ) -> Self {
        Self {
            backend,
            state,
            policy,
            max_concurrent,
            source_language,
            target_language,
            guidance,
        }
    }

    /// Effective parallelism for this backend
    pub fn concurrency(&self) -> usize {
        if self.backend.supports_concurrency() {
            self.max_concurrent.max(1)
        } else {
            1
        }
    }

    /// Translate pending tasks, composing batches under the live limit
    pub async fn run_tasks(
        &self,
        tasks: &[TranslationTask],
        progress: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> Result<Vec<TranslatedBatch>, TranslationError> {
        let source = BatchSource::Lazy {
            pending: tasks.iter().cloned().collect(),
            next_seq: 0,
        };
        self.dispatch(source, tasks.len(), progress).await
    }

    /// Translate batches composed up front
    pub async fn run(
        &self,
        batches: Vec<Batch>,
        progress: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> Result<Vec<TranslatedBatch>, TranslationError> {
        let total = batches.iter().map(Batch::len).sum();
        self.dispatch(BatchSource::Fixed(batches.into()), total, progress).await
    }

    async fn dispatch(
        &self,
        mut source: BatchSource,
        total_tasks: usize,
        progress: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> Result<Vec<TranslatedBatch>, TranslationError> {
        let concurrency = self.concurrency();
        debug!(
            "Dispatching {} tasks to {} with up to {} concurrent requests",
            total_tasks,
            self.backend.name(),
            concurrency
        );

        let mut in_flight = FuturesUnordered::new();
        let mut completed: BTreeMap<usize, TranslatedBatch> = BTreeMap::new();
        let mut done_tasks = 0usize;
        progress(0, total_tasks);

        loop {
            while in_flight.len() < concurrency {
                match source.next(self.state.limit().current()) {
                    Some(batch) => in_flight.push(self.process(batch)),
                    None => break,
                }
            }
            match in_flight.next().await {
                Some(Ok(batch)) => {
                    done_tasks += batch.results.len();
                    progress(done_tasks, total_tasks);
                    completed.insert(batch.seq, batch);
                }
                // Dropping the pool abandons every other call of the run
                Some(Err(error)) => return Err(error),
                None => break,
            }
        }

        Ok(completed.into_values().collect())
    }

    fn process(&self, batch: Batch) -> BoxFuture<'_, Result<TranslatedBatch, TranslationError>> {
        async move {
            let seq = batch.seq;
            let results = self.translate_tasks(batch.tasks, seq).await?;
            Ok(TranslatedBatch { seq, results })
        }
        .boxed()
    }

    fn translate_tasks(
        &self,
        tasks: Vec<TranslationTask>,
        seq: usize,
    ) -> BoxFuture<'_, Result<Vec<TranslatedTask>, TranslationError>> {
        async move {
            let weight: usize = tasks.iter().map(TranslationTask::weight).sum();
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                let live_limit = self.state.limit().current();
                if tasks.len() > 1 && weight > live_limit {
                    debug!(
                        "Batch {} ({} chars) exceeds the current limit of {} chars; splitting",
                        seq, weight, live_limit
                    );
                    return self.translate_split(tasks, seq).await;
                }
                let started = Instant::now();
                let outcome = self.call_backend(&tasks).await;
                let error = match outcome {
                    Ok(results) => {
                        let elapsed = started.elapsed();
                        debug!(
                            "Batch {} ({} tasks, {} chars) translated in {:?}",
                            seq,
                            tasks.len(),
                            weight,
                            elapsed
                        );
                        self.state.limit().record_success(weight, elapsed);
                        return Ok(results);
                    }
                    Err(error) => error,
                };

                let limit = self.state.limit();
                limit.record_failure();
                let kind = error.failure_kind();
                if kind == FailureKind::PayloadTooLarge {
                    limit.shrink_for(weight);
                }

                match self.policy.decide(kind, attempt, tasks.len() > 1) {
                    RetryDecision::Retry(delay) => {
                        self.state.record_retry();
                        warn!(
                            "Batch {} failed on attempt {}/{}: {}; retrying in {:?}",
                            seq, attempt, self.policy.max_attempts, error, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::Resplit => {
                        warn!(
                            "Batch {} ({} chars) too large; resubmitting under a {}-char limit",
                            seq,
                            weight,
                            limit.current()
                        );
                        return self.translate_split(tasks, seq).await;
                    }
                    RetryDecision::Abort => {
                        return Err(match kind {
                            FailureKind::Fatal => TranslationError::BackendFatal(error),
                            _ => TranslationError::RetriesExhausted {
                                attempts: attempt,
                                source: error,
                            },
                        });
                    }
                }
            }
        }
        .boxed()
    }

    /// Translate `tasks` in consecutive pieces, each packed under the live limit
    async fn translate_split(
        &self,
        tasks: Vec<TranslationTask>,
        seq: usize,
    ) -> Result<Vec<TranslatedTask>, TranslationError> {
        let rejected = tasks.len();
        let mut pending: VecDeque<TranslationTask> = tasks.into();
        let mut results = Vec::with_capacity(rejected);
        while let Some(group) = take_smaller(&mut pending, self.state.limit().current(), rejected) {
            results.extend(self.translate_tasks(group, seq).await?);
        }
        Ok(results)
    }

    async fn call_backend(&self, tasks: &[TranslationTask]) -> Result<Vec<TranslatedTask>, ProviderError> {
        let _in_flight = self.state.enter();
        let request = BackendRequest {
            tasks,
            source_language: self.source_language,
            target_language: self.target_language,
            guidance: self.guidance,
        };
        let results = self.backend.translate(&request).await?;
        align_results(tasks, results)
    }
}

/// Take the next piece of a batch of `rejected` tasks under `limit`.
///
/// The piece is halved when it would hold the whole batch again, so
/// splitting always makes progress.
fn take_smaller(
    pending: &mut VecDeque<TranslationTask>,
    limit: usize,
    rejected: usize,
) -> Option<Vec<TranslationTask>> {
    let mut group = take_batch(pending, limit)?;
    if rejected > 1 && group.len() == rejected {
        let tail = group.split_off(rejected / 2);
        for task in tail.into_iter().rev() {
            pending.push_front(task);
        }
    }
    Some(group)
}
