/*!
 * Run-scoped shared state for batch dispatch.
 *
 * `RunState` is created at the start of a run and dropped at its end. It owns
 * the adaptive batch-size limit, the in-flight request counter and the
 * fallback id counter. Everything here is shared across concurrent workers,
 * so all mutation goes through atomics; the limit only ever changes through
 * compare-and-swap updates.
 */

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use log::info;

/// Tuning for the adaptive batch limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveSettings {
    /// Soft upper bound; the limit never grows beyond it
    pub max_batch_chars: usize,
    /// Floor for shrinking; only a rejected batch at or below it goes lower
    pub min_batch_chars: usize,
    /// Consecutive fast successes needed before growing
    pub grow_after_fast_batches: usize,
    /// A batch faster than this counts as fast
    pub fast_batch_threshold: Duration,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            max_batch_chars: 4000,
            min_batch_chars: 200,
            grow_after_fast_batches: 4,
            fast_batch_threshold: Duration::from_millis(2000),
        }
    }
}

/// A change of the active limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitChange {
    pub before: usize,
    pub after: usize,
}

/// Process-wide batch size limit, adjusted from observed provider behaviour
#[derive(Debug)]
pub struct BatchLimit {
    settings: AdaptiveSettings,
    current: AtomicUsize,
    /// Largest size not known to be rejected
    ceiling: AtomicUsize,
    /// Heaviest batch the backend accepted
    accepted: AtomicUsize,
    fast_streak: AtomicUsize,
    adjustments: AtomicUsize,
}

impl BatchLimit {
    pub fn new(settings: AdaptiveSettings) -> Self {
        let max = settings.max_batch_chars.max(1);
        let settings = AdaptiveSettings {
            max_batch_chars: max,
            min_batch_chars: settings.min_batch_chars.clamp(1, max),
            ..settings
        };
        Self {
            settings,
            current: AtomicUsize::new(max),
            ceiling: AtomicUsize::new(max),
            accepted: AtomicUsize::new(0),
            fast_streak: AtomicUsize::new(0),
            adjustments: AtomicUsize::new(0),
        }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn settings(&self) -> &AdaptiveSettings {
        &self.settings
    }

    /// Number of limit changes so far
    pub fn adjustments(&self) -> usize {
        self.adjustments.load(Ordering::SeqCst)
    }

    /// React to a batch of `rejected_weight` characters being too large.
    ///
    /// The limit drops to half the rejected weight unless a concurrent shrink
    /// already took it lower. The floor holds while rejected batches are
    /// heavier than it; once a batch at or below the floor is rejected the
    /// limit keeps halving.
    pub fn shrink_for(&self, rejected_weight: usize) -> Option<LimitChange> {
        self.fast_streak.store(0, Ordering::SeqCst);
        if rejected_weight > 1 {
            self.ceiling.fetch_min(rejected_weight - 1, Ordering::SeqCst);
        }
        let half = (rejected_weight / 2).max(1);
        let target = if rejected_weight <= self.settings.min_batch_chars {
            half
        } else {
            half.max(self.settings.min_batch_chars)
        };
        let result = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (target < current).then_some(target)
            });
        match result {
            Ok(before) => {
                let change = LimitChange { before, after: target };
                self.adjustments.fetch_add(1, Ordering::SeqCst);
                info!(
                    "Batch limit reduced from {} to {} chars after a {}-char batch was too large",
                    change.before, change.after, rejected_weight
                );
                Some(change)
            }
            Err(_) => None,
        }
    }

    /// Record a successful batch; grows the limit after a streak of fast ones.
    ///
    /// Growth stops at the heaviest batch the backend has accepted, so the
    /// limit never climbs back into sizes that were rejected.
    pub fn record_success(&self, weight: usize, elapsed: Duration) -> Option<LimitChange> {
        if elapsed > self.settings.fast_batch_threshold || weight > self.current() {
            self.fast_streak.store(0, Ordering::SeqCst);
            return None;
        }
        self.accepted.fetch_max(weight, Ordering::SeqCst);
        let streak = self.fast_streak.fetch_add(1, Ordering::SeqCst) + 1;
        if streak < self.settings.grow_after_fast_batches.max(1) {
            return None;
        }
        self.fast_streak.store(0, Ordering::SeqCst);

        let ceiling = self
            .ceiling
            .load(Ordering::SeqCst)
            .min(self.settings.max_batch_chars)
            .min(self.accepted.load(Ordering::SeqCst));
        let result = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let grown = (current + current / 2).max(current + 1).min(ceiling);
                (grown > current).then_some(grown)
            });
        match result {
            Ok(before) => {
                let after = self.current();
                self.adjustments.fetch_add(1, Ordering::SeqCst);
                info!(
                    "Batch limit raised from {} to {} chars after {} fast batches",
                    before, after, streak
                );
                Some(LimitChange { before, after })
            }
            Err(_) => None,
        }
    }

    /// Any failure ends the fast streak
    pub fn record_failure(&self) {
        self.fast_streak.store(0, Ordering::SeqCst);
    }
}

/// Decrements the in-flight counter when dropped
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// State shared by all workers of one run
#[derive(Debug)]
pub struct RunState {
    limit: BatchLimit,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    fallback_ids: AtomicU64,
    retries: AtomicUsize,
    batches: AtomicUsize,
}

impl RunState {
    pub fn new(settings: AdaptiveSettings) -> Self {
        Self {
            limit: BatchLimit::new(settings),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            fallback_ids: AtomicU64::new(0),
            retries: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
        }
    }

    pub fn limit(&self) -> &BatchLimit {
        &self.limit
    }

    /// Mark a backend call as in flight until the guard drops
    pub fn enter(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        self.batches.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            counter: &self.in_flight,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous backend calls seen
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Backend calls made so far, retries included
    pub fn calls(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    pub fn retries(&self) -> usize {
        self.retries.load(Ordering::SeqCst)
    }

    /// Next identifier for a unit that arrived without one
    pub fn next_fallback_id(&self) -> String {
        format!("x{}", self.fallback_ids.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
