/*!
 * Batch composition.
 *
 * Pending tasks are packed greedily, in first-seen order, into batches whose
 * total character weight stays within the active limit. A task heavier than
 * the limit travels alone in an oversized batch; nothing is dropped or cut.
 */

use std::collections::VecDeque;

use crate::translation::dedup::TranslationTask;

/// An ordered group of tasks submitted in one backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Position of the batch in submission order
    pub seq: usize,
    pub tasks: Vec<TranslationTask>,
}

impl Batch {
    pub fn new(seq: usize, tasks: Vec<TranslationTask>) -> Self {
        Self { seq, tasks }
    }

    /// Total character weight of the batch
    pub fn weight(&self) -> usize {
        self.tasks.iter().map(TranslationTask::weight).sum()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Whether a single task exceeds `limit` on its own
    pub fn is_oversized(&self, limit: usize) -> bool {
        self.tasks.len() == 1 && self.weight() > limit
    }
}

/// Take the next batch from the front of `pending` under `limit`.
///
/// Returns `None` when nothing is pending.
pub fn take_batch(pending: &mut VecDeque<TranslationTask>, limit: usize) -> Option<Vec<TranslationTask>> {
    let first = pending.pop_front()?;
    let mut weight = first.weight();
    let mut tasks = vec![first];
    if weight > limit {
        return Some(tasks);
    }
    while let Some(next) = pending.front() {
        let next_weight = next.weight();
        if weight + next_weight > limit {
            break;
        }
        weight += next_weight;
        if let Some(task) = pending.pop_front() {
            tasks.push(task);
        }
    }
    Some(tasks)
}

/// Split tasks into consecutive batches under a fixed limit
pub fn compose(tasks: &[TranslationTask], limit: usize) -> Vec<Batch> {
    let mut pending: VecDeque<TranslationTask> = tasks.iter().cloned().collect();
    let mut batches = Vec::new();
    while let Some(group) = take_batch(&mut pending, limit.max(1)) {
        batches.push(Batch::new(batches.len(), group));
    }
    batches
}
