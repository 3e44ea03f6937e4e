/*!
 * End-to-end deck translation.
 *
 * `DeckTranslator` runs one translation over a package:
 * extract → annotate → profile → dedup → schedule → apply → reinsert → serialize.
 * Every run builds its own `RunState`; nothing is shared between runs. The run
 * is all-or-nothing: any terminal error returns before a package is produced.
 */

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::info;

use crate::app_config::Config;
use crate::errors::TranslationError;
use crate::package::DocumentPackage;
use crate::providers::{TranslationBackend, TranslationGuidance};
use crate::translation::concurrency::{AdaptiveSettings, RunState};
use crate::translation::context::{annotate_units, combine_context, DeckProfile};
use crate::translation::dedup::{DedupIndex, DedupScope};
use crate::translation::extractor::{extract, ExtractOptions};
use crate::translation::reinsert::reinsert;
use crate::translation::scheduler::{RetryPolicy, Scheduler};
use crate::translation::units::TranslatableUnit;

/// Settings of one translation run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// `None` lets the backend detect the source language
    pub source_language: Option<String>,
    pub target_language: String,
    pub extract: ExtractOptions,
    pub dedup_scope: DedupScope,
    pub adaptive: AdaptiveSettings,
    pub retry: RetryPolicy,
    pub max_concurrent: usize,
    pub user_context: Option<String>,
    pub glossary: BTreeMap<String, String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            source_language: None,
            target_language: "fr".to_string(),
            extract: ExtractOptions::default(),
            dedup_scope: DedupScope::default(),
            adaptive: AdaptiveSettings::default(),
            retry: RetryPolicy::default(),
            max_concurrent: 1,
            user_context: None,
            glossary: BTreeMap::new(),
        }
    }
}

impl PipelineOptions {
    /// Options for a validated configuration
    pub fn from_config(config: &Config) -> Self {
        let common = &config.translation.common;
        let batching = &config.batching;
        Self {
            source_language: config.source_language.clone().filter(|s| !s.trim().is_empty()),
            target_language: config.target_language.clone(),
            extract: ExtractOptions {
                include_notes: config.extraction.include_notes,
                include_masters: config.extraction.include_masters,
            },
            dedup_scope: config.extraction.effective_dedup_scope(),
            adaptive: AdaptiveSettings {
                max_batch_chars: batching.max_batch_chars,
                min_batch_chars: batching.min_batch_chars,
                grow_after_fast_batches: batching.grow_after_fast_batches,
                fast_batch_threshold: Duration::from_millis(batching.fast_batch_ms),
            },
            retry: RetryPolicy {
                max_attempts: common.max_attempts,
                base_delay: Duration::from_millis(common.retry_backoff_ms),
                multiplier: common.backoff_multiplier,
                max_delay: Duration::from_millis(common.max_backoff_ms),
            },
            max_concurrent: batching.max_concurrent_requests,
            user_context: config.context.clone().filter(|c| !c.trim().is_empty()),
            glossary: config.glossary.clone(),
        }
    }
}

/// Counters of a finished run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub units: usize,
    pub blank_units: usize,
    pub unique_tasks: usize,
    /// Batches composed by the scheduler, before any re-split
    pub batches: usize,
    /// Backend calls, retries and re-splits included
    pub calls: usize,
    pub retries: usize,
    pub limit_adjustments: usize,
    pub final_limit: usize,
    pub peak_in_flight: usize,
    pub changed_nodes: usize,
    pub elapsed: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} units ({} blank), {} unique tasks, {} batches, {} calls, {} retries, \
             {} limit adjustments (final {} chars), peak concurrency {}, {} nodes changed in {:.2?}",
            self.units,
            self.blank_units,
            self.unique_tasks,
            self.batches,
            self.calls,
            self.retries,
            self.limit_adjustments,
            self.final_limit,
            self.peak_in_flight,
            self.changed_nodes,
            self.elapsed
        )
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct TranslationOutcome {
    /// Serialized translated package
    pub package: Vec<u8>,
    /// All units with `translated_text` filled, in extraction order
    pub units: Vec<TranslatableUnit>,
    pub profile: DeckProfile,
    pub summary: RunSummary,
}

/// Translates decks with one backend and one set of options
#[derive(Debug, Clone)]
pub struct DeckTranslator {
    backend: Arc<dyn TranslationBackend>,
    options: PipelineOptions,
}

impl DeckTranslator {
    pub fn new(backend: Arc<dyn TranslationBackend>, options: PipelineOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn backend(&self) -> &dyn TranslationBackend {
        self.backend.as_ref()
    }

    /// Open and translate a package
    pub async fn translate_bytes(
        &self,
        bytes: Vec<u8>,
        progress: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> Result<TranslationOutcome, TranslationError> {
        let package = DocumentPackage::open(bytes)?;
        self.translate_package(package, Vec::new(), progress).await
    }

    /// Translate a package together with units supplied by the caller.
    ///
    /// Extra units (image regions) are translated alongside the deck text and
    /// returned in the outcome; writing them back is up to the caller. Extra
    /// units without an id get a generated one.
    pub async fn translate_package(
        &self,
        mut package: DocumentPackage,
        extra_units: Vec<TranslatableUnit>,
        progress: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> Result<TranslationOutcome, TranslationError> {
        let started = Instant::now();
        let state = RunState::new(self.options.adaptive);

        let mut units = extract(&package, &self.options.extract)?;
        merge_extra_units(&mut units, extra_units, &state)?;
        annotate_units(&mut units);

        let profile = DeckProfile::build(&units);
        let guidance = TranslationGuidance {
            shared_context: combine_context(self.options.user_context.as_deref(), &profile),
            glossary: self.options.glossary.clone(),
        };

        let index = DedupIndex::register(&units, self.options.dedup_scope);
        let scheduler = Scheduler::new(
            self.backend.as_ref(),
            &state,
            self.options.retry,
            self.options.max_concurrent,
            self.options.source_language.as_deref(),
            &self.options.target_language,
            &guidance,
        );
        let batches = scheduler.run_tasks(index.tasks(), progress).await?;
        let batch_count = batches.len();

        let translated: HashMap<String, String> = batches
            .into_iter()
            .flat_map(|b| b.results)
            .map(|r| (r.id, r.text))
            .collect();
        index.apply(&mut units, &translated)?;

        let changed_nodes = reinsert(&mut package, &units)?;
        let bytes = package.serialize()?;

        let summary = RunSummary {
            units: units.len(),
            blank_units: units.iter().filter(|u| u.is_blank()).count(),
            unique_tasks: index.tasks().len(),
            batches: batch_count,
            calls: state.calls(),
            retries: state.retries(),
            limit_adjustments: state.limit().adjustments(),
            final_limit: state.limit().current(),
            peak_in_flight: state.peak_in_flight(),
            changed_nodes,
            elapsed: started.elapsed(),
        };
        info!("Translation finished with {}: {}", self.backend.name(), summary);

        Ok(TranslationOutcome {
            package: bytes,
            units,
            profile,
            summary,
        })
    }
}

fn merge_extra_units(
    units: &mut Vec<TranslatableUnit>,
    extra_units: Vec<TranslatableUnit>,
    state: &RunState,
) -> Result<(), TranslationError> {
    let mut seen: HashSet<String> = units.iter().map(|u| u.id.clone()).collect();
    for mut unit in extra_units {
        if unit.id.is_empty() {
            unit.id = state.next_fallback_id();
        }
        if !seen.insert(unit.id.clone()) {
            return Err(TranslationError::ExtractionConsistency {
                unit_id: unit.id,
                reason: "duplicate unit id".to_string(),
            });
        }
        units.push(unit);
    }
    Ok(())
}
