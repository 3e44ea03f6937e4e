/*!
 * Deck translation pipeline.
 *
 * Submodules, in pipeline order:
 * - `units`: translatable units and their locations
 * - `extractor`: walks parts and yields units in document order
 * - `dedup`: collapses repeated text into translation tasks
 * - `context`: deck profile and per-unit hints
 * - `batch`: greedy packing of tasks under a character limit
 * - `concurrency`: run-scoped adaptive limit and in-flight accounting
 * - `scheduler`: bounded concurrent dispatch with retry and ordered reassembly
 * - `prompts`: prompt and reply protocol of the network backends
 * - `reinsert`: writes translations back into the package
 * - `pipeline`: `DeckTranslator`, tying the stages together
 */

// Re-export main types for easier usage
pub use self::batch::{compose, Batch};
pub use self::concurrency::{AdaptiveSettings, BatchLimit, RunState};
pub use self::context::DeckProfile;
pub use self::dedup::{DedupIndex, DedupScope, DeduplicationKey, TranslationTask};
pub use self::extractor::{extract, ExtractOptions};
pub use self::pipeline::{DeckTranslator, PipelineOptions, RunSummary, TranslationOutcome};
pub use self::reinsert::reinsert;
pub use self::scheduler::{RetryDecision, RetryPolicy, Scheduler, TranslatedBatch};
pub use self::units::{BoundingBox, TextCoords, TextRole, TranslatableUnit, UnitLocation};

// Submodules
pub mod batch;
pub mod concurrency;
pub mod context;
pub mod dedup;
pub mod extractor;
pub mod pipeline;
pub mod prompts;
pub mod reinsert;
pub mod scheduler;
pub mod units;
