use anyhow::{anyhow, Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app_config::Config;
use crate::file_utils::{FileManager, FileType};
use crate::language_utils;
use crate::package::DocumentPackage;
use crate::providers::{self, TranslationBackend};
use crate::translation::context::glossary_suggestions;
use crate::translation::{extract, DeckTranslator, PipelineOptions, TranslatableUnit, UnitLocation};

// @module: Application controller for deck translation

/// Terms listed by `--generate-glossary`
const GLOSSARY_TERMS: usize = 50;

/// Per-invocation options that are not part of `conf.json`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overwrite existing outputs
    pub force_overwrite: bool,
    /// Run the pipeline but print a JSON preview instead of writing the deck
    pub dry_run: bool,
    /// Inserted into output names; `None` leaves it out
    pub run_id: Option<String>,
    /// Where to write the rendered deck profile
    pub deck_profile_out: Option<PathBuf>,
    /// Output file for a single deck, output directory for a folder
    pub output: Option<PathBuf>,
    /// Write glossary suggestions for the deck here and stop before translating
    pub generate_glossary: Option<PathBuf>,
}

/// What happened to one input deck
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Written(PathBuf),
    /// Output already existed and overwrite was not requested
    Skipped(PathBuf),
    DryRun,
    /// Glossary suggestions were written; nothing was translated
    Glossary(PathBuf),
}

/// Counters of a folder run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
struct PreviewEntry<'a> {
    id: &'a str,
    location: &'a UnitLocation,
    source: &'a str,
    translated: Option<&'a str>,
}

/// Main application controller for deck translation
pub struct Controller {
    config: Config,
    backend: Arc<dyn TranslationBackend>,
    show_progress: bool,
}

impl Controller {
    /// Controller using the backend selected by the configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let backend = providers::from_config(&config)?;
        Ok(Self::with_backend(config, backend))
    }

    pub fn with_backend(config: Config, backend: Arc<dyn TranslationBackend>) -> Self {
        Self {
            config,
            backend,
            show_progress: true,
        }
    }

    /// Disable progress bars (tests, non-interactive use)
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn translator(&self) -> DeckTranslator {
        DeckTranslator::new(Arc::clone(&self.backend), PipelineOptions::from_config(&self.config))
    }

    /// Output path for a deck when none was given explicitly
    pub fn output_path_for(&self, input_file: &Path, output_dir: &Path, run_id: Option<&str>) -> PathBuf {
        let lang = language_utils::normalize_to_part1_or_part2t(&self.config.target_language)
            .unwrap_or_else(|_| self.config.target_language.to_lowercase());
        FileManager::generate_output_path(input_file, output_dir, &lang, run_id)
    }

    /// Translate one deck
    pub async fn run(&self, input_file: &Path, options: &RunOptions) -> Result<FileOutcome> {
        let multi_progress = MultiProgress::new();
        if let Some(glossary_path) = &options.generate_glossary {
            self.write_glossary(input_file, glossary_path)?;
            return Ok(FileOutcome::Glossary(glossary_path.clone()));
        }
        let output_path = match &options.output {
            Some(path) => FileManager::with_run_id(path, options.run_id.as_deref()),
            None => {
                let output_dir = input_file.parent().unwrap_or(Path::new("."));
                self.output_path_for(input_file, output_dir, options.run_id.as_deref())
            }
        };
        self.run_with_progress(input_file, output_path, options, &multi_progress).await
    }

    /// Write `source,target,notes` glossary suggestions for the deck's most frequent terms
    pub fn write_glossary(&self, input_file: &Path, glossary_path: &Path) -> Result<usize> {
        if FileManager::detect_file_type(input_file)? != FileType::Deck {
            return Err(anyhow!("Input is not a .pptx deck: {:?}", input_file));
        }
        let package = DocumentPackage::open(FileManager::read_bytes(input_file)?)
            .with_context(|| format!("Failed to open {:?}", input_file))?;
        let units = extract(&package, &PipelineOptions::from_config(&self.config).extract)?;
        let (csv, terms) = glossary_suggestions(&units, GLOSSARY_TERMS);
        FileManager::write_to_file(glossary_path, &csv)?;
        info!("Glossary with {} frequent terms written to {:?}", terms, glossary_path);
        Ok(terms)
    }

    async fn run_with_progress(
        &self,
        input_file: &Path,
        output_path: PathBuf,
        options: &RunOptions,
        multi_progress: &MultiProgress,
    ) -> Result<FileOutcome> {
        let start_time = Instant::now();

        if FileManager::detect_file_type(input_file)? != FileType::Deck {
            return Err(anyhow!("Input is not a .pptx deck: {:?}", input_file));
        }
        if !options.dry_run && output_path.exists() && !options.force_overwrite {
            warn!(
                "Skipping {:?}, translation already exists at {:?} (use -f to force overwrite)",
                input_file, output_path
            );
            return Ok(FileOutcome::Skipped(output_path));
        }
        if let Some(source) = self.config.source_language.as_deref() {
            if language_utils::language_codes_match(source, &self.config.target_language) {
                warn!("Source and target language are the same ({})", source);
            }
        }

        info!(
            "Translating {:?} to {} with {}",
            input_file,
            self.config.target_language,
            self.backend.name()
        );
        let bytes = FileManager::read_bytes(input_file)?;

        let progress_bar = self.task_progress_bar(multi_progress);
        let bar = progress_bar.clone();
        let on_progress = move |done: usize, total: usize| {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
        };
        let outcome = self
            .translator()
            .translate_bytes(bytes, &on_progress)
            .await
            .with_context(|| format!("Failed to translate {:?}", input_file));
        progress_bar.finish_and_clear();
        let outcome = outcome?;

        if let Some(profile_path) = &options.deck_profile_out {
            FileManager::write_to_file(profile_path, &outcome.profile.to_context_string())?;
            info!("Deck profile written to {:?}", profile_path);
        }

        if options.dry_run {
            println!("{}", Self::preview_json(&outcome.units)?);
            info!(
                "Dry run finished in {}, no file written",
                Self::format_duration(start_time.elapsed())
            );
            return Ok(FileOutcome::DryRun);
        }

        FileManager::write_bytes(&output_path, &outcome.package)?;
        info!(
            "Success: {} ({})",
            output_path.display(),
            Self::format_duration(start_time.elapsed())
        );
        Ok(FileOutcome::Written(output_path))
    }

    /// Translate every deck below a directory
    ///
    /// Failures are logged and counted; the remaining decks are still processed.
    pub async fn run_folder(&self, input_dir: &Path, options: &RunOptions) -> Result<FolderSummary> {
        let start_time = Instant::now();
        if !input_dir.is_dir() {
            return Err(anyhow!("Input directory does not exist: {:?}", input_dir));
        }
        if options.generate_glossary.is_some() {
            return Err(anyhow!("Glossary generation takes a single deck, not a directory"));
        }

        let decks: Vec<PathBuf> = FileManager::find_decks(input_dir)?
            .into_iter()
            .filter(|deck| !self.is_translated_output(deck))
            .collect();
        if decks.is_empty() {
            return Err(anyhow!("No .pptx files found in directory: {:?}", input_dir));
        }

        let multi_progress = MultiProgress::new();
        let folder_pb = if self.show_progress {
            multi_progress.add(ProgressBar::new(decks.len() as u64))
        } else {
            ProgressBar::hidden()
        };
        folder_pb.set_style(Self::bar_style("files"));
        folder_pb.set_message("Processing files");

        let mut summary = FolderSummary::default();
        for deck in &decks {
            let file_name = deck
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            folder_pb.set_message(format!("Processing: {}", file_name));

            let output_dir = match &options.output {
                Some(dir) => dir.clone(),
                None => deck.parent().map_or_else(|| input_dir.to_path_buf(), Path::to_path_buf),
            };
            let output_path = self.output_path_for(deck, &output_dir, options.run_id.as_deref());

            match self.run_with_progress(deck, output_path, options, &multi_progress).await {
                Ok(FileOutcome::Skipped(_)) => summary.skipped += 1,
                Ok(_) => summary.processed += 1,
                Err(e) => {
                    error!("Error processing file {}: {:#}", file_name, e);
                    summary.failed += 1;
                }
            }
            folder_pb.inc(1);
        }
        folder_pb.finish_with_message("Folder processing complete");

        info!(
            "Folder processing completed in {}: {} processed, {} skipped, {} errors",
            Self::format_duration(start_time.elapsed()),
            summary.processed,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    /// Whether a deck looks like the output of an earlier run into the target language
    fn is_translated_output(&self, deck: &Path) -> bool {
        let stem = deck.file_stem().unwrap_or_default().to_string_lossy().to_string();
        let target = language_utils::normalize_to_part1_or_part2t(&self.config.target_language)
            .unwrap_or_else(|_| self.config.target_language.to_lowercase());
        stem.split('.').skip(1).any(|segment| segment.eq_ignore_ascii_case(&target))
    }

    /// JSON preview of a run: `id`, `location`, `source`, `translated` per unit
    pub fn preview_json(units: &[TranslatableUnit]) -> Result<String> {
        let entries: Vec<PreviewEntry<'_>> = units
            .iter()
            .map(|u| PreviewEntry {
                id: &u.id,
                location: &u.location,
                source: &u.source_text,
                translated: u.translated_text.as_deref(),
            })
            .collect();
        serde_json::to_string_pretty(&entries).context("Failed to serialize preview")
    }

    fn task_progress_bar(&self, multi_progress: &MultiProgress) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress_bar = multi_progress.add(ProgressBar::new(0));
        progress_bar.set_style(Self::bar_style("texts"));
        progress_bar.set_message("Translating");
        progress_bar
    }

    fn bar_style(unit: &str) -> ProgressStyle {
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{percent}}%) {{msg}} {{eta}}",
                unit
            ))
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░")
    }

    /// Human-readable duration
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
