// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{error, info, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::PathBuf;

use decktrans::app_config::{Config, LogLevel, RunProfile, TranslationProvider};
use decktrans::app_controller::{Controller, RunOptions};
use decktrans::errors::AppError;
use decktrans::file_utils::FileManager;

/// CLI wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliTranslationProvider {
    Dummy,
    Ollama,
    #[value(name = "openai")]
    OpenAI,
    Anthropic,
    #[value(name = "lmstudio")]
    LMStudio,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Dummy => TranslationProvider::Dummy,
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
        }
    }
}

/// CLI wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

/// CLI wrapper for RunProfile to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliProfile {
    Fast,
    Balanced,
    Quality,
}

impl From<CliProfile> for RunProfile {
    fn from(profile: CliProfile) -> Self {
        match profile {
            CliProfile::Fast => RunProfile::Fast,
            CliProfile::Balanced => RunProfile::Balanced,
            CliProfile::Quality => RunProfile::Quality,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a deck or every deck in a directory (default command)
    Translate(TranslateArgs),

    /// Generate shell completions for decktrans
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
struct TranslateArgs {
    /// Input .pptx file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: Option<PathBuf>,

    /// Output file (single deck) or output directory (folder input)
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Target language code (e.g., 'de', 'es', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Source language code; omit to let the provider detect it
    #[arg(short, long)]
    source_language: Option<String>,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Run the translation but only print a JSON preview
    #[arg(long)]
    dry_run: bool,

    /// Skip speaker notes
    #[arg(long)]
    no_notes: bool,

    /// Skip slide masters and layouts
    #[arg(long)]
    no_masters: bool,

    /// Translate every unit separately instead of reusing translations of identical text
    #[arg(long)]
    no_dedupe_text: bool,

    /// Soft upper bound of characters per request
    #[arg(long, value_name = "N")]
    max_batch_chars: Option<usize>,

    /// Maximum number of requests in flight
    #[arg(long, value_name = "N")]
    max_concurrent_requests: Option<usize>,

    /// Free-text context handed to the provider with every request
    #[arg(long, value_name = "TEXT")]
    context: Option<String>,

    /// Speed/quality preset
    #[arg(long, value_enum)]
    profile: Option<CliProfile>,

    /// Run identifier inserted into output names, explicit -o paths included
    #[arg(long, value_name = "ID", conflicts_with = "no_run_id")]
    run_id: Option<String>,

    /// Leave the run identifier out of output names
    #[arg(long)]
    no_run_id: bool,

    /// Write the derived deck profile to this file
    #[arg(long, value_name = "PATH")]
    deck_profile_out: Option<PathBuf>,

    /// Write a source,target,notes CSV of frequent terms and exit without translating
    #[arg(long, value_name = "PATH")]
    generate_glossary: Option<PathBuf>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,
}

/// decktrans - slide deck translation with AI
///
/// Translates the text of .pptx decks with AI providers while keeping
/// layout, styling and embedded media untouched.
#[derive(Parser, Debug)]
#[command(name = "decktrans")]
#[command(version)]
#[command(about = "AI-powered slide deck translation tool")]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "decktrans translates the text of .pptx decks with AI providers.

EXAMPLES:
    decktrans talk.pptx -t de                    # Translate using default config
    decktrans -f talk.pptx -t de --no-run-id     # Overwrite talk.de.pptx
    decktrans -p openai -m gpt-4o talk.pptx      # Use specific provider and model
    decktrans --dry-run -p dummy talk.pptx       # Preview units as JSON
    decktrans --generate-glossary terms.csv talk.pptx  # Suggest glossary terms only
    decktrans --profile fast /decks/             # Process an entire directory
    decktrans completions bash > decktrans.bash  # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default
    one will be created automatically.

SUPPORTED PROVIDERS:
    dummy     - Offline, tags text with the target language (no network)
    ollama    - Local Ollama server
    openai    - OpenAI API (requires API key or OPENAI_API_KEY)
    anthropic - Anthropic API (requires API key or ANTHROPIC_API_KEY)
    lmstudio  - LM Studio local server (OpenAI-compatible on http://localhost:1234/v1)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    translate: TranslateArgs,
}

/// Coloured stderr logger with millisecond timestamps
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger { level: LevelFilter::Trace }))?;
        log::set_max_level(level);
        Ok(())
    }

    /// ANSI colour and tag for a level
    fn style(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("\x1B[1;31m", "ERROR"),
            Level::Warn => ("\x1B[1;33m", "WARN "),
            Level::Info => ("\x1B[1;32m", "INFO "),
            Level::Debug => ("\x1B[1;36m", "DEBUG"),
            Level::Trace => ("\x1B[1;35m", "TRACE"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = chrono::Local::now().format("%H:%M:%S.%3f");
        let (colour, tag) = Self::style(record.level());
        let mut stderr = std::io::stderr();
        let _ = writeln!(stderr, "{}{} {} {}\x1B[0m", colour, now, tag, record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = CustomLogger::init(LevelFilter::Info) {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let cli = CommandLineOptions::parse();
    let result = match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "decktrans", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Translate(args)) => run_translate(args).await,
        None => run_translate(cli.translate).await,
    };

    if let Err(e) = result {
        let app_error = AppError::from(e);
        error!("{}", app_error);
        std::process::exit(app_error.exit_code());
    }
}

/// Load the configuration and apply command line overrides
fn load_config(options: &TranslateArgs) -> Result<Config> {
    let mut config = Config::load_or_create(&options.config_path)?;

    if let Some(profile) = options.profile {
        config.profile = profile.into();
    }
    config.apply_profile();

    if let Some(provider) = options.provider {
        config.translation.provider = provider.into();
    }
    if let Some(model) = &options.model {
        config.translation.active_provider_config_mut().model = model.clone();
    }
    if let Some(source_lang) = &options.source_language {
        config.source_language = Some(source_lang.clone());
    }
    if let Some(target_lang) = &options.target_language {
        config.target_language = target_lang.clone();
    }
    if options.no_notes {
        config.extraction.include_notes = false;
    }
    if options.no_masters {
        config.extraction.include_masters = false;
    }
    if options.no_dedupe_text {
        config.extraction.dedupe_text = false;
    }
    if let Some(chars) = options.max_batch_chars {
        config.batching.max_batch_chars = chars;
        config.batching.min_batch_chars = config.batching.min_batch_chars.min(chars);
    }
    if let Some(requests) = options.max_concurrent_requests {
        config.batching.max_concurrent_requests = requests;
    }
    if let Some(context) = &options.context {
        config.context = Some(context.clone());
    }
    if let Some(log_level) = options.log_level {
        config.log_level = log_level.into();
    }

    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    // Apply the CLI level before the config is read so config loading is logged
    if let Some(level) = options.log_level {
        log::set_max_level(LogLevel::from(level).to_level_filter());
    }

    let input_path = options
        .input_path
        .clone()
        .ok_or_else(|| anyhow!("INPUT_PATH is required when no subcommand is specified"))?;

    let config = load_config(&options)?;
    log::set_max_level(config.log_level.to_level_filter());

    let run_id = if options.no_run_id {
        None
    } else {
        Some(options.run_id.clone().unwrap_or_else(FileManager::generate_run_id))
    };
    let run_options = RunOptions {
        force_overwrite: options.force_overwrite,
        dry_run: options.dry_run,
        run_id,
        deck_profile_out: options.deck_profile_out.clone(),
        output: options.output.clone(),
        generate_glossary: options.generate_glossary.clone(),
    };

    let controller = Controller::with_config(config)?;
    if input_path.is_file() {
        controller.run(&input_path, &run_options).await?;
    } else if input_path.is_dir() {
        let summary = controller.run_folder(&input_path, &run_options).await?;
        if summary.failed > 0 {
            return Err(anyhow!("{} of {} decks failed", summary.failed, summary.failed + summary.processed + summary.skipped));
        }
    } else {
        return Err(anyhow!("Input path does not exist: {:?}", input_path));
    }

    info!("Done");
    Ok(())
}
