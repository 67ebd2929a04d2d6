use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use commons_harvest::commons::CommonsHttpClient;
use commons_harvest::config::{ConfigLoader, FetcherConfig};
use commons_harvest::domain::BorderColor;
use commons_harvest::error::HarvestError;
use commons_harvest::fetcher::Fetcher;
use commons_harvest::output::{ConsoleOutput, JsonOutput, OutputMode};
use commons_harvest::store::OutputStore;
use commons_harvest::trim::{TrimOptions, trim_directory};

#[derive(Parser)]
#[command(name = "commons-harvest")]
#[command(about = "Polite, resumable Wikimedia Commons category downloader and PNG border trimmer")]
#[command(version, author)]
struct Cli {
    /// Print a JSON summary instead of per-item progress
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download every file of a category, one at a time")]
    Fetch(FetchArgs),
    #[command(about = "Trim white or transparent borders from PNG files")]
    Trim(TrimArgs),
}

#[derive(Args)]
struct FetchArgs {
    /// Category to download, e.g. "Category:SVG_simplified_musical_symbols"
    collection: Option<String>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    output_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    api_url: Option<String>,

    /// Seconds to wait between downloads
    #[arg(long)]
    delay_secs: Option<u64>,

    /// Stop once this many 429 responses have been seen during the run
    #[arg(long)]
    max_rate_limit_errors: Option<u32>,

    /// Upper bound on listed files
    #[arg(long)]
    limit: Option<usize>,

    #[arg(long)]
    page_size: Option<u32>,
}

#[derive(Args)]
struct TrimArgs {
    input_dir: Utf8PathBuf,

    /// Write trimmed copies here instead of overwriting the originals
    #[arg(long)]
    output_dir: Option<Utf8PathBuf>,

    #[arg(long, value_enum, default_value_t = BorderColor::White)]
    background: BorderColor,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::OutputDir { .. }
        | HarvestError::MissingInputDir(_)
        | HarvestError::InvalidCollection(_)
        | HarvestError::InvalidConfig(_)
        | HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_) => 2,
        HarvestError::Http(_)
        | HarvestError::Transport { .. }
        | HarvestError::RateLimited { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, output_mode),
        Commands::Trim(args) => run_trim(args, output_mode),
    }
}

fn resolve_fetch_config(args: FetchArgs) -> Result<FetcherConfig, HarvestError> {
    let mut config = ConfigLoader::resolve(args.config.as_deref())?;
    if let Some(collection) = args.collection {
        config.collection = collection.parse()?;
    }
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(api_url) = args.api_url {
        config.api_url = api_url;
    }
    if let Some(delay) = args.delay_secs {
        config.delay = Duration::from_secs(delay);
    }
    if let Some(max) = args.max_rate_limit_errors {
        config.max_rate_limit_errors = max;
    }
    if let Some(limit) = args.limit {
        config.listing_limit = limit;
    }
    if let Some(page_size) = args.page_size {
        config.page_size = page_size;
    }
    config.validate()?;
    Ok(config)
}

fn install_interrupt_handler() -> miette::Result<Arc<AtomicBool>> {
    let abort = Arc::new(AtomicBool::new(false));
    let handler_token = Arc::clone(&abort);
    ctrlc::set_handler(move || {
        handler_token.store(true, Ordering::Relaxed);
    })
    .into_diagnostic()?;
    Ok(abort)
}

fn run_fetch(args: FetchArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = resolve_fetch_config(args)?;

    let store = OutputStore::new(config.output_dir.clone());
    store.ensure_root()?;

    let client = CommonsHttpClient::new(&config)?;
    let abort = install_interrupt_handler()?;

    match output_mode {
        OutputMode::NonInteractive => {
            let fetcher = Fetcher::new(client, store, config).with_abort_token(abort);
            let summary = fetcher.run(&JsonOutput)?;
            JsonOutput::print_run(&summary).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            ConsoleOutput::print_banner(&[
                ("Category", config.collection.to_string()),
                ("Output directory", config.output_dir.to_string()),
                (
                    "Rate limit",
                    format!("1 file every {} seconds", config.delay.as_secs_f64()),
                ),
                (
                    "Exit after",
                    format!(
                        "{} rate limit errors (429)",
                        config.max_rate_limit_errors
                    ),
                ),
            ]);
            let fetcher = Fetcher::new(client, store, config).with_abort_token(abort);
            let summary = fetcher.run(&ConsoleOutput)?;
            ConsoleOutput::print_run(&summary);
        }
    }
    Ok(())
}

fn run_trim(args: TrimArgs, output_mode: OutputMode) -> miette::Result<()> {
    let options = TrimOptions {
        background: args.background,
    };
    let output_dir = args.output_dir.as_deref();

    match output_mode {
        OutputMode::NonInteractive => {
            let summary = trim_directory(&args.input_dir, output_dir, options, &JsonOutput)?;
            JsonOutput::print_trim(&summary).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let summary = trim_directory(&args.input_dir, output_dir, options, &ConsoleOutput)?;
            ConsoleOutput::print_trim(&summary);
        }
    }
    Ok(())
}
