//! Scholar-Ripple main entry point
//!
//! This is the command-line interface for the Scholar-Ripple retrieval engine.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use scholar_ripple::config::{load_config_with_hash, validate, Config};
use scholar_ripple::crawler::{
    self, build_search_url, Fetch, RateLimitedTransport, Shutdown, ShutdownSignal, StopReason,
};
use scholar_ripple::download::{ArtifactAcquirer, OpenAccessResolver};
use scholar_ripple::output::{self, collect_statistics, print_statistics, ExportFormat};
use scholar_ripple::state::RetrievalState;
use scholar_ripple::storage::{DownloadLog, JsonStateStore, SqliteDownloadLog, StateStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Scholar-Ripple: a resilient bibliographic retrieval engine
///
/// Scholar-Ripple pages through a scholarly search listing at a polite pace,
/// keeps a resumable snapshot of every record it finds, and downloads and
/// verifies the PDFs those records link to.
#[derive(Parser, Debug)]
#[command(name = "scholar-ripple")]
#[command(version)]
#[command(about = "A resilient bibliographic retrieval engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply without one)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Page through a result listing and collect records
    Extract(ExtractArgs),

    /// Download PDFs for the records in the saved state
    Download,

    /// Show a summary of the saved state and download log
    Status,

    /// Export the saved records as JSON and/or CSV
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Listing URL to start from
    #[arg(long, required_unless_present = "query", conflicts_with = "query")]
    url: Option<String>,

    /// Search terms to build the listing URL from
    #[arg(long)]
    query: Option<String>,

    /// Earliest publication year (with --query)
    #[arg(long, requires = "query")]
    year_from: Option<u16>,

    /// Latest publication year (with --query)
    #[arg(long, requires = "query")]
    year_to: Option<u16>,

    /// Stop after this many distinct records
    #[arg(long)]
    max_records: Option<usize>,

    /// Stop after this many page attempts
    #[arg(long)]
    max_pages: Option<u32>,

    /// Minimum seconds between requests
    #[arg(long)]
    delay: Option<f64>,

    /// Continue from the saved state instead of starting over
    #[arg(long)]
    resume: bool,

    /// Download PDFs once extraction stops
    #[arg(long)]
    download: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Which files to write
    #[arg(long, value_enum, default_value_t = FormatArg::Both)]
    format: FormatArg,

    /// Directory to write metadata.json / metadata.csv into
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Json,
    Csv,
    Both,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Both => ExportFormat::Both,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load_configuration(cli.config.as_deref())?;

    match cli.command {
        Command::Extract(args) => handle_extract(config, args).await,
        Command::Download => handle_download(config).await,
        Command::Status => handle_status(&config),
        Command::Export(args) => handle_export(&config, args),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("scholar_ripple=info,warn"),
            1 => EnvFilter::new("scholar_ripple=debug,info"),
            2 => EnvFilter::new("scholar_ripple=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn load_configuration(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            Ok(config)
        }
        None => {
            tracing::debug!("No configuration file given, using defaults");
            Ok(Config::default())
        }
    }
}

/// Creates the directories every phase writes into
fn ensure_directories(config: &Config) -> anyhow::Result<()> {
    let output = &config.output;
    let mut dirs = vec![output.papers_dir.clone()];
    for file in [
        &output.state_file,
        &output.download_log,
        &output.metadata_json,
        &output.metadata_csv,
    ] {
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            dirs.push(parent.to_path_buf());
        }
    }

    for dir in dirs {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    Ok(())
}

/// Bridges Ctrl-C to the crawler's shutdown signal
fn install_interrupt_handler() -> ShutdownSignal {
    let (shutdown, signal) = Shutdown::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, saving state and stopping...");
            shutdown.trigger();
        }
    });
    signal
}

fn load_saved_state(store: &JsonStateStore) -> anyhow::Result<RetrievalState> {
    match store.load()? {
        Some(state) => Ok(state),
        None => bail!(
            "No saved state at {}; run `extract` first",
            store.path().display()
        ),
    }
}

/// Handles the `extract` subcommand
async fn handle_extract(mut config: Config, args: ExtractArgs) -> anyhow::Result<()> {
    if let Some(max_records) = args.max_records {
        config.crawler.max_records = max_records;
    }
    if let Some(max_pages) = args.max_pages {
        config.crawler.max_pages = max_pages;
    }
    if let Some(delay) = args.delay {
        if !delay.is_finite() || delay < 0.0 {
            bail!("--delay must be a non-negative number of seconds");
        }
        config.transport.request_delay_ms = (delay * 1000.0) as u64;
    }
    validate(&config).context("Invalid settings")?;

    let seed_url = match (&args.url, &args.query) {
        (Some(url), _) => url.clone(),
        (None, Some(query)) => {
            build_search_url(&config.crawler.base_url, query, args.year_from, args.year_to)
                .context("Failed to build search URL")?
        }
        (None, None) => bail!("Either --url or --query is required"),
    };

    ensure_directories(&config)?;
    let store = Arc::new(JsonStateStore::new(&config.output.state_file));
    let shutdown = install_interrupt_handler();

    tracing::info!(
        "Extracting up to {} records from {} pages, {}ms between requests",
        config.crawler.max_records,
        config.crawler.max_pages,
        config.transport.request_delay_ms
    );

    // Both phases go through one transport so pacing spans the whole run
    let transport: Arc<dyn Fetch> = Arc::new(RateLimitedTransport::from_config(&config)?);

    let (mut state, outcome) = crawler::crawl(
        &config,
        transport.clone(),
        store.clone(),
        &seed_url,
        args.resume,
        shutdown.clone(),
    )
    .await?;

    println!("\n=== Extraction Finished ===");
    println!("  Stop reason: {}", outcome.reason);
    println!("  Records added: {}", outcome.records_added);
    println!("  Total records: {}", outcome.total_records);
    println!("  Pages fetched: {}", outcome.pages_fetched);
    if !outcome.persisted {
        println!("  Warning: the final state could not be saved");
    }
    match outcome.reason {
        StopReason::Blocked => {
            println!("\nThe source is blocking requests. Wait, then rerun with --resume.")
        }
        StopReason::Interrupted => println!("\nRerun with --resume to continue."),
        _ => {}
    }

    if args.download && outcome.reason != StopReason::Interrupted {
        run_download(&config, transport, &mut state, store.as_ref(), shutdown).await?;
    }

    output::export(
        &state,
        ExportFormat::Both,
        &config.output.metadata_json,
        &config.output.metadata_csv,
    )?;

    Ok(())
}

/// Handles the `download` subcommand
async fn handle_download(config: Config) -> anyhow::Result<()> {
    validate(&config).context("Invalid settings")?;
    ensure_directories(&config)?;
    let store = JsonStateStore::new(&config.output.state_file);
    let mut state = load_saved_state(&store)?;
    let shutdown = install_interrupt_handler();
    let transport: Arc<dyn Fetch> = Arc::new(RateLimitedTransport::from_config(&config)?);

    run_download(&config, transport, &mut state, &store, shutdown).await?;

    output::export(
        &state,
        ExportFormat::Both,
        &config.output.metadata_json,
        &config.output.metadata_csv,
    )?;
    Ok(())
}

async fn run_download(
    config: &Config,
    transport: Arc<dyn Fetch>,
    state: &mut RetrievalState,
    store: &dyn StateStore,
    shutdown: ShutdownSignal,
) -> anyhow::Result<()> {
    let resolver = OpenAccessResolver::from_config(transport.clone(), &config.open_access);
    let log = SqliteDownloadLog::new(&config.output.download_log).with_context(|| {
        format!(
            "Failed to open download log {}",
            config.output.download_log.display()
        )
    })?;

    let mut acquirer = ArtifactAcquirer::new(
        transport,
        Box::new(log),
        &config.output.papers_dir,
        &config.download,
    )
    .with_shutdown(shutdown);
    if let Some(resolver) = resolver {
        acquirer = acquirer.with_resolver(resolver);
    }

    let totals = acquirer.acquire_all(state, store).await;

    println!("\n=== Download Finished ===");
    println!("  Downloaded: {}", totals.downloaded);
    println!("  Invalid: {}", totals.invalid);
    println!("  Failed: {}", totals.failed);
    println!("  Skipped (no URL): {}", totals.skipped);
    println!("  Attempted: {} of {}", totals.processed(), totals.total);
    if totals.interrupted {
        println!("\nInterrupted; run `download` again to continue.");
    }
    if !totals.persisted {
        println!("  Warning: the final state could not be saved");
    }

    Ok(())
}

/// Handles the `status` subcommand
fn handle_status(config: &Config) -> anyhow::Result<()> {
    let store = JsonStateStore::new(&config.output.state_file);
    let state = match store.load()? {
        Some(state) => state,
        None => {
            println!("No saved state at {}", store.path().display());
            return Ok(());
        }
    };

    let log = if config.output.download_log.exists() {
        Some(SqliteDownloadLog::new(&config.output.download_log)?)
    } else {
        None
    };

    println!("State: {}\n", store.path().display());
    let stats = collect_statistics(&state, log.as_ref().map(|l| l as &dyn DownloadLog))?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the `export` subcommand
fn handle_export(config: &Config, args: ExportArgs) -> anyhow::Result<()> {
    let store = JsonStateStore::new(&config.output.state_file);
    let state = load_saved_state(&store)?;

    let (json_path, csv_path) = match &args.output {
        Some(dir) => (dir.join("metadata.json"), dir.join("metadata.csv")),
        None => (
            config.output.metadata_json.clone(),
            config.output.metadata_csv.clone(),
        ),
    };

    let count = output::export(&state, args.format.into(), &json_path, &csv_path)?;

    let format: ExportFormat = args.format.into();
    if format.includes_json() {
        println!("✓ Exported {} records to {}", count, json_path.display());
    }
    if format.includes_csv() {
        println!("✓ Exported {} records to {}", count, csv_path.display());
    }

    Ok(())
}
