use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bracket_engine::discovery::{
    flatten_pages, normalize_entries, normalize_pages, PageItem, Pagination, DEFAULT_FILES_PER_PAGE,
};
use bracket_engine::exif::RexifReader;
use bracket_engine::extract::{extract_folder, LocalFolder};
use bracket_engine::{
    build_brackets, detect_effective_delta, BracketKind, BracketResult, BracketingConfig, Extraction,
    SingleFileHandling,
};
use clap::{Args, Parser, Subcommand};
use session_buffer::{SessionBuffer, SqliteSessionStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bracketflow")]
#[command(about = "Group real-estate photo exposures into HDR brackets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build brackets from a JSON file of metadata pages
    Build {
        /// JSON array of metadata entries, possibly nested by page
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        options: BuildOptions,
    },

    /// Read EXIF from a local folder and build brackets
    Scan {
        /// Path to folder containing images
        #[arg(short, long)]
        path: PathBuf,

        #[command(flatten)]
        options: BuildOptions,
    },

    /// Show which time delta a set of camera models would use
    Detect {
        /// Camera model strings, as found in EXIF
        #[arg(short, long = "model", num_args = 1..)]
        models: Vec<String>,

        /// Configured time delta (seconds)
        #[arg(long, default_value_t = bracket_engine::config::DEFAULT_TIME_DELTA_SECONDS)]
        time_delta: f64,
    },

    /// Buffer paginated discovery output across invocations
    Session {
        /// Session database (defaults to ~/.bracketflow/sessions.db)
        #[arg(long, global = true)]
        db: Option<PathBuf>,

        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Start a session expecting a number of pages, given directly or
    /// derived from a file count
    Create {
        #[arg(long, required_unless_present = "files", conflicts_with = "files")]
        pages: Option<u32>,

        /// Number of discovered files to split into pages
        #[arg(long)]
        files: Option<usize>,

        #[arg(long, default_value_t = DEFAULT_FILES_PER_PAGE, requires = "files")]
        per_page: usize,
    },

    /// Add one page of metadata entries
    Append {
        #[arg(long)]
        id: String,

        /// Page number, starting at 1
        #[arg(long)]
        page: u32,

        #[arg(short, long)]
        input: PathBuf,
    },

    /// Show received and missing pages
    Status {
        #[arg(long)]
        id: String,
    },

    /// Build brackets from a complete session, discarding it once the build succeeds
    Finish {
        #[arg(long)]
        id: String,

        #[command(flatten)]
        options: BuildOptions,
    },

    /// Drop sessions that have not been updated recently
    Purge {
        #[arg(long, default_value = "24")]
        ttl_hours: i64,
    },
}

#[derive(Args)]
struct BuildOptions {
    /// JSON file with a bracketing configuration; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum gap between consecutive exposures of a bracket (seconds)
    #[arg(long)]
    time_delta: Option<f64>,

    /// Maximum gap for folding a single into a neighbouring bracket (seconds)
    #[arg(long)]
    merge_window: Option<f64>,

    #[arg(long)]
    min_bracket_size: Option<usize>,

    /// merge, keep, separate or skip
    #[arg(long)]
    single_file_handling: Option<SingleFileHandling>,

    /// Output results to JSON file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl BuildOptions {
    fn resolve_config(&self) -> Result<BracketingConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => BracketingConfig::default(),
        };

        if let Some(delta) = self.time_delta {
            config.time_delta_seconds = delta;
        }
        if let Some(window) = self.merge_window {
            config.merge_window_seconds = window;
        }
        if let Some(size) = self.min_bracket_size {
            config.min_bracket_size = size;
        }
        if let Some(handling) = self.single_file_handling {
            config.single_file_handling = handling;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, options } => build_from_file(&input, &options),
        Commands::Scan { path, options } => scan_folder(&path, &options),
        Commands::Detect { models, time_delta } => {
            let (delta, reason) = detect_effective_delta(models.iter().map(|m| Some(m.as_str())), time_delta);
            println!("Effective time delta: {}s ({})", delta, reason);
            Ok(())
        }
        Commands::Session { db, command } => {
            let store = match db {
                Some(path) => SqliteSessionStore::open_at(&path),
                None => SqliteSessionStore::open_default(),
            }
            .context("Failed to open session store")?;
            run_session(&store, command)
        }
    }
}

fn build_from_file(input: &Path, options: &BuildOptions) -> Result<()> {
    let config = options.resolve_config()?;
    let items = read_pages(input)?;
    let extraction = normalize_pages(items);
    run_build(extraction, &config, options.output.as_deref())
}

fn scan_folder(path: &Path, options: &BuildOptions) -> Result<()> {
    let config = options.resolve_config()?;
    println!("🔍 Scanning images in: {}", path.display());

    let source = LocalFolder::new(path);
    let extraction = extract_folder(&source, "", &RexifReader)
        .with_context(|| format!("Failed to scan {}", path.display()))?;
    run_build(extraction, &config, options.output.as_deref())
}

fn read_pages(path: &Path) -> Result<Vec<PageItem>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse metadata pages in {}", path.display()))
}

fn run_build(extraction: Extraction, config: &BracketingConfig, output: Option<&Path>) -> Result<()> {
    if !extraction.rejected.is_empty() {
        println!("⚠️  Skipped {} files without a usable capture time", extraction.rejected.len());
        for rejected in &extraction.rejected {
            warn!(path = %rejected.path, reason = %rejected.reason, "file skipped");
        }
    }

    info!(records = extraction.records.len(), "building brackets");
    let result = build_brackets(extraction.records, config)?;
    print_summary(&result);

    if let Some(output_path) = output {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialize brackets to JSON")?;
        std::fs::write(output_path, json)
            .with_context(|| format!("Failed to write output to {}", output_path.display()))?;
        println!("💾 Results saved to: {}", output_path.display());
    }

    Ok(())
}

fn print_summary(result: &BracketResult) {
    let report = &result.report;
    println!("\n📈 BRACKET RESULTS");
    println!("==================");
    println!("Total files: {}", report.total_files);
    println!("Brackets: {}", report.total_brackets);
    println!(
        "Singles: {} (merged {}, dropped {})",
        report.single_files, report.merged_singles, report.dropped_singles
    );
    println!(
        "Time delta: {}s ({})",
        report.effective_time_delta_seconds, report.detection_reason
    );
    println!("Quality: {:.1} ({})", report.quality_score, report.quality_category());

    for (i, bracket) in result.brackets.iter().enumerate() {
        let label = match bracket.kind {
            BracketKind::Exposures => "exposures",
            BracketKind::Single => "single",
        };
        println!(
            "\nBracket {} [{}] {} {} ({:.1}s)",
            i + 1,
            bracket.id,
            bracket.len(),
            label,
            bracket.span_seconds()
        );
        for record in &bracket.records {
            println!("    {}", record.name);
        }
    }

    if !result.singles.is_empty() {
        println!("\nSeparate singles:");
        for record in &result.singles {
            println!("    {}", record.name);
        }
    }

    println!();
    for recommendation in &report.recommendations {
        println!("💡 {}", recommendation);
    }
}

fn run_session(store: &dyn SessionBuffer, command: SessionCommands) -> Result<()> {
    match command {
        SessionCommands::Create { pages, files, per_page } => {
            let (pages, layout) = expected_pages(pages, files, per_page)?;
            let id = store.create(pages)?;
            println!("{}", id);
            if let Some(layout) = layout {
                for page in 1..=layout.total_pages {
                    if let Some(range) = layout.page_range(page) {
                        info!(page, first = range.start + 1, last = range.end, "page layout");
                    }
                }
            }
        }
        SessionCommands::Append { id, page, input } => {
            let entries = flatten_pages(read_pages(&input)?);
            let status = store.append_page(&id, page, entries)?;
            println!(
                "📥 Page {}/{} stored ({} entries buffered)",
                page, status.total_pages, status.entry_count
            );
            let missing = status.missing_pages();
            if missing.is_empty() {
                println!("✅ All pages received");
            } else {
                println!("Waiting for pages {:?}", missing);
            }
        }
        SessionCommands::Status { id } => {
            let status = store.status(&id)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        SessionCommands::Finish { id, options } => finish_session(store, &id, &options)?,
        SessionCommands::Purge { ttl_hours } => {
            let purged = store.purge_expired(ttl_from_hours(ttl_hours)?)?;
            println!("🧹 Purged {} expired sessions", purged);
        }
    }
    Ok(())
}

/// Page count for a new session, plus the file layout when it was derived
/// from `--files`.
fn expected_pages(pages: Option<u32>, files: Option<usize>, per_page: usize) -> Result<(u32, Option<Pagination>)> {
    match (pages, files) {
        (Some(pages), _) => Ok((pages, None)),
        (None, Some(files)) => {
            let layout = Pagination::new(files, per_page);
            let pages = u32::try_from(layout.total_pages).context("Too many pages for one session")?;
            Ok((pages, Some(layout)))
        }
        (None, None) => bail!("Pass either --pages or --files"),
    }
}

/// Build from a complete session. The session is only discarded after the
/// result has been written, so a failed build can be retried.
fn finish_session(store: &dyn SessionBuffer, id: &str, options: &BuildOptions) -> Result<()> {
    let config = options.resolve_config()?;
    let entries = store.entries(id)?;
    run_build(normalize_entries(entries), &config, options.output.as_deref())?;
    store.discard(id)?;
    info!(session_id = id, "session finished");
    Ok(())
}

fn ttl_from_hours(hours: i64) -> Result<chrono::Duration> {
    if hours < 0 {
        bail!("--ttl-hours must not be negative, got {}", hours);
    }
    chrono::Duration::try_hours(hours).with_context(|| format!("--ttl-hours {} is out of range", hours))
}
