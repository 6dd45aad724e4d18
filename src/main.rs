use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use url::Url;

use podingest::{
    FsObjectStore, GcsObjectStore, IngestOptions, IngestRequest, IngestResponse, IngestSummary,
    Ingestor,
    MemoryObjectStore, MemoryTabularStore, NoopReporter, ObjectStore, PodcastCatalog,
    ProgressEvent, ProgressReporter, ReqwestClient, SharedProgressReporter, SqliteTabularStore,
    TabularStore, Timeouts,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static TRANSFER: Emoji<'_, '_> = Emoji("📤 ", "[^] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static BUCKET: Emoji<'_, '_> = Emoji("🪣 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Ingest podcast episodes into object storage and a metadata database
#[derive(Parser, Debug)]
#[command(name = "podingest")]
#[command(about = "Ingest podcast episodes into object storage and a metadata database")]
#[command(version)]
struct Args {
    /// Podcast name as configured in the podcast table
    podcast_name: String,

    /// Number of newest feed entries to consider
    #[arg(
        short = 'n',
        long,
        default_value = "1",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    episodes: u64,

    /// JSON table mapping podcast names to feed URLs
    #[arg(long, env = "PODINGEST_PODCASTS", default_value = "config/podcasts.json")]
    podcasts: PathBuf,

    /// Bucket receiving the audio objects
    #[arg(short, long, env = "PODINGEST_BUCKET")]
    bucket: String,

    /// Store audio below this directory instead of Google Cloud Storage
    #[arg(long, env = "PODINGEST_STORE_DIR", conflicts_with = "gcs_token")]
    store_dir: Option<PathBuf>,

    /// OAuth2 access token for Google Cloud Storage
    #[arg(long, env = "PODINGEST_GCS_TOKEN", hide_env_values = true)]
    gcs_token: Option<String>,

    /// Alternative Google Cloud Storage endpoint, e.g. an emulator
    #[arg(long, requires = "gcs_token")]
    gcs_endpoint: Option<Url>,

    /// SQLite database for metadata rows (in-memory when omitted)
    #[arg(long, env = "PODINGEST_DATABASE")]
    database: Option<PathBuf>,

    /// Seconds allowed for fetching the feed
    #[arg(long, default_value = "10")]
    fetch_timeout: u64,

    /// Seconds allowed without data from an audio source
    #[arg(long, default_value = "30")]
    download_timeout: u64,

    /// Seconds allowed for storing one audio object
    #[arg(long, default_value = "300")]
    upload_timeout: u64,

    /// Overall budget in seconds; episodes not started in time are left for the next run
    #[arg(long)]
    deadline: Option<u64>,

    /// Maximum number of concurrent transfers
    #[arg(short = 'c', long, default_value = "1")]
    concurrent: usize,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Print the response payload as JSON
    #[arg(long)]
    json: bool,
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap();

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
        }
    }

    fn get_or_create_bar(&self, slot: usize) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap();

        if let Some(bar) = bars.get(&slot) {
            return bar.clone();
        }

        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {TRANSFER}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .unwrap()
            .progress_chars("█▓░");

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(style);
        bars.insert(slot, bar.clone());
        bar
    }

    fn finish_bar(&self, slot: usize) {
        let mut bars = self.bars.lock().unwrap();
        if let Some(bar) = bars.remove(&slot) {
            bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { podcast, url } => {
                self.main_bar.set_message(format!(
                    "{SEARCH}Fetching feed for {}: {}",
                    podcast.bold(),
                    url.cyan()
                ));
            }

            ProgressEvent::FeedParsed {
                feed_title,
                total_episodes,
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} • {} episodes in feed",
                    feed_title.bold().green(),
                    total_episodes.to_string().cyan()
                ));
            }

            ProgressEvent::ShowResolved {
                show_title, is_new, ..
            } => {
                let state = if is_new { "new show" } else { "known show" };
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} ({})",
                    show_title.bold().green(),
                    state.dimmed()
                ));
            }

            ProgressEvent::PlanReady {
                to_ingest,
                already_present,
                ..
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} new, {} already stored",
                    to_ingest.to_string().yellow(),
                    already_present.to_string().cyan()
                ));
            }

            ProgressEvent::TransferStarting {
                slot,
                episode_title,
                episode_index,
                total_to_ingest,
                content_length,
            } => {
                let bar = self.get_or_create_bar(slot);
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(format!(
                    "[{}/{}] {}",
                    (episode_index + 1).to_string().cyan(),
                    total_to_ingest.to_string().cyan(),
                    truncate_title(&episode_title, 40)
                ));
            }

            ProgressEvent::TransferProgress {
                slot,
                bytes_transferred,
                total_bytes,
                ..
            } => {
                let bar = self.get_or_create_bar(slot);
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_transferred);
            }

            ProgressEvent::EpisodeStored {
                slot,
                episode_title,
                file_size,
                ..
            } => {
                let bar = self.get_or_create_bar(slot);
                bar.set_position(file_size);
                self.multi
                    .println(format!(
                        "  {SUCCESS}{}",
                        truncate_title(&episode_title, 60).green()
                    ))
                    .ok();
                self.finish_bar(slot);
            }

            ProgressEvent::EpisodeFailed {
                slot,
                episode_title,
                stage,
                error,
            } => {
                self.multi
                    .println(format!(
                        "  {FAILURE}{} - {} failed: {}",
                        truncate_title(&episode_title, 30).red(),
                        stage,
                        error.red()
                    ))
                    .ok();
                self.finish_bar(slot);
            }

            ProgressEvent::EpisodeNotAttempted { episode_title } => {
                self.multi
                    .println(format!(
                        "  {CROSS}{} {}",
                        truncate_title(&episode_title, 40).yellow(),
                        "(deadline passed)".dimmed()
                    ))
                    .ok();
            }

            ProgressEvent::IngestCompleted {
                processed,
                skipped,
                failed,
                not_attempted,
            } => {
                self.main_bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} stored, {} skipped, {} failed, {} not attempted",
                    "Ingest complete:".bold().green(),
                    processed.to_string().green().bold(),
                    skipped.to_string().yellow(),
                    if failed > 0 {
                        failed.to_string().red().bold()
                    } else {
                        failed.to_string().green()
                    },
                    not_attempted.to_string().dimmed()
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn object_store(args: &Args) -> Result<Arc<dyn ObjectStore>> {
    if let Some(token) = &args.gcs_token {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(args.fetch_timeout))
            .build()
            .context("Failed to build storage client")?;
        let mut store = GcsObjectStore::new(client, token.clone());
        if let Some(endpoint) = &args.gcs_endpoint {
            store = store.with_endpoint(endpoint.clone());
        }
        return Ok(Arc::new(store));
    }

    if let Some(dir) = &args.store_dir {
        return Ok(Arc::new(FsObjectStore::new(dir)));
    }

    warn!("no --store-dir or --gcs-token given, audio is kept in memory only");
    Ok(Arc::new(MemoryObjectStore::new()))
}

async fn tabular_store(args: &Args) -> Result<Arc<dyn TabularStore>> {
    match &args.database {
        Some(path) => {
            let store = SqliteTabularStore::open(path)
                .await
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("no --database given, metadata is kept in memory only");
            Ok(Arc::new(MemoryTabularStore::new()))
        }
    }
}

/// Build the collaborators for `args` and run one request
///
/// The podcast name is checked against the table before any store is
/// opened, so an unknown podcast touches neither storage nor network.
async fn run(args: &Args, reporter: SharedProgressReporter) -> Result<IngestSummary> {
    let podcasts = PodcastCatalog::load(&args.podcasts).context("Failed to load podcast table")?;
    podcasts
        .require(&args.podcast_name)
        .context("Failed to ingest podcast")?;

    let timeouts = Timeouts {
        fetch: Duration::from_secs(args.fetch_timeout),
        download: Duration::from_secs(args.download_timeout),
        upload: Duration::from_secs(args.upload_timeout),
    };
    let options = IngestOptions {
        bucket: args.bucket.clone(),
        max_concurrent: args.concurrent.max(1),
        timeouts,
    };

    let client = ReqwestClient::with_timeouts(timeouts.fetch, timeouts.download)
        .context("Failed to build HTTP client")?;
    let objects = object_store(args)?;
    let tables = tabular_store(args).await?;

    let ingestor = Ingestor::new(podcasts, options, Arc::new(client), objects, tables, reporter);

    let mut request = IngestRequest::new(args.podcast_name.clone(), args.episodes as usize);
    if let Some(secs) = args.deadline {
        request = request.with_deadline(tokio::time::Instant::now() + Duration::from_secs(secs));
    }

    ingestor
        .ingest(&request)
        .await
        .context("Failed to ingest podcast")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let show_progress = !args.quiet && !args.json;

    // Progress bars own the terminal; only warnings get through unless RUST_LOG says otherwise
    init_tracing(if show_progress { "warn" } else { "info" });

    if show_progress {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podingest".bold().magenta(),
            "- Podcast Ingestion".dimmed()
        );
    }

    let reporter: SharedProgressReporter = if show_progress {
        Arc::new(IndicatifReporter::new())
    } else {
        NoopReporter::shared()
    };

    let summary = match run(&args, reporter).await {
        Ok(summary) => summary,
        Err(e) if args.json => {
            println!("{}", serde_json::json!({ "error": format!("{e:#}") }));
            std::process::exit(1);
        }
        Err(e) => return Err(e),
    };

    if args.json {
        println!("{}", serde_json::to_string(&IngestResponse::from(&summary))?);
    } else if !args.quiet {
        if !summary.failed.is_empty() {
            println!("\n{}", "Failed episodes:".red().bold());
            for failure in &summary.failed {
                println!(
                    "  {}{} - {}",
                    CROSS,
                    failure.title.yellow(),
                    failure.reason.dimmed()
                );
            }
        }

        println!(
            "\n{BUCKET}Bucket: {}\n{}",
            args.bucket.cyan(),
            summary.message()
        );
    }

    if summary.all_failed() {
        std::process::exit(1);
    }

    Ok(())
}
