mod capture;
mod change;
mod parser;
mod record;
mod session;
mod settings;
mod store;
mod sync;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use capture::browserless::BrowserlessClient;
use settings::{Backend, Settings};
use store::{AdStore, FileStore, SqliteStore};
use sync::{FullCapture, FullOptions, IncrementalSync};

const EVENT_BUFFER: usize = 64;
const SQLITE_FILE: &str = "ads.sqlite";

#[derive(Parser)]
#[command(name = "adlib_sync", about = "Capture and sync ads from the Facebook Ads Library")]
struct Cli {
    /// Storage backend (overrides ADLIB_BACKEND)
    #[arg(long, global = true)]
    backend: Option<Backend>,
    /// Data directory (overrides ADLIB_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture every ad for a page through a headless browser
    Capture {
        page_id: String,
        /// Stop after this many distinct ads
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Refresh a previously captured page, saving only new or changed ads
    Sync { page_id: String },
    /// Process GraphQL responses from a browser HAR export
    Replay {
        har: PathBuf,
        /// Incremental sync of this page instead of a full capture
        #[arg(long)]
        page_id: Option<String>,
        /// Stop after this many distinct ads (full capture only)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show per-page sync metadata
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load()?;
    if let Some(backend) = cli.backend {
        settings.backend = backend;
    }
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }
    let mut store = open_store(&settings)?;

    let result = match cli.command {
        Commands::Capture { page_id, limit } => {
            let (producer, rx) = spawn_browser_capture(&settings, &page_id)?;
            let opts = FullOptions {
                max_ads: limit,
                max_idle_probes: settings.max_idle_probes,
            };
            let s = sync::run_full(rx, producer, store.as_mut(), opts).await?;
            println!(
                "Captured {} ads across {} pages ({} new, {} changed, {} unchanged, {} rejected).",
                s.total, s.pages, s.new, s.changed, s.unchanged, s.rejected
            );
            Ok(())
        }
        Commands::Sync { page_id } => {
            let (producer, rx) = spawn_browser_capture(&settings, &page_id)?;
            let s = sync::run_incremental(rx, producer, store.as_mut(), &page_id).await?;
            println!(
                "Page {}: {} ads seen, {} updated ({} new, {} changed, {} rejected).",
                s.page_id,
                s.seen,
                s.updated(),
                s.new,
                s.changed,
                s.rejected
            );
            Ok(())
        }
        Commands::Replay { har, page_id, limit } => replay(&har, page_id, limit, store.as_mut()),
        Commands::Stats => {
            let pages = store.list_pages()?;
            if pages.is_empty() {
                println!("No pages synced yet. Run 'capture' first.");
                return Ok(());
            }
            println!("{:<20} | {:>7} | {:<25}", "Page", "Ads", "Last synced");
            println!("{}", "-".repeat(58));
            for p in &pages {
                println!(
                    "{:<20} | {:>7} | {:<25}",
                    p.page_id,
                    p.total_ads,
                    p.last_synced.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            println!("\n{} pages", pages.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_store(settings: &Settings) -> Result<Box<dyn AdStore>> {
    Ok(match settings.backend {
        Backend::Files => Box::new(FileStore::open(&settings.data_dir)?),
        Backend::Sqlite => Box::new(SqliteStore::open(&settings.data_dir.join(SQLITE_FILE))?),
    })
}

fn spawn_browser_capture(
    settings: &Settings,
    page_id: &str,
) -> Result<(sync::Producer, mpsc::Receiver<capture::CaptureEvent>)> {
    let client = BrowserlessClient::new(
        &settings.browserless_url,
        settings.browserless_token.as_deref(),
        settings.request_timeout(),
    )?;
    let opts = settings.capture_options();
    let page_id = page_id.to_string();
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let producer = tokio::spawn(async move { client.capture_page(&page_id, &opts, tx).await });
    Ok((producer, rx))
}

/// Offline run over a HAR export. Parsing is pure and runs in parallel;
/// results are applied in file order so the outcome matches a live run.
fn replay(
    har: &std::path::Path,
    page_id: Option<String>,
    limit: Option<usize>,
    store: &mut dyn AdStore,
) -> Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let responses = capture::har::read_responses(har)?;
    if responses.is_empty() {
        println!("No GraphQL responses in {}.", har.display());
        return Ok(());
    }

    let pb = ProgressBar::new(responses.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let now = chrono::Utc::now();
    let parsed: Vec<_> = responses
        .par_iter()
        .map(|r| parser::process_response(r, now))
        .collect();

    match page_id {
        Some(page_id) => {
            let mut sync = IncrementalSync::new(store, &page_id);
            for p in parsed {
                sync.ingest(p)?;
                pb.inc(1);
            }
            pb.finish_and_clear();
            let s = sync.finish(chrono::Utc::now())?;
            println!(
                "Page {}: {} ads seen, {} updated ({} new, {} changed, {} rejected).",
                s.page_id,
                s.seen,
                s.updated(),
                s.new,
                s.changed,
                s.rejected
            );
        }
        None => {
            let mut full = FullCapture::new(FullOptions {
                max_ads: limit,
                ..Default::default()
            });
            for p in parsed {
                pb.inc(1);
                if full.ingest(p) == sync::Control::Stop {
                    break;
                }
            }
            pb.finish_and_clear();
            let s = full.finish(store, chrono::Utc::now())?;
            println!(
                "Captured {} ads across {} pages ({} new, {} changed, {} unchanged, {} rejected).",
                s.total, s.pages, s.new, s.changed, s.unchanged, s.rejected
            );
        }
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
