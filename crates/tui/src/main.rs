mod app;
mod renderer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ledger_feed_core::{FeedConfig, FeedController, MemorySource};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Browse customer, vendor and transaction ledgers page by page.
#[derive(Debug, Parser)]
#[command(name = "ledger-feed", version)]
struct Args {
    /// JSON fixture: an object mapping lane names to record pages.
    fixture: PathBuf,

    /// TOML engine config (page size, scroll threshold, lanes).
    #[arg(long, env = "LEDGER_FEED_CONFIG")]
    config: Option<PathBuf>,

    /// Simulated network latency per page request.
    #[arg(long, default_value_t = 250)]
    latency_ms: u64,

    /// Where to write logs; the terminal itself is taken by the UI.
    #[arg(long, default_value = "ledger-feed.log")]
    log_file: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file)?;

    let config = match &args.config {
        Some(path) => FeedConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FeedConfig::default(),
    };

    let data = std::fs::read(&args.fixture)
        .with_context(|| format!("reading fixture {}", args.fixture.display()))?;
    let fixture: serde_json::Value = serde_json::from_slice(&data)
        .with_context(|| format!("parsing fixture {}", args.fixture.display()))?;
    let source = MemorySource::from_fixture(&fixture)?
        .with_latency(Duration::from_millis(args.latency_ms));

    let feed = Arc::new(FeedController::new(source, config)?);
    tracing::info!(lanes = ?feed.lane_ids(), page_size = feed.page_size(), "feed ready");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
        .context("starting async runtime")?;

    let mut app = app::App::new(Arc::clone(&feed), runtime.handle().clone());
    app.start();
    renderer::run_tui(&mut app)?;
    app.shutdown();
    Ok(())
}

fn init_logging(path: &Path) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    Ok(())
}
