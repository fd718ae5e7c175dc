//! storegate
//!
//! Replays newline-delimited JSON events through the interceptor pipeline
//! and prints every event that reaches the store as a JSON line.

mod config;
mod replay;
mod shutdown;

use clap::Parser;
use config::{ConfigLoader, Overrides};
use replay::{feed, stdout_store};
use shutdown::shutdown_signal;
use std::path::PathBuf;
use storegate_core::{Pipeline, spawn_pipeline};
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// storegate - debounce, shrink and batch state-mutation events
#[derive(Parser, Debug)]
#[command(name = "storegate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (defaults are used when omitted)
    #[arg(short, long, env = "STOREGATE_CONFIG")]
    config: Option<PathBuf>,

    /// File of newline-delimited JSON events (stdin when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Run error containment in development mode
    #[arg(long, default_value = "false")]
    dev: bool,

    /// Override how long to wait for held events after the input ends
    #[arg(long)]
    linger_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting storegate v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let overrides = Overrides {
        development: args.dev,
        linger_ms: args.linger_ms,
    };
    let loaded = ConfigLoader::new(args.config.as_deref(), overrides)
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;

    let linger = loaded.linger;
    let pipeline = Pipeline::new(stdout_store, loaded.pipeline)?;
    let (handle, task) = spawn_pipeline(pipeline);

    let replay = async {
        let summary = match &args.input {
            Some(path) => {
                let file = tokio::fs::File::open(path).await?;
                feed(&handle, BufReader::new(file)).await?
            }
            None => feed(&handle, BufReader::new(tokio::io::stdin())).await?,
        };
        tracing::info!(
            dispatched = summary.dispatched,
            skipped = summary.skipped,
            "Input exhausted, waiting {:?} for held events",
            linger
        );
        tokio::time::sleep(linger).await;
        Ok::<_, std::io::Error>(())
    };

    let result = tokio::select! {
        result = replay => result,
        _ = shutdown_signal() => Ok(()),
    };

    handle.dispose();
    task.await?;

    let stats = handle.stats();
    tracing::info!(
        received = stats.received,
        forwarded = stats.forwarded,
        coalesced = stats.coalesced,
        batched = stats.batched,
        truncated = stats.truncated,
        optimized = stats.optimized,
        errors = stats.errors,
        "Pipeline disposed"
    );

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
///
/// Logs go to stderr; stdout carries the applied events.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
