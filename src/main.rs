//! Main entry point for the CLI command that submits queued telemetry.
use std::path::PathBuf;

use clap::Parser;
use usage_relay::config::Config;
use usage_relay::config::SendMode;
use usage_relay::worker::UsageReporter;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Records dequeued and submitted per report
    #[clap(long)]
    chunk_size: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt::fmt().json().init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }

    if config.send_tracing_mode == SendMode::Sync {
        tracing::info!("send mode is \"sync\", nothing to drain");
        return Ok(());
    }

    let mut reporter = UsageReporter::new(config)?;
    let drained = reporter.drain()?;
    tracing::info!(drained, "usage submission complete");

    Ok(())
}
