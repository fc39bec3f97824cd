//! Tick Archiver
//!
//! A tool for retrieving historical tick data over a partitioned date span,
//! normalizing each retrieved file with the instrument symbol, and
//! publishing the results to S3-compatible storage with idempotent resume.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tick_archiver::{
    partition, Config, DriverOptions, Granularity, PipelineDriver, RetrievalCli, S3Store,
    TransformStage,
};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "tick-archiver")]
#[command(about = "Fetch, normalize and publish historical tick data", long_about = None)]
struct Args {
    /// Path to the configuration YAML file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override the configured year (expands to a full calendar-year span)
    #[arg(long, value_name = "YEAR")]
    year: Option<i32>,

    /// Override the configured granularity (daily/monthly/quarterly/yearly)
    #[arg(long, value_name = "GRANULARITY")]
    granularity: Option<Granularity>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    info!("Loading configuration from {:?}", args.config);
    let mut config = Config::from_file(&args.config).context("Failed to load configuration")?;

    if let Some(year) = args.year {
        config.span = None;
        config.year = Some(year);
    }
    if let Some(granularity) = args.granularity {
        config.granularity = granularity;
    }

    // Config-level errors abort before any unit is attempted.
    config.validate().context("Invalid configuration")?;
    let span = config.resolve_span()?;
    let windows = partition::generate(span, config.granularity)?;
    info!(
        "Partitioned {} into {} {} windows for {} instruments",
        span,
        windows.len(),
        config.granularity,
        config.instruments.len()
    );

    // A stop request is honored between units, never mid-unit.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("stop requested, finishing the current unit before halting");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let fetcher = RetrievalCli::new(
        config.fetch.clone(),
        config.data_type.clone(),
        config.format.clone(),
        config.download_dir.clone(),
    );
    let transform = TransformStage::new(config.download_dir.clone());

    let store = if config.publish.enabled {
        let s3 = config
            .s3
            .clone()
            .context("publish.enabled requires an `s3` section")?;
        Some(
            S3Store::new(s3)
                .await
                .context("Failed to create S3 client")?,
        )
    } else {
        info!("Publishing disabled, normalized files stay in {}", config.download_dir);
        None
    };

    let options = DriverOptions {
        data_type: config.data_type.clone(),
        format: config.format.clone(),
        base_path: config
            .s3
            .as_ref()
            .and_then(|s3| s3.base_path.clone())
            .unwrap_or_default(),
        check_remote: config.publish.check_remote,
        delete_local: config.publish.delete_local,
    };

    let driver = PipelineDriver::new(fetcher, transform, store, options, stop);
    let summary = driver.run(&config.instruments, &windows).await;
    summary.log();

    info!("Processing completed");
    Ok(())
}
