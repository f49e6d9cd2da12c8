//! sparkify-lake: builds the Sparkify star schema from raw song and event
//! logs and writes it as partitioned Parquet.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use sparkify_lake::error::{AddressParseSnafu, ConfigSnafu, MetricsSnafu, PipelineError};
use sparkify_lake::{Config, metrics, plan, run_pipeline};

/// Song and event logs to a Parquet star schema.
#[derive(Parser, Debug)]
#[command(name = "sparkify-lake")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "etl.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration and list inputs without writing.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("sparkify-lake starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    let metrics_handle = if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        let handle = metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
        Some(handle)
    } else {
        None
    };

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        let plan = plan(&config).await?;
        info!("Source: {}", config.input.path);
        info!("  Song files: {}", plan.song_files.len());
        info!("  Log files: {}", plan.log_files.len());
        info!("Tables:");
        for table in &plan.tables {
            info!("  - {}", table);
        }
        info!("Configuration is valid");
        return Ok(());
    }

    let stats = run_pipeline(config).await?;

    info!("Pipeline completed successfully");
    info!(
        "  Song files: {} ({} records)",
        stats.song_files, stats.song_records
    );
    info!(
        "  Log files: {} ({} records, {} song plays)",
        stats.log_files, stats.log_records, stats.song_play_events
    );
    for (table, written) in &stats.tables {
        info!(
            "  Table {}: {} rows, {} files, {} partitions",
            table, written.rows, written.files, written.partitions
        );
    }
    info!("  Bytes written: {}", stats.bytes_written());

    if let Some(handle) = metrics_handle {
        debug!("Final metrics snapshot:\n{}", handle.render());
    }

    Ok(())
}
