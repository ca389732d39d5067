//! gridmap-dd (Datadump) - Main entry point
//!
//! Imports a unified connection document into a network, replacing the
//! previous import, or exports a network back to that document shape.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gridmap_common::config::{CliOverrides, Settings, TomlConfig};
use gridmap_common::db::init::init_database;
use gridmap_dd::{
    DisabledJobQueue, ExportService, FlowerJobQueue, ImportService, JobQueue, UnifiedDocument,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Command-line arguments for gridmap-dd
#[derive(Parser, Debug)]
#[command(name = "gridmap-dd")]
#[command(about = "Import and export grid connection requests and scenarios")]
#[command(version)]
struct Args {
    /// TOML configuration file (default: XDG config dir, then /etc/gridmap)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Task queue monitor base URL used to revoke compute jobs
    #[arg(long)]
    job_queue_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace a network's connection requests and scenarios
    Import {
        #[arg(long)]
        net_id: Uuid,

        /// Unified document (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Match records without a known bus to the nearest bus within this many meters
        #[arg(long)]
        max_bus_distance: Option<f64>,
    },
    /// Write a network's unified document
    Export {
        #[arg(long)]
        net_id: Uuid,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write a network's records flattened for analytics
    ExportFlat {
        #[arg(long)]
        net_id: Uuid,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let max_bus_distance_m = match &args.command {
        Command::Import {
            max_bus_distance, ..
        } => *max_bus_distance,
        _ => None,
    };
    let cli = CliOverrides {
        database_path: args.database.clone(),
        max_bus_distance_m,
        job_queue_url: args.job_queue_url.clone(),
    };

    let file_config =
        TomlConfig::load(args.config.as_deref()).context("Failed to load configuration file")?;
    let settings = Settings::resolve(&cli, &file_config).context("Invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_level.as_str().into()),
        )
        .with_writer(io::stderr)
        .init();

    info!(
        "Starting gridmap datadump (gridmap-dd) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Database path: {}", settings.database_path.display());

    let pool = init_database(&settings.database_path)
        .await
        .context("Failed to open database")?;

    match args.command {
        Command::Import { net_id, input, .. } => {
            let document = read_document(&input)?;

            let queue: Arc<dyn JobQueue> = match &settings.job_queue_url {
                Some(url) => {
                    info!("Compute jobs revoked through {}", url);
                    Arc::new(FlowerJobQueue::new(url)?)
                }
                None => Arc::new(DisabledJobQueue),
            };

            let stats = ImportService::new(pool, queue)
                .import_unified(net_id, &document, settings.max_bus_distance_m)
                .await
                .with_context(|| format!("Import into network {} failed", net_id))?;

            write_json(None, &stats)?;
        }
        Command::Export { net_id, output } => {
            let document = ExportService::new(pool)
                .export_unified(net_id)
                .await
                .with_context(|| format!("Export of network {} failed", net_id))?;

            write_json(output.as_deref(), &document)?;
        }
        Command::ExportFlat { net_id, output } => {
            let items = ExportService::new(pool)
                .export_flat(net_id)
                .await
                .with_context(|| format!("Flat export of network {} failed", net_id))?;

            write_json(output.as_deref(), &items)?;
        }
    }

    Ok(())
}

fn read_document(path: &Path) -> Result<UnifiedDocument> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("{} is not a unified connection document", path.display()))
}

/// Pretty-printed JSON to `path`, or stdout when `None`
fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let mut writer: Box<dyn Write> = match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    serde_json::to_writer_pretty(&mut writer, value).context("Failed to serialize output")?;
    writeln!(writer)?;
    writer.flush()?;

    if let Some(path) = path {
        info!("Wrote {}", path.display());
    }
    Ok(())
}
