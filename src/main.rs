use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use file_analytics::analysis::AnalysisKind;
use file_analytics::config::ServiceConfig;
use file_analytics::ingestion::{extension_of, CompositeObserver, IngestionObserver, TracingObserver};
use file_analytics::metrics::UploadMetrics;
use file_analytics::service::Ingestor;
use file_analytics::storage::BackendKind;

#[derive(Parser, Debug)]
#[command(name = "file-analytics")]
#[command(about = "Upload CSV/Excel/JSON files and query their schema and statistics", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE", env = "FILE_ANALYTICS_CONFIG")]
    config: Option<PathBuf>,

    /// Print Prometheus metrics for this run to stderr when done
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest one or more files
    Upload {
        /// Files to upload
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Optional backend to also write to (repeatable)
        #[arg(short, long = "target")]
        targets: Vec<BackendKind>,
    },
    /// List stored files
    Files {
        #[arg(short, long, default_value = "primary")]
        backend: BackendKind,
    },
    /// Show one file from the primary store
    Show { id: i64 },
    /// Search stored files
    Search {
        query: String,
        #[arg(short, long, default_value = "primary")]
        backend: BackendKind,
    },
    /// Aggregate counts
    Stats {
        #[arg(short, long, default_value = "primary")]
        backend: BackendKind,
    },
    /// Delete one file from the primary store
    Delete { id: i64 },
    /// Probe backends (all of them unless one is given)
    Health {
        #[arg(short, long)]
        backend: Option<BackendKind>,
    },
    /// Analyze the stored preview of a file
    Analyze {
        id: i64,
        #[arg(short, long, default_value = "summary")]
        kind: AnalysisKind,
    },
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ServiceConfig::load(args.config.as_deref()).context("loading configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let metrics = UploadMetrics::new()?;
    let observers: Vec<Arc<dyn IngestionObserver>> = vec![Arc::new(TracingObserver), Arc::new(metrics.clone())];
    let ingestor = Ingestor::from_config(&config)
        .context("wiring storage backends")?
        .with_observer(Arc::new(CompositeObserver::new(observers)));

    let outcome = run(&ingestor, args.command);

    if args.metrics {
        eprint!("{}", metrics.render()?);
    }
    outcome
}

fn run(ingestor: &Ingestor, command: Command) -> Result<()> {
    match command {
        Command::Upload { paths, targets } => {
            let mut failed = 0usize;
            for path in &paths {
                let filename = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .with_context(|| format!("invalid file name: {}", path.display()))?;
                let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
                match ingestor.ingest(filename, &extension_of(path), &bytes, &targets) {
                    Ok(report) => print_json(&report)?,
                    Err(e) => {
                        failed += 1;
                        tracing::error!(path = %path.display(), status = e.http_status(), error = %e, "upload rejected");
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed} of {} uploads failed", paths.len());
            }
            Ok(())
        }
        Command::Files { backend } => print_json(&ingestor.list_files(backend)?),
        Command::Show { id } => print_json(&ingestor.get_file(id)?),
        Command::Search { query, backend } => print_json(&ingestor.search(backend, &query)?),
        Command::Stats { backend } => print_json(&ingestor.stats(backend)?),
        Command::Delete { id } => {
            let file = ingestor.delete_file(id)?;
            tracing::info!(id, filename = %file.filename, "file deleted");
            print_json(&file)
        }
        Command::Health { backend } => match backend {
            Some(backend) => print_json(&ingestor.health(backend)),
            None => print_json(&ingestor.health_all()),
        },
        Command::Analyze { id, kind } => print_json(&ingestor.analyze(id, kind)?),
    }
}
