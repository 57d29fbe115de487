//! seriescache CLI
//!
//! Operator tooling over the cache: resolve a window, inspect what a query
//! would fetch, show index statistics.

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use seriescache::cache::{FetchConfig, FetchOrchestrator, Payload, SeriesCache};
use seriescache::config::{generate_default_config, Config, LoggingConfig};
use seriescache::remote::{RestConfig, RestSource, StaticCatalog};
use seriescache::storage::BlobStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "seriescache")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Local interval cache in front of a remote time-series server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the cache data directory
    #[arg(long, global = true)]
    pub data_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a window, fetching whatever is not cached
    Get {
        /// Series (parameter) id
        series: String,
        /// Window start, ISO 8601 (UTC if no offset)
        #[arg(value_parser = parse_time)]
        start: DateTime<Utc>,
        /// Window stop, inclusive
        #[arg(value_parser = parse_time)]
        stop: DateTime<Utc>,
        /// Print every row
        #[arg(long)]
        rows: bool,
    },

    /// Show cached and missing parts of a window without fetching
    Plan {
        series: String,
        #[arg(value_parser = parse_time)]
        start: DateTime<Utc>,
        #[arg(value_parser = parse_time)]
        stop: DateTime<Utc>,
    },

    /// Show index statistics
    Stats,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("Failed to write {:?}", path))?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.cache.data_dir = data_dir;
    }

    init_logging(&config.logging);
    tracing::info!("seriescache v{}", env!("CARGO_PKG_VERSION"));

    let orchestrator = Arc::new(open(&config)?);
    let saver = config
        .cache
        .save_interval()
        .map(|every| orchestrator.start_background_save(every));

    let result = run(&orchestrator, cli.command).await;

    // Always persist what was fetched, even when the command failed
    let saved = orchestrator.shutdown().await;
    if let Some(handle) = saver {
        handle.abort();
    }

    result?;
    saved.context("Failed to save cache index")?;
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("seriescache={}", logging.level)));
    let json = logging.format.eq_ignore_ascii_case("json");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

fn open(config: &Config) -> anyhow::Result<FetchOrchestrator> {
    let index_path = config.cache.index_path();
    tracing::info!("Cache index: {:?}", index_path);

    let cache = Arc::new(
        SeriesCache::open(&index_path)
            .with_context(|| format!("Failed to open cache index {:?}", index_path))?,
    );
    let store = Arc::new(BlobStore::new(config.cache.blob_dir())?);
    let remote = Arc::new(
        RestSource::new(RestConfig::from(&config.remote)).context("Failed to build HTTP client")?,
    );

    let mut orchestrator =
        FetchOrchestrator::new(remote, store, cache, FetchConfig::from(&config.fetch));
    if !config.catalog.is_empty() {
        let catalog = StaticCatalog::from_entries(&config.catalog).context("Invalid [[catalog]]")?;
        tracing::info!("Catalog: {} series", catalog.len());
        orchestrator = orchestrator.with_catalog(Arc::new(catalog));
    }
    Ok(orchestrator)
}

async fn run(orchestrator: &FetchOrchestrator, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Get {
            series,
            start,
            stop,
            rows,
        } => {
            let fetched = match orchestrator.resolve(&series, start, stop).await {
                Ok(rows) => rows,
                Err(e) => {
                    if e.is_remote() {
                        tracing::warn!(
                            "Remote source failed for {}; windows fetched before the failure stay cached",
                            series
                        );
                    }
                    return Err(e).with_context(|| format!("Failed to resolve {}", series));
                }
            };

            if rows {
                for row in &fetched {
                    let values: Vec<String> = row.values.iter().map(|v| v.to_string()).collect();
                    println!(
                        "{} {}",
                        row.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                        values.join(" ")
                    );
                }
            } else {
                match (fetched.first(), fetched.last()) {
                    (Some(first), Some(last)) => println!(
                        "{}: {} rows, {} .. {}",
                        series,
                        fetched.len(),
                        first.timestamp,
                        last.timestamp
                    ),
                    _ => println!("{}: no data", series),
                }
            }
        }

        Commands::Plan {
            series,
            start,
            stop,
        } => {
            let lookup = orchestrator.plan(&series, start, stop)?;
            println!("Cached:");
            for hit in &lookup.hits {
                let kind = match &hit.payload {
                    Payload::Stored(payload) => payload.to_string(),
                    Payload::Empty => "empty".to_string(),
                };
                println!("  {} ({})", hit.range, kind);
            }
            println!("To fetch:");
            for gap in &lookup.gaps {
                println!("  {}", gap);
            }
        }

        Commands::Stats => {
            let cache = orchestrator.cache();
            println!("{}", cache.stats()?);
            for series in cache.series_ids()? {
                println!("  {}", series);
            }
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("Invalid time {:?}. Use ISO 8601, e.g. 2006-01-08T00:00:00", s))
}
