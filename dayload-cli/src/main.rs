mod config;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use config::CliConfig;
use dayload::{DataLoader, FetchStatus, FileStore};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "dayload-cli")]
#[command(about = "dayload CLI - fetch and cache queries against a query endpoint", long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the query service base URL
    #[arg(short = 'u', long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one query and print its payload
    Fetch {
        query: String,
        /// Parameters as JSON (array or object)
        params: Option<String>,
    },
    /// Warm the cache for several queries
    Prefetch {
        #[arg(required = true)]
        queries: Vec<String>,
    },
    /// Show or change the daily refresh hour
    RefreshHour {
        #[arg(long)]
        set: Option<i64>,
    },
    /// Remove every cached entry
    ClearCache,
    /// Show when a query was cached and whether it is still fresh
    Inspect {
        query: String,
        params: Option<String>,
    },
}

fn parse_params(raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|s| serde_json::from_str(s).with_context(|| format!("Invalid params JSON: {}", s)))
        .transpose()
}

fn format_millis(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

async fn build_loader(config: &CliConfig) -> Result<DataLoader> {
    let storage = FileStore::open(config.file_store_config())
        .context("Failed to open cache storage")?;
    let loader = DataLoader::builder(config.loader.clone())
        .storage(Arc::new(storage))
        .build()
        .await?;
    Ok(loader)
}

async fn run(loader: &DataLoader, command: Command) -> Result<()> {
    let start = Instant::now();

    match command {
        Command::Fetch { query, params } => {
            let params = parse_params(params.as_deref())?;
            let response = loader.fetch_response(&query, params).await;
            match response.status {
                FetchStatus::Success => {
                    let data = response.data.unwrap_or(Value::Null);
                    info!("{}", serde_json::to_string_pretty(&data)?);
                }
                FetchStatus::Aborted => warn!("{}", "(aborted)".yellow()),
                FetchStatus::Error => {
                    anyhow::bail!(response.message.unwrap_or_else(|| "unknown error".into()))
                }
            }
        }
        Command::Prefetch { queries } => {
            loader.prefetch_all(&queries).await;
            let stats = loader.stats();
            info!(
                "{} {} fetched, {} cached, {} failed",
                "OK".green(),
                stats.misses,
                stats.memory_hits + stats.store_hits,
                stats.failures
            );
        }
        Command::RefreshHour { set } => {
            if let Some(hour) = set {
                loader.set_refresh_hour(hour).await?;
            }
            info!(
                "refresh hour: {} (current period started {})",
                loader.refresh_hour().to_string().bold(),
                loader.cache_store().period_start().format("%Y-%m-%d %H:%M")
            );
        }
        Command::ClearCache => {
            let removed = loader.clear_cache().await;
            info!("{} removed {} entries", "OK".green(), removed);
        }
        Command::Inspect { query, params } => {
            let params = parse_params(params.as_deref())?;
            let key = dayload::cache_key(&query, params.as_ref());
            let store = loader.cache_store();
            match store.entry_timestamp(&key).await {
                Some(ts) => {
                    let fresh = ts >= store.period_start_millis();
                    let state = if fresh { "fresh".green() } else { "stale".red() };
                    info!("{} cached at {} ({})", key, format_millis(ts), state);
                }
                None => info!("{} {}", key, "(not cached)".dimmed()),
            }
        }
    }

    info!("{}", format!("({:.2?})", start.elapsed()).dimmed());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CliConfig::from_file(path)?,
        None => CliConfig::default(),
    };
    if let Some(base_url) = args.base_url {
        config.loader.base_url = base_url;
    }

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level))
        .with_target(false)
        .init();

    let loader = build_loader(&config).await?;

    let result = tokio::select! {
        result = run(&loader, args.command) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, aborting outstanding requests");
            Ok(())
        }
    };
    loader.shutdown();

    if let Err(e) = result {
        error!(error = %e, "{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
    Ok(())
}
