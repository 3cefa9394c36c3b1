use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use toptabs_catalog::{FileSnapshotStore, SnapshotStore};
use toptabs_common::Config;

mod merge_raw;

#[derive(Parser)]
#[command(name = "toptabs", about = "Deduplicated catalog of top guitar tabs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh the cached catalog from the live listings.
    Scrape {
        /// Rebuild even if the cached snapshot is still fresh.
        #[arg(long)]
        force: bool,
    },
    /// Merge raw row dumps into a single snapshot.
    MergeRaw {
        /// Directory of `*.json` row arrays [default: <data dir>/raw]
        #[arg(long)]
        raw_dir: Option<PathBuf>,
        /// Output snapshot path [default: the cache file]
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show whether the cached snapshot is fresh.
    Status {
        #[arg(long)]
        max_age_hours: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("toptabs=info".parse()?);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;

    match cli.command {
        Command::Scrape { force } => {
            let refresher = toptabs_scraper::build_refresher(&config)?;
            let outcome = refresher.refresh(force).await?;
            let meta = &outcome.snapshot.meta;
            if outcome.reused {
                println!("Cache is fresh: {} rows from {}", meta.row_count, meta.scraped_at);
            } else {
                println!("Scraped {} rows at {}", meta.row_count, meta.scraped_at);
                if !outcome.failed_listings.is_empty() {
                    println!("Skipped {} listings:", outcome.failed_listings.len());
                    for url in &outcome.failed_listings {
                        println!("  {url}");
                    }
                }
            }
            println!("{}", config.cache_path().display());
        }
        Command::MergeRaw { raw_dir, out } => {
            let raw_dir = raw_dir.unwrap_or_else(|| config.raw_dir());
            let out = out.unwrap_or_else(|| config.cache_path());
            let report = merge_raw::merge_raw(&raw_dir, &out)?;
            println!(
                "Wrote {} with {} rows (from {} files).",
                report.out.display(),
                report.rows,
                report.files
            );
        }
        Command::Status { max_age_hours } => {
            let max_age = max_age_hours.unwrap_or(config.max_age_hours);
            let store = FileSnapshotStore::new(config.cache_path());
            match store.scraped_at() {
                None => println!("No usable snapshot at {}", store.location()),
                Some(scraped_at) => {
                    let age = Utc::now().signed_duration_since(scraped_at);
                    let fresh = store.is_fresh(max_age);
                    println!(
                        "{}: {} (scraped {}, {:.1}h ago, max age {max_age}h)",
                        store.location(),
                        if fresh { "fresh" } else { "stale" },
                        scraped_at,
                        age.num_seconds() as f64 / 3600.0,
                    );
                    if let Ok(Some(snapshot)) = store.load() {
                        println!("{}", serde_json::to_string_pretty(&snapshot.meta)?);
                    }
                }
            }
        }
    }

    Ok(())
}
