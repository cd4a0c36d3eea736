use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use rssagg::config::Config;
use rssagg::feed::HttpFetcher;
use rssagg::scraper::Scheduler;
use rssagg::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(name = "rssagg", about = "Poll RSS feeds and store new posts")]
struct Args {
    /// Config file (TOML). Missing file means defaults.
    #[arg(long, value_name = "FILE", default_value = "rssagg.toml")]
    config: PathBuf,

    /// SQLite database path (overrides config)
    #[arg(long, value_name = "PATH")]
    database: Option<String>,

    /// Feeds fetched concurrently per tick (overrides config)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Seconds between ticks (overrides config)
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(database) = &self.database {
            config.database_path = database.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(interval) = self.interval {
            config.interval_seconds = interval;
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rssagg=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    // One connection per concurrent pipeline run plus one for the driver
    let pool_size = u32::try_from(config.concurrency.saturating_add(1)).unwrap_or(u32::MAX);
    let db = match Database::open_with(&config.database_path, pool_size).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            anyhow::bail!(
                "Database {} is locked. Is another rssagg instance running?",
                config.database_path
            );
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .build()
        .context("Failed to build HTTP client")?;
    let fetcher = HttpFetcher::new(client)
        .with_timeout(config.fetch_timeout())
        .with_max_bytes(config.max_feed_bytes)
        .with_host_policy(config.host_policy());

    tracing::info!(
        database = %config.database_path,
        concurrency = config.concurrency,
        interval_seconds = config.interval_seconds,
        "Starting rssagg"
    );

    let handle = Scheduler::new(Arc::new(db), Arc::new(fetcher), config.scheduler_config()).start();

    shutdown_signal()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested, waiting for running batch");
    handle.shutdown().await;

    Ok(())
}
