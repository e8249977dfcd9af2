//! Announcement watcher — binary entrypoint.
//! Loads config, wires the file-backed stores and the HTTP feed, then polls
//! until interrupted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use announcement_watcher::{Poller, WatcherConfig};

#[derive(Parser, Debug)]
#[command(name = "announcement-watcher")]
#[command(about = "Poll the announcement feed and record new items to CSV")]
#[command(version)]
struct Cli {
    /// Backfill depth: pages N-1..1 are replayed before live polling (0 or 1 = none)
    #[arg(default_value_t = 1)]
    from_page: u32,

    /// Config file (TOML or JSON); falls back to $WATCHER_CONFIG_PATH and config/
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Compact logs by default, JSON lines when LOG_FORMAT=json.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("announcement_watcher=info,watcher=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = WatcherConfig::load(cli.config.as_deref()).context("loading watcher config")?;
    info!(
        records = %cfg.records_path.display(),
        watermark = %cfg.watermark_path.display(),
        pause_secs = cfg.pause_secs,
        hits_per_page = cfg.hits_per_page,
        "watcher config loaded"
    );

    if let Some(addr) = cfg.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing prometheus exporter")?;
        info!(%addr, "metrics listener started");
    }

    let poller = Poller::from_config(&cfg).context("building poller")?;
    poller.run_until(cli.from_page, shutdown_signal()).await;

    info!("watcher stopped");
    Ok(())
}
