//! superstock-scan: weekly base-breakout scan of the US small/mid-cap universe.
//!
//! Builds the universe from NASDAQ, S&P 400 and S&P 600 (or `--symbols`),
//! screens two years of weekly bars per ticker, writes one CSV per non-empty
//! tier and mails the ticker lists.
//!
//! Usage:
//!   cargo run -p scan-runner --release
//!   cargo run -p scan-runner -- --symbols AAPL,PLUG,SOFI --no-notify
//!   cargo run -p scan-runner -- --out-dir /srv/scans --max-concurrent-lots 3

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use market_data::{default_sources, YahooFinanceClient};
use notification_service::{Alert, Attachment, NotificationConfig, NotificationService};
use report_export::CsvExporter;
use screener::{ScreenPipeline, StaticSource};
use screener_core::{ListingSource, ScanReport, ScreenOverrides};
use std::path::PathBuf;
use std::sync::Arc;

use cli::Cli;

const DEFAULT_LOG_FILTER: &str = "superstock_scan=info,screener=info,market_data=warn";

fn init_tracing(json: bool) {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}

fn listing_sources(symbols: &[String]) -> Vec<Arc<dyn ListingSource>> {
    if symbols.is_empty() {
        default_sources()
    } else {
        vec![Arc::new(StaticSource::new("cli", symbols.to_vec()))]
    }
}

async fn notify(service: &NotificationService, alert: Alert) {
    if service.is_empty() {
        return;
    }
    let delivered = service.send_alert_async(&alert).await;
    if delivered == 0 {
        tracing::warn!("Scan notification was not delivered on any channel");
    }
}

fn completion_alert(report: &ScanReport, written: &[PathBuf]) -> Alert {
    written.iter().fold(Alert::scan_completed(report), |alert, path| {
        match Attachment::csv_from_path(path) {
            Ok(attachment) => alert.with_attachment(attachment),
            Err(e) => {
                tracing::warn!("Sending without attachment: {}", e);
                alert
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let json_logging = cli.json_logs
        || std::env::var("RUST_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
    init_tracing(json_logging);

    let env_overrides =
        ScreenOverrides::from_env().context("Invalid SCREEN_* environment variable")?;
    let config = cli
        .screen_config(env_overrides)
        .context("Invalid screen configuration")?;

    tracing::info!("Starting superstock scan");
    tracing::info!(
        "  Price {}-{}, min weekly volume {}, base <= {}% over {} weeks, SMA {}",
        config.price_min,
        config.price_max,
        config.min_weekly_volume,
        config.base_max_range_pct,
        config.base_weeks,
        config.sma_window
    );

    let notifier = if cli.no_notify {
        NotificationService::with_channels(Vec::new())
    } else {
        NotificationService::new(&NotificationConfig::from_env())
    };

    let sources = listing_sources(&cli.symbols);
    let provider = Arc::new(YahooFinanceClient::from_env());
    let pipeline = ScreenPipeline::new(provider, config).context("Invalid screen configuration")?;

    let report = pipeline.run_with_sources(&sources).await;

    tracing::info!(
        "Superstocks ({}): {}",
        report.result.superstock_count(),
        report.result.superstock_tickers()
    );
    tracing::info!(
        "Watchlist ({}): {}",
        report.result.watchlist_count(),
        report.result.watchlist_tickers()
    );

    let exporter = CsvExporter::new(&cli.out_dir);
    let written = match exporter.export(&report.result) {
        Ok(written) => written,
        Err(e) => {
            notify(&notifier, Alert::scan_failed(e.to_string())).await;
            return Err(e).with_context(|| {
                format!("Failed to export results to {}", cli.out_dir.display())
            });
        }
    };

    notify(&notifier, completion_alert(&report, &written)).await;

    tracing::info!("Scan finished in {:.1} minutes", report.elapsed_minutes());
    Ok(())
}
