use clap::Parser;
use screener_core::{ConfigError, ScreenConfig, ScreenOverrides};
use std::path::PathBuf;

/// Weekly superstock scan over NASDAQ, S&P 400 and S&P 600.
#[derive(Debug, Parser)]
#[command(name = "superstock-scan", version, about)]
pub struct Cli {
    /// Scan only these symbols instead of the listed universe
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub symbols: Vec<String>,

    /// Directory for superstocks.csv / watchlist.csv
    #[arg(long, default_value = "output")]
    pub out_dir: PathBuf,

    /// Skip e-mail and Discord notifications
    #[arg(long)]
    pub no_notify: bool,

    /// Log as JSON lines (also enabled by RUST_LOG_FORMAT=json)
    #[arg(long)]
    pub json_logs: bool,

    #[arg(long)]
    pub price_min: Option<f64>,
    #[arg(long)]
    pub price_max: Option<f64>,
    #[arg(long)]
    pub min_weekly_volume: Option<f64>,
    #[arg(long)]
    pub base_max_range_pct: Option<f64>,
    #[arg(long)]
    pub base_weeks: Option<usize>,
    #[arg(long)]
    pub sma_window: Option<usize>,
    #[arg(long)]
    pub superstock_ratio: Option<f64>,
    #[arg(long)]
    pub watchlist_ratio: Option<f64>,
    #[arg(long)]
    pub lot_size: Option<usize>,
    #[arg(long)]
    pub pacing_ms: Option<u64>,
    #[arg(long)]
    pub lot_timeout_secs: Option<u64>,
    #[arg(long)]
    pub max_concurrent_lots: Option<usize>,
}

impl Cli {
    pub fn overrides(&self) -> ScreenOverrides {
        ScreenOverrides {
            price_min: self.price_min,
            price_max: self.price_max,
            min_weekly_volume: self.min_weekly_volume,
            base_max_range_pct: self.base_max_range_pct,
            base_weeks: self.base_weeks,
            sma_window: self.sma_window,
            superstock_ratio: self.superstock_ratio,
            watchlist_ratio: self.watchlist_ratio,
            lot_size: self.lot_size,
            pacing_ms: self.pacing_ms,
            lot_timeout_secs: self.lot_timeout_secs,
            max_concurrent_lots: self.max_concurrent_lots,
        }
    }

    /// Scheduled preset, then `SCREEN_*` variables, then flags.
    pub fn screen_config(&self, env: ScreenOverrides) -> Result<ScreenConfig, ConfigError> {
        let config = env.merge(self.overrides()).apply(ScreenConfig::scheduled());
        config.validate()?;
        Ok(config)
    }
}
