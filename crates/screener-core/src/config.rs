use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::ConfigError;

/// Upper bound on lots in flight at once.
pub const MAX_CONCURRENT_LOTS: usize = 16;

/// Parameters of one scan. Fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenConfig {
    /// Inclusive lower bound on the last close.
    pub price_min: f64,
    /// Inclusive upper bound on the last close.
    pub price_max: f64,
    /// Floor on the last bar's volume.
    pub min_weekly_volume: f64,
    /// Widest allowed base, as percent of the base's lowest low.
    pub base_max_range_pct: f64,
    /// Bars before the last one that form the consolidation base.
    pub base_weeks: usize,
    pub sma_window: usize,
    pub superstock_ratio: f64,
    pub watchlist_ratio: f64,
    /// Max symbols per retrieval request.
    pub lot_size: usize,
    /// Delay between lot requests.
    pub pacing_ms: u64,
    pub lot_timeout_secs: u64,
    /// 1 keeps retrieval strictly sequential.
    pub max_concurrent_lots: usize,
}

impl ScreenConfig {
    /// Parameters of the unattended weekly run.
    pub fn scheduled() -> Self {
        Self {
            price_min: 0.5,
            price_max: 15.0,
            min_weekly_volume: 100_000.0,
            base_max_range_pct: 15.0,
            base_weeks: 20,
            sma_window: 30,
            superstock_ratio: 5.0,
            watchlist_ratio: 3.0,
            lot_size: 40,
            pacing_ms: 1000,
            lot_timeout_secs: 60,
            max_concurrent_lots: 1,
        }
    }

    /// Looser parameters used for on-demand scans.
    pub fn interactive() -> Self {
        Self {
            price_min: 1.0,
            min_weekly_volume: 1_000.0,
            base_max_range_pct: 20.0,
            base_weeks: 30,
            lot_size: 50,
            pacing_ms: 500,
            ..Self::scheduled()
        }
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn lot_timeout(&self) -> Duration {
        Duration::from_secs(self.lot_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                field,
                reason: reason.into(),
            })
        }

        if !self.price_min.is_finite() || self.price_min < 0.0 {
            return invalid("price_min", "must be a non-negative number");
        }
        if !self.price_max.is_finite() || self.price_max < self.price_min {
            return invalid("price_max", format!("must be >= price_min ({})", self.price_min));
        }
        if !self.min_weekly_volume.is_finite() || self.min_weekly_volume < 0.0 {
            return invalid("min_weekly_volume", "must be a non-negative number");
        }
        if !self.base_max_range_pct.is_finite() || self.base_max_range_pct < 0.0 {
            return invalid("base_max_range_pct", "must be a non-negative number");
        }
        if self.base_weeks == 0 {
            return invalid("base_weeks", "must be at least 1");
        }
        if self.sma_window < 2 {
            return invalid("sma_window", "must be at least 2");
        }
        if !self.watchlist_ratio.is_finite() || self.watchlist_ratio <= 0.0 {
            return invalid("watchlist_ratio", "must be positive");
        }
        if !self.superstock_ratio.is_finite() || self.superstock_ratio <= self.watchlist_ratio {
            return invalid(
                "superstock_ratio",
                format!("must be greater than watchlist_ratio ({})", self.watchlist_ratio),
            );
        }
        if self.lot_size == 0 {
            return invalid("lot_size", "must be at least 1");
        }
        if self.lot_timeout_secs == 0 {
            return invalid("lot_timeout_secs", "must be at least 1");
        }
        if self.max_concurrent_lots == 0 || self.max_concurrent_lots > MAX_CONCURRENT_LOTS {
            return invalid(
                "max_concurrent_lots",
                format!("must be between 1 and {}", MAX_CONCURRENT_LOTS),
            );
        }
        Ok(())
    }
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self::scheduled()
    }
}

/// Per-run overrides layered on top of a preset. Unset fields keep the preset value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenOverrides {
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub min_weekly_volume: Option<f64>,
    pub base_max_range_pct: Option<f64>,
    pub base_weeks: Option<usize>,
    pub sma_window: Option<usize>,
    pub superstock_ratio: Option<f64>,
    pub watchlist_ratio: Option<f64>,
    pub lot_size: Option<usize>,
    pub pacing_ms: Option<u64>,
    pub lot_timeout_secs: Option<u64>,
    pub max_concurrent_lots: Option<usize>,
}

impl ScreenOverrides {
    /// Read `SCREEN_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            price_min: env_parse("SCREEN_PRICE_MIN")?,
            price_max: env_parse("SCREEN_PRICE_MAX")?,
            min_weekly_volume: env_parse("SCREEN_MIN_WEEKLY_VOLUME")?,
            base_max_range_pct: env_parse("SCREEN_BASE_MAX_RANGE_PCT")?,
            base_weeks: env_parse("SCREEN_BASE_WEEKS")?,
            sma_window: env_parse("SCREEN_SMA_WINDOW")?,
            superstock_ratio: env_parse("SCREEN_SUPERSTOCK_RATIO")?,
            watchlist_ratio: env_parse("SCREEN_WATCHLIST_RATIO")?,
            lot_size: env_parse("SCREEN_LOT_SIZE")?,
            pacing_ms: env_parse("SCREEN_PACING_MS")?,
            lot_timeout_secs: env_parse("SCREEN_LOT_TIMEOUT_SECS")?,
            max_concurrent_lots: env_parse("SCREEN_MAX_CONCURRENT_LOTS")?,
        })
    }

    /// Layer `other` on top of `self`; fields set in `other` win.
    pub fn merge(self, other: ScreenOverrides) -> Self {
        Self {
            price_min: other.price_min.or(self.price_min),
            price_max: other.price_max.or(self.price_max),
            min_weekly_volume: other.min_weekly_volume.or(self.min_weekly_volume),
            base_max_range_pct: other.base_max_range_pct.or(self.base_max_range_pct),
            base_weeks: other.base_weeks.or(self.base_weeks),
            sma_window: other.sma_window.or(self.sma_window),
            superstock_ratio: other.superstock_ratio.or(self.superstock_ratio),
            watchlist_ratio: other.watchlist_ratio.or(self.watchlist_ratio),
            lot_size: other.lot_size.or(self.lot_size),
            pacing_ms: other.pacing_ms.or(self.pacing_ms),
            lot_timeout_secs: other.lot_timeout_secs.or(self.lot_timeout_secs),
            max_concurrent_lots: other.max_concurrent_lots.or(self.max_concurrent_lots),
        }
    }

    pub fn apply(&self, base: ScreenConfig) -> ScreenConfig {
        ScreenConfig {
            price_min: self.price_min.unwrap_or(base.price_min),
            price_max: self.price_max.unwrap_or(base.price_max),
            min_weekly_volume: self.min_weekly_volume.unwrap_or(base.min_weekly_volume),
            base_max_range_pct: self.base_max_range_pct.unwrap_or(base.base_max_range_pct),
            base_weeks: self.base_weeks.unwrap_or(base.base_weeks),
            sma_window: self.sma_window.unwrap_or(base.sma_window),
            superstock_ratio: self.superstock_ratio.unwrap_or(base.superstock_ratio),
            watchlist_ratio: self.watchlist_ratio.unwrap_or(base.watchlist_ratio),
            lot_size: self.lot_size.unwrap_or(base.lot_size),
            pacing_ms: self.pacing_ms.unwrap_or(base.pacing_ms),
            lot_timeout_secs: self.lot_timeout_secs.unwrap_or(base.lot_timeout_secs),
            max_concurrent_lots: self.max_concurrent_lots.unwrap_or(base.max_concurrent_lots),
        }
    }
}

fn env_parse<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Unparsable {
                var: var.to_string(),
                value,
            }),
        _ => Ok(None),
    }
}
