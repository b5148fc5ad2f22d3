//! In-memory capabilities and series builders shared by the unit tests.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use screener_core::{
    HistoryProvider, ListingSource, Lookback, ProviderError, RawBar, SourceError, Ticker,
    WeeklyBar, WeeklySeries,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::evaluator::{Indicators, StandardIndicators};
use crate::universe::{sanitize_symbols, Universe};

pub fn ticker(symbol: &str) -> Ticker {
    Ticker::parse(symbol).expect("valid test ticker")
}

pub fn universe(symbols: &[&str]) -> Universe {
    sanitize_symbols(symbols.iter().copied())
}

/// `len` weekly bars: a flat base (close 9.0, high 9.52, low 8.5, i.e. a
/// 12.0% range) followed by one breakout bar.
pub fn breakout_bars(
    len: usize,
    last_close: f64,
    last_volume: f64,
    prior_volume: f64,
) -> Vec<WeeklyBar> {
    let start = Utc.with_ymd_and_hms(2023, 1, 6, 0, 0, 0).unwrap();

    (0..len)
        .map(|i| {
            let period_end = start + ChronoDuration::weeks(i as i64);
            if i + 1 == len {
                WeeklyBar {
                    period_end,
                    open: 9.0,
                    high: last_close.max(9.0) + 0.2,
                    low: last_close.min(9.0),
                    close: last_close,
                    volume: last_volume,
                }
            } else {
                WeeklyBar {
                    period_end,
                    open: 9.0,
                    high: 9.52,
                    low: 8.5,
                    close: 9.0,
                    volume: prior_volume,
                }
            }
        })
        .collect()
}

pub fn series(bars: Vec<WeeklyBar>) -> WeeklySeries {
    WeeklySeries::from_bars(bars).expect("valid test series")
}

pub fn raw(bars: Vec<WeeklyBar>) -> Vec<RawBar> {
    bars.into_iter().map(RawBar::from).collect()
}

/// History provider backed by a map, with switches for lot failures and delays.
#[derive(Default)]
pub struct StubProvider {
    history: HashMap<Ticker, Vec<RawBar>>,
    failing: HashSet<Ticker>,
    slow: HashMap<Ticker, Duration>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, symbol: &str, bars: Vec<RawBar>) -> Self {
        self.history.insert(ticker(symbol), bars);
        self
    }

    /// Any lot containing `symbol` is rejected as a whole.
    pub fn failing_lot_with(mut self, symbol: &str) -> Self {
        self.failing.insert(ticker(symbol));
        self
    }

    /// Any lot containing `symbol` takes `delay` to answer.
    pub fn slow_lot_with(mut self, symbol: &str, delay: Duration) -> Self {
        self.slow.insert(ticker(symbol), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryProvider for StubProvider {
    async fn fetch_weekly_history(
        &self,
        symbols: &[Ticker],
        _lookback: Lookback,
    ) -> Result<HashMap<Ticker, Vec<RawBar>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = symbols.iter().find_map(|s| self.slow.get(s)) {
            tokio::time::sleep(*delay).await;
        }
        if symbols.iter().any(|s| self.failing.contains(s)) {
            return Err(ProviderError::Rejected("stub lot failure".into()));
        }

        Ok(symbols
            .iter()
            .filter_map(|s| self.history.get(s).map(|bars| (s.clone(), bars.clone())))
            .collect())
    }
}

pub struct FailingSource {
    id: String,
}

impl FailingSource {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

#[async_trait]
impl ListingSource for FailingSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_symbols(&self) -> Result<Vec<String>, SourceError> {
        Err(SourceError::Http("connection refused".into()))
    }
}

/// Listing source that counts how often it is queried.
pub struct CountingSource {
    symbols: Vec<String>,
    calls: AtomicUsize,
}

impl CountingSource {
    pub fn new(symbols: &[&str]) -> Self {
        Self {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingSource for CountingSource {
    fn id(&self) -> &str {
        "counting"
    }

    async fn list_symbols(&self) -> Result<Vec<String>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.symbols.clone())
    }
}

/// Standard indicators that count how often each one is computed.
#[derive(Default)]
pub struct CountingIndicators {
    base: AtomicUsize,
    crossover: AtomicUsize,
    ratio: AtomicUsize,
}

impl CountingIndicators {
    pub fn base_calls(&self) -> usize {
        self.base.load(Ordering::SeqCst)
    }

    pub fn crossover_calls(&self) -> usize {
        self.crossover.load(Ordering::SeqCst)
    }

    pub fn ratio_calls(&self) -> usize {
        self.ratio.load(Ordering::SeqCst)
    }
}

impl Indicators for CountingIndicators {
    fn base_range_pct(&self, window: &[WeeklyBar]) -> Option<f64> {
        self.base.fetch_add(1, Ordering::SeqCst);
        StandardIndicators.base_range_pct(window)
    }

    fn crossed_above_sma(&self, closes: &[f64], period: usize) -> Option<bool> {
        self.crossover.fetch_add(1, Ordering::SeqCst);
        StandardIndicators.crossed_above_sma(closes, period)
    }

    fn volume_ratio(&self, volumes: &[f64], lookback: usize) -> Option<f64> {
        self.ratio.fetch_add(1, Ordering::SeqCst);
        StandardIndicators.volume_ratio(volumes, lookback)
    }
}
