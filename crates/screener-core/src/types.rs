use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Rejection, SymbolError};

/// Minimum number of weekly bars a series needs before it is evaluated:
/// roughly one year plus room for the 30-week average and the base window.
pub const MIN_SERIES_LEN: usize = 51;

/// Bars preceding the last one that make up the volume reference window.
pub const VOLUME_LOOKBACK_WEEKS: usize = 10;

/// Widest spacing between consecutive weekly bars before a week counts as
/// missing. Holiday weeks shift the period stamp by a day or two.
pub const MAX_BAR_SPACING_DAYS: i64 = 10;

/// Exchange ticker symbol (uppercase ASCII letters, at most 5 characters).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(String);

impl Ticker {
    /// Normalize a raw listing entry into a ticker.
    ///
    /// Class-share dots become dashes before the alphabetic check, so entries
    /// such as `BRK.B` end up rejected along with warrants, units and test
    /// symbols. Returns `None` for anything that is not a plain symbol.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase().replace('.', "-");

        if normalized.is_empty() || normalized.len() >= 6 {
            return None;
        }
        if !normalized.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }

        Some(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// History window requested from the data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookback {
    pub years: u32,
}

impl Lookback {
    pub const TWO_YEARS: Lookback = Lookback { years: 2 };

    /// Range string in the form chart APIs expect (`"2y"`).
    pub fn as_range(&self) -> String {
        format!("{}y", self.years)
    }
}

impl Default for Lookback {
    fn default() -> Self {
        Self::TWO_YEARS
    }
}

/// One weekly OHLCV observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyBar {
    pub period_end: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Provider row before cleaning; any field may be missing upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub period_end: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl RawBar {
    /// The bar with every field present, or `None` for an incomplete row.
    pub fn complete(&self) -> Option<WeeklyBar> {
        Some(WeeklyBar {
            period_end: self.period_end,
            open: self.open?,
            high: self.high?,
            low: self.low?,
            close: self.close?,
            volume: self.volume?,
        })
    }
}

impl From<WeeklyBar> for RawBar {
    fn from(bar: WeeklyBar) -> Self {
        Self {
            period_end: bar.period_end,
            open: Some(bar.open),
            high: Some(bar.high),
            low: Some(bar.low),
            close: Some(bar.close),
            volume: Some(bar.volume),
        }
    }
}

/// Weekly bars for one ticker, strictly ascending by period.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WeeklySeries {
    bars: Vec<WeeklyBar>,
}

impl WeeklySeries {
    /// Trim incomplete rows at either end, then validate what remains.
    ///
    /// An incomplete row between two complete ones is a missing week, and
    /// the series is unusable.
    pub fn from_raw(raw: Vec<RawBar>) -> Result<Self, SymbolError> {
        let rows: Vec<Option<WeeklyBar>> = raw.iter().map(RawBar::complete).collect();
        let Some(first) = rows.iter().position(Option::is_some) else {
            return Err(SymbolError::Empty);
        };
        let last = rows.iter().rposition(Option::is_some).unwrap_or(first);

        let mut bars = Vec::with_capacity(last + 1 - first);
        for (offset, row) in rows[first..=last].iter().enumerate() {
            match row {
                Some(bar) => bars.push(bar.clone()),
                None => return Err(SymbolError::Gap { index: offset }),
            }
        }

        Self::from_bars(bars)
    }

    /// Validate already complete bars. A single bad value makes the whole
    /// series unusable rather than being patched over.
    pub fn from_bars(bars: Vec<WeeklyBar>) -> Result<Self, SymbolError> {
        if bars.is_empty() {
            return Err(SymbolError::Empty);
        }

        for (index, bar) in bars.iter().enumerate() {
            let values = [bar.open, bar.high, bar.low, bar.close, bar.volume];
            if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(SymbolError::InvalidBar {
                    index,
                    reason: "non-finite or negative value".to_string(),
                });
            }
            if bar.high < bar.low {
                return Err(SymbolError::InvalidBar {
                    index,
                    reason: format!("high {} below low {}", bar.high, bar.low),
                });
            }
        }

        if let Some(index) = bars
            .windows(2)
            .position(|pair| pair[1].period_end <= pair[0].period_end)
        {
            return Err(SymbolError::OutOfOrder { index: index + 1 });
        }

        let max_spacing = Duration::days(MAX_BAR_SPACING_DAYS);
        if let Some(index) = bars
            .windows(2)
            .position(|pair| pair[1].period_end - pair[0].period_end > max_spacing)
        {
            return Err(SymbolError::Gap { index: index + 1 });
        }

        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[WeeklyBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&WeeklyBar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }
}

/// A ticker that passed every technical gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRecord {
    pub ticker: Ticker,
    /// Last close, rounded to cents.
    pub last_close: f64,
    /// Base range as a one-decimal percent label, e.g. `"12.0%"`.
    pub base_range_pct: String,
    /// Volume ratio rounded to one decimal.
    pub volume_ratio: f64,
    #[serde(skip)]
    surge_ratio: f64,
}

impl CandidateRecord {
    pub fn new(ticker: Ticker, last_close: f64, base_range_pct: f64, volume_ratio: f64) -> Self {
        Self {
            ticker,
            last_close: round_to(last_close, 2),
            base_range_pct: format!("{:.1}%", base_range_pct),
            volume_ratio: round_to(volume_ratio, 1),
            surge_ratio: volume_ratio,
        }
    }

    /// Unrounded volume ratio; tier placement compares against this value.
    pub fn surge_ratio(&self) -> f64 {
        self.surge_ratio
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Output bucket for an accepted candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Superstock,
    Watchlist,
    Discard,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Superstock => "Superstocks",
            Tier::Watchlist => "Watchlist",
            Tier::Discard => "Discard",
        }
    }
}

/// The two tiers of a scan, each in processing order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ScanResult {
    pub superstocks: Vec<CandidateRecord>,
    pub watchlist: Vec<CandidateRecord>,
}

impl ScanResult {
    /// Append a record to its tier. Returns `false` for discarded records.
    pub fn push(&mut self, tier: Tier, record: CandidateRecord) -> bool {
        match tier {
            Tier::Superstock => self.superstocks.push(record),
            Tier::Watchlist => self.watchlist.push(record),
            Tier::Discard => return false,
        }
        true
    }

    /// Append another result, keeping `self`'s records first.
    pub fn extend(&mut self, other: ScanResult) {
        self.superstocks.extend(other.superstocks);
        self.watchlist.extend(other.watchlist);
    }

    pub fn tier(&self, tier: Tier) -> &[CandidateRecord] {
        match tier {
            Tier::Superstock => &self.superstocks,
            Tier::Watchlist => &self.watchlist,
            Tier::Discard => &[],
        }
    }

    pub fn superstock_tickers(&self) -> String {
        join_tickers(&self.superstocks)
    }

    pub fn watchlist_tickers(&self) -> String {
        join_tickers(&self.watchlist)
    }

    pub fn superstock_count(&self) -> usize {
        self.superstocks.len()
    }

    pub fn watchlist_count(&self) -> usize {
        self.watchlist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.superstocks.is_empty() && self.watchlist.is_empty()
    }
}

fn join_tickers(records: &[CandidateRecord]) -> String {
    records
        .iter()
        .map(|r| r.ticker.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Counters collected over one scan.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ScanStats {
    pub universe_size: usize,
    pub lots_total: usize,
    pub lots_skipped: usize,
    pub symbols_in_skipped_lots: usize,
    pub symbols_evaluated: usize,
    /// Absent from the provider response or carrying an unusable series.
    pub symbols_unusable: usize,
    pub symbols_rejected: usize,
    /// Passed every gate but the volume surge was below the watchlist ratio.
    pub symbols_discarded: usize,
    pub rejections: BTreeMap<&'static str, usize>,
}

impl ScanStats {
    pub fn record_rejection(&mut self, rejection: &Rejection) {
        self.symbols_rejected += 1;
        *self.rejections.entry(rejection.code()).or_insert(0) += 1;
    }

    /// Symbols that yielded nothing because of a data or lot failure.
    pub fn symbols_skipped(&self) -> usize {
        self.symbols_unusable + self.symbols_in_skipped_lots
    }

    /// Fold another lot's counters into this one.
    pub fn merge(&mut self, other: ScanStats) {
        self.lots_total += other.lots_total;
        self.lots_skipped += other.lots_skipped;
        self.symbols_in_skipped_lots += other.symbols_in_skipped_lots;
        self.symbols_evaluated += other.symbols_evaluated;
        self.symbols_unusable += other.symbols_unusable;
        self.symbols_rejected += other.symbols_rejected;
        self.symbols_discarded += other.symbols_discarded;
        for (code, count) in other.rejections {
            *self.rejections.entry(code).or_insert(0) += count;
        }
    }
}

/// Everything a completed scan reports.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub result: ScanResult,
    pub stats: ScanStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScanReport {
    pub fn elapsed_minutes(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 60_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(week: i64, close: f64) -> WeeklyBar {
        WeeklyBar {
            period_end: Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap()
                + chrono::Duration::weeks(week),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_ticker_parse_normalizes() {
        assert_eq!(Ticker::parse(" aapl ").unwrap().as_str(), "AAPL");
        assert_eq!(Ticker::parse("ABCDE").unwrap().as_str(), "ABCDE");
    }

    #[test]
    fn test_ticker_parse_rejects_non_plain_symbols() {
        assert!(Ticker::parse("BRK.B").is_none());
        assert!(Ticker::parse("ABCDEF").is_none());
        assert!(Ticker::parse("AB1").is_none());
        assert!(Ticker::parse("").is_none());
    }

    #[test]
    fn test_series_trims_incomplete_edge_rows() {
        let mut raw: Vec<RawBar> = (0..6).map(|i| bar(i, 10.0).into()).collect();
        raw[0].open = None;
        raw[5].volume = None;

        let series = WeeklySeries::from_raw(raw).unwrap();
        assert_eq!(series.len(), 4);
        assert_eq!(series.bars()[0].period_end, bar(1, 10.0).period_end);
    }

    #[test]
    fn test_series_rejects_interior_incomplete_row() {
        let mut raw: Vec<RawBar> = (0..5).map(|i| bar(i, 10.0).into()).collect();
        raw[2].close = None;

        assert_eq!(WeeklySeries::from_raw(raw), Err(SymbolError::Gap { index: 2 }));
    }

    #[test]
    fn test_series_rejects_missing_week() {
        let bars: Vec<WeeklyBar> = [0, 1, 3, 4].iter().map(|&i| bar(i, 10.0)).collect();

        assert_eq!(WeeklySeries::from_bars(bars), Err(SymbolError::Gap { index: 2 }));
    }

    #[test]
    fn test_series_tolerates_holiday_shifted_stamp() {
        let mut bars: Vec<WeeklyBar> = (0..4).map(|i| bar(i, 10.0)).collect();
        bars[2].period_end = bars[2].period_end + Duration::days(2);

        assert_eq!(WeeklySeries::from_bars(bars).map(|s| s.len()), Ok(4));
    }

    #[test]
    fn test_series_rejects_non_finite_values() {
        let mut bars: Vec<WeeklyBar> = (0..5).map(|i| bar(i, 10.0)).collect();
        bars[3].volume = f64::NAN;

        assert!(matches!(
            WeeklySeries::from_bars(bars),
            Err(SymbolError::InvalidBar { index: 3, .. })
        ));
    }

    #[test]
    fn test_series_rejects_out_of_order_periods() {
        let mut bars: Vec<WeeklyBar> = (0..5).map(|i| bar(i, 10.0)).collect();
        bars.swap(1, 2);

        assert!(matches!(
            WeeklySeries::from_bars(bars),
            Err(SymbolError::OutOfOrder { index: 1 })
        ));
    }

    #[test]
    fn test_series_all_incomplete_is_empty() {
        let raw = vec![RawBar {
            period_end: Utc::now(),
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
        }];
        assert!(matches!(WeeklySeries::from_raw(raw), Err(SymbolError::Empty)));
    }

    #[test]
    fn test_candidate_record_rounding() {
        let record = CandidateRecord::new(Ticker::parse("AAA").unwrap(), 10.004, 12.04, 4.96);

        assert_eq!(record.last_close, 10.0);
        assert_eq!(record.base_range_pct, "12.0%");
        assert_eq!(record.volume_ratio, 5.0);
        approx::assert_relative_eq!(record.surge_ratio(), 4.96);
    }

    #[test]
    fn test_scan_result_views() {
        let mut result = ScanResult::default();
        for (symbol, tier) in [
            ("AAA", Tier::Superstock),
            ("BBB", Tier::Watchlist),
            ("CCC", Tier::Superstock),
            ("DDD", Tier::Discard),
        ] {
            result.push(tier, CandidateRecord::new(Ticker::parse(symbol).unwrap(), 1.0, 1.0, 1.0));
        }

        assert_eq!(result.superstock_tickers(), "AAA,CCC");
        assert_eq!(result.watchlist_tickers(), "BBB");
        assert_eq!(result.superstock_count(), 2);
        assert_eq!(result.watchlist_count(), 1);
        assert_eq!(ScanResult::default().superstock_tickers(), "");
    }

    #[test]
    fn test_candidate_record_serializes_without_raw_ratio() {
        let record = CandidateRecord::new(Ticker::parse("AAA").unwrap(), 10.0, 12.0, 10.0);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["ticker"], "AAA");
        assert_eq!(json["base_range_pct"], "12.0%");
        assert!(json.get("surge_ratio").is_none());
    }
}
