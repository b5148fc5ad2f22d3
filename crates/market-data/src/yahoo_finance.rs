use async_trait::async_trait;
use chrono::DateTime;
use screener_core::{HistoryProvider, Lookback, ProviderError, RawBar, Ticker};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_SYMBOL_CONCURRENCY: usize = 8;
const MAX_SYMBOL_CONCURRENCY: usize = 32;

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
    #[serde(default)]
    adjclose: Vec<AdjCloseColumn>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseColumn {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Parsed chart response for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartOutcome {
    Bars(Vec<RawBar>),
    /// Upstream has no chart for the symbol (delisted, unknown, ...).
    NotFound(String),
}

fn column(values: &[Option<f64>], i: usize) -> Option<f64> {
    values.get(i).copied().flatten()
}

/// Parse a v8 chart response into split/dividend-adjusted weekly rows.
///
/// Prices are scaled by `adjclose / close`; volume is left as reported.
/// When the adjusted-close column is present but missing for a row, the row
/// loses its close and is dropped downstream as incomplete.
pub fn parse_chart(body: &str) -> Result<ChartOutcome, ProviderError> {
    let envelope: ChartEnvelope =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    if let Some(error) = envelope.chart.error {
        return Ok(ChartOutcome::NotFound(error.description.unwrap_or(error.code)));
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(ChartOutcome::NotFound("empty chart result".to_string()));
    };

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adjclose = result.indicators.adjclose.into_iter().next().map(|c| c.adjclose);

    let mut bars: Vec<RawBar> = Vec::with_capacity(result.timestamp.len());

    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(period_end) = DateTime::from_timestamp(ts, 0) else {
            continue;
        };

        let close = column(&quote.close, i);
        let factor = match &adjclose {
            Some(adj) => match (column(adj, i), close) {
                (Some(a), Some(c)) if c != 0.0 && a.is_finite() && c.is_finite() => Some(a / c),
                _ => None,
            },
            None => Some(1.0),
        };

        let bar = RawBar {
            period_end,
            open: column(&quote.open, i).zip(factor).map(|(v, f)| v * f),
            high: column(&quote.high, i).zip(factor).map(|(v, f)| v * f),
            low: column(&quote.low, i).zip(factor).map(|(v, f)| v * f),
            close: close.zip(factor).map(|(v, f)| v * f),
            volume: column(&quote.volume, i),
        };

        // The running week can be reported twice; the later row wins
        if let Some(prev) = bars.last_mut() {
            if prev.period_end >= bar.period_end {
                *prev = bar;
                continue;
            }
        }
        bars.push(bar);
    }

    Ok(ChartOutcome::Bars(bars))
}

/// Weekly history from the Yahoo Finance chart API.
///
/// The chart endpoint serves one symbol per request, so a lot is fetched as
/// a bounded set of concurrent requests and reassembled into one map.
#[derive(Clone)]
pub struct YahooFinanceClient {
    client: reqwest::Client,
    base_url: String,
    symbol_concurrency: usize,
}

impl YahooFinanceClient {
    pub fn new() -> Self {
        Self::with_base_url(CHART_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: crate::http_client(REQUEST_TIMEOUT),
            base_url: base_url.into(),
            symbol_concurrency: DEFAULT_SYMBOL_CONCURRENCY,
        }
    }

    /// Client for the public endpoint; `YAHOO_SYMBOL_CONCURRENCY` overrides
    /// the per-lot request limit.
    pub fn from_env() -> Self {
        let client = Self::new();
        match std::env::var("YAHOO_SYMBOL_CONCURRENCY")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            Some(limit) => client.with_symbol_concurrency(limit),
            None => client,
        }
    }

    /// Maximum simultaneous chart requests within one lot.
    pub fn with_symbol_concurrency(mut self, limit: usize) -> Self {
        self.symbol_concurrency = limit.clamp(1, MAX_SYMBOL_CONCURRENCY);
        self
    }

    pub fn symbol_concurrency(&self) -> usize {
        self.symbol_concurrency
    }

    pub fn chart_url(&self, ticker: &Ticker, lookback: Lookback) -> String {
        format!(
            "{}/{}?range={}&interval=1wk&events=div%2Csplit&includeAdjustedClose=true",
            self.base_url.trim_end_matches('/'),
            ticker,
            lookback.as_range()
        )
    }

    async fn fetch_symbol(
        &self,
        ticker: &Ticker,
        lookback: Lookback,
    ) -> Result<ChartOutcome, ProviderError> {
        let response = self
            .client
            .get(self.chart_url(ticker, lookback))
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if status.as_u16() == 404 {
            return Ok(parse_chart(&body)
                .unwrap_or_else(|_| ChartOutcome::NotFound(format!("HTTP {}", status))));
        }
        if !status.is_success() {
            return Err(ProviderError::Http(format!("HTTP {}", status)));
        }

        parse_chart(&body)
    }
}

impl Default for YahooFinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryProvider for YahooFinanceClient {
    /// Symbols without a chart are simply absent from the map. The lot fails
    /// as a whole when upstream rate-limits it or when every request fails.
    async fn fetch_weekly_history(
        &self,
        symbols: &[Ticker],
        lookback: Lookback,
    ) -> Result<HashMap<Ticker, Vec<RawBar>>, ProviderError> {
        let semaphore = Arc::new(Semaphore::new(self.symbol_concurrency));
        let mut tasks = JoinSet::new();

        for ticker in symbols {
            let client = self.clone();
            let ticker = ticker.clone();
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = client.fetch_symbol(&ticker, lookback).await;
                (ticker, outcome)
            });
        }

        let mut history = HashMap::with_capacity(symbols.len());
        let mut failures = 0;
        let mut last_error = None;

        while let Some(joined) = tasks.join_next().await {
            let (ticker, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    failures += 1;
                    last_error = Some(ProviderError::Http(format!("chart task failed: {}", e)));
                    continue;
                }
            };

            match outcome {
                Ok(ChartOutcome::Bars(bars)) => {
                    history.insert(ticker, bars);
                }
                Ok(ChartOutcome::NotFound(reason)) => {
                    tracing::debug!("{}: no chart data: {}", ticker, reason);
                }
                Err(ProviderError::RateLimited) => {
                    tasks.abort_all();
                    return Err(ProviderError::RateLimited);
                }
                Err(e) => {
                    tracing::debug!("{}: chart request failed: {}", ticker, e);
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if !symbols.is_empty() && failures == symbols.len() {
            return Err(last_error.unwrap_or_else(|| {
                ProviderError::Rejected("every chart request failed".into())
            }));
        }

        Ok(history)
    }
}
