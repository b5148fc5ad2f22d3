use screener_core::{
    HistoryProvider, Lookback, ProviderError, ScreenConfig, SymbolError, Ticker, WeeklySeries,
    MAX_CONCURRENT_LOTS,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::universe::Universe;

/// Consecutive slice of the universe fetched with one provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct Lot {
    pub index: usize,
    pub symbols: Vec<Ticker>,
}

/// Outcome of fetching one lot.
///
/// `Err` means the whole lot is unusable; otherwise every symbol of the lot
/// appears once, in lot order, with its series or the reason it has none.
#[derive(Debug)]
pub struct LotFetch {
    pub lot: Lot,
    pub series: Result<Vec<(Ticker, Result<WeeklySeries, SymbolError>)>, ProviderError>,
}

/// Split the (sorted) universe into lots of at most `lot_size` tickers.
pub fn partition(universe: &Universe, lot_size: usize) -> Vec<Lot> {
    let symbols: Vec<Ticker> = universe.iter().cloned().collect();
    symbols
        .chunks(lot_size.max(1))
        .enumerate()
        .map(|(index, chunk)| Lot {
            index,
            symbols: chunk.to_vec(),
        })
        .collect()
}

/// Fetches weekly history lot by lot, containing failures per lot and per symbol.
#[derive(Clone)]
pub struct BatchRetriever {
    provider: Arc<dyn HistoryProvider>,
    lookback: Lookback,
    timeout: Duration,
    pacing: Duration,
    max_concurrent_lots: usize,
}

impl BatchRetriever {
    pub fn new(provider: Arc<dyn HistoryProvider>, config: &ScreenConfig) -> Self {
        Self {
            provider,
            lookback: Lookback::TWO_YEARS,
            timeout: config.lot_timeout(),
            pacing: config.pacing(),
            max_concurrent_lots: config.max_concurrent_lots.clamp(1, MAX_CONCURRENT_LOTS),
        }
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// One provider call for the whole lot, bounded by the lot timeout.
    pub async fn fetch_lot(&self, lot: Lot) -> LotFetch {
        let response = tokio::time::timeout(
            self.timeout,
            self.provider.fetch_weekly_history(&lot.symbols, self.lookback),
        )
        .await
        .unwrap_or(Err(ProviderError::Timeout(self.timeout)));

        let series = response.map(|mut by_symbol| {
            lot.symbols
                .iter()
                .map(|ticker| {
                    let extracted = by_symbol
                        .remove(ticker)
                        .ok_or(SymbolError::Absent)
                        .and_then(WeeklySeries::from_raw);
                    (ticker.clone(), extracted)
                })
                .collect()
        });

        LotFetch { lot, series }
    }

    /// Fetch every lot of the universe, pausing between dispatches.
    ///
    /// The result is in lot order whether lots ran one at a time or
    /// concurrently.
    pub async fn fetch_batches(&self, universe: &Universe, lot_size: usize) -> Vec<LotFetch> {
        let lots = partition(universe, lot_size);
        let total = universe.len();

        if self.max_concurrent_lots > 1 && lots.len() > 1 {
            self.fetch_concurrently(lots, total).await
        } else {
            self.fetch_sequentially(lots, total).await
        }
    }

    async fn pace(&self, lot: &Lot) {
        if lot.index > 0 && !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }

    async fn fetch_sequentially(&self, lots: Vec<Lot>, total: usize) -> Vec<LotFetch> {
        let mut fetched = Vec::with_capacity(lots.len());
        let mut processed = 0;

        for lot in lots {
            self.pace(&lot).await;
            processed += lot.symbols.len();
            fetched.push(self.fetch_lot(lot).await);
            tracing::info!("Processed: {}/{}", processed, total);
        }

        fetched
    }

    async fn fetch_concurrently(&self, lots: Vec<Lot>, total: usize) -> Vec<LotFetch> {
        let permits = self.max_concurrent_lots.min(lots.len());
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut pending: BTreeMap<usize, Lot> = BTreeMap::new();
        let mut tasks = JoinSet::new();

        for lot in lots {
            self.pace(&lot).await;
            pending.insert(lot.index, lot.clone());

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                continue;
            };
            let retriever = self.clone();

            tasks.spawn(async move {
                let _permit = permit;
                retriever.fetch_lot(lot).await
            });
        }

        let mut fetched = BTreeMap::new();
        let mut processed = 0;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(lot_fetch) => {
                    processed += lot_fetch.lot.symbols.len();
                    tracing::info!("Processed: {}/{}", processed, total);
                    pending.remove(&lot_fetch.lot.index);
                    fetched.insert(lot_fetch.lot.index, lot_fetch);
                }
                Err(e) => tracing::error!("Lot task failed: {}", e),
            }
        }

        // Lots whose task died come back as failed lots
        for (index, lot) in pending {
            fetched.insert(
                index,
                LotFetch {
                    lot,
                    series: Err(ProviderError::TaskFailed("task aborted".to_string())),
                },
            );
        }

        fetched.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{breakout_bars, raw, ticker, universe, StubProvider};

    fn retriever(provider: StubProvider) -> BatchRetriever {
        retriever_with(provider, 1)
    }

    fn retriever_with(provider: StubProvider, max_concurrent_lots: usize) -> BatchRetriever {
        let config = ScreenConfig {
            pacing_ms: 0,
            lot_timeout_secs: 5,
            max_concurrent_lots,
            ..ScreenConfig::scheduled()
        };
        BatchRetriever::new(Arc::new(provider), &config)
    }

    #[test]
    fn test_partition_sizes_and_order() {
        let universe = universe(&["E", "A", "D", "B", "C"]);
        let lots = partition(&universe, 2);

        assert_eq!(lots.len(), 3);
        assert_eq!(lots[0].symbols, vec![ticker("A"), ticker("B")]);
        assert_eq!(lots[1].symbols, vec![ticker("C"), ticker("D")]);
        assert_eq!(lots[2].symbols, vec![ticker("E")]);
        assert_eq!(lots[2].index, 2);
    }

    #[test]
    fn test_partition_empty_universe() {
        assert!(partition(&Universe::new(), 40).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_lot_isolates_symbols() {
        let mut incomplete = raw(breakout_bars(60, 10.0, 200_000.0, 20_000.0));
        for bar in incomplete.iter_mut() {
            bar.volume = None;
        }

        let provider = StubProvider::new()
            .with("AAA", raw(breakout_bars(60, 10.0, 200_000.0, 20_000.0)))
            .with("BBB", incomplete);
        let lot = Lot {
            index: 0,
            symbols: vec![ticker("AAA"), ticker("BBB"), ticker("CCC")],
        };

        let fetched = retriever(provider).fetch_lot(lot).await;
        let series = fetched.series.unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series[0].1.as_ref().map(WeeklySeries::len), Ok(60));
        assert_eq!(series[1].1, Err(SymbolError::Empty));
        assert_eq!(series[2].1, Err(SymbolError::Absent));
    }

    #[tokio::test]
    async fn test_single_symbol_lot_has_same_shape() {
        let provider =
            StubProvider::new().with("AAA", raw(breakout_bars(60, 10.0, 200_000.0, 20_000.0)));
        let lot = Lot {
            index: 0,
            symbols: vec![ticker("AAA")],
        };

        let series = retriever(provider).fetch_lot(lot).await.series.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].0, ticker("AAA"));
        assert!(series[0].1.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_batches_contains_lot_failure() {
        let provider = StubProvider::new()
            .with("AAA", raw(breakout_bars(60, 10.0, 200_000.0, 20_000.0)))
            .with("CCC", raw(breakout_bars(60, 10.0, 200_000.0, 20_000.0)))
            .failing_lot_with("BBB");

        let fetched = retriever(provider)
            .fetch_batches(&universe(&["AAA", "BBB", "CCC"]), 1)
            .await;

        assert_eq!(fetched.len(), 3);
        assert!(fetched[0].series.is_ok());
        assert!(matches!(fetched[1].series, Err(ProviderError::Rejected(_))));
        assert!(fetched[2].series.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_lot_times_out() {
        let provider = StubProvider::new()
            .with("AAA", raw(breakout_bars(60, 10.0, 200_000.0, 20_000.0)))
            .slow_lot_with("AAA", Duration::from_secs(30));
        let lot = Lot {
            index: 0,
            symbols: vec![ticker("AAA")],
        };

        let fetched = retriever(provider).fetch_lot(lot).await;
        assert!(matches!(fetched.series, Err(ProviderError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetch_keeps_lot_order() {
        let bars = raw(breakout_bars(60, 10.0, 200_000.0, 20_000.0));
        let provider = StubProvider::new()
            .with("AAA", bars.clone())
            .with("BBB", bars.clone())
            .with("CCC", bars)
            .slow_lot_with("AAA", Duration::from_secs(3))
            .failing_lot_with("BBB");

        let fetched = retriever_with(provider, 3)
            .fetch_batches(&universe(&["CCC", "BBB", "AAA"]), 1)
            .await;

        let order: Vec<usize> = fetched.iter().map(|f| f.lot.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(fetched[0].lot.symbols, vec![ticker("AAA")]);
        assert!(fetched[0].series.is_ok());
        assert!(matches!(fetched[1].series, Err(ProviderError::Rejected(_))));
        assert!(fetched[2].series.is_ok());
    }

    #[tokio::test]
    async fn test_concurrency_is_capped_by_lot_count() {
        let provider =
            StubProvider::new().with("AAA", raw(breakout_bars(60, 10.0, 200_000.0, 20_000.0)));

        let fetched = retriever_with(provider, MAX_CONCURRENT_LOTS)
            .fetch_batches(&universe(&["AAA", "BBB"]), 1)
            .await;

        assert_eq!(fetched.len(), 2);
        assert!(fetched.iter().all(|f| f.series.is_ok()));
    }
}
