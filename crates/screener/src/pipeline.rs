use chrono::Utc;
use screener_core::{
    ConfigError, HistoryProvider, ListingSource, ScanReport, ScanResult, ScanStats, ScreenConfig,
};
use std::sync::Arc;

use crate::classifier::TierAggregator;
use crate::evaluator::{Evaluator, Indicators, StandardIndicators};
use crate::retriever::{BatchRetriever, LotFetch};
use crate::universe::{build_universe, Universe};

/// Universe → lots → evaluation → tiers, in a single forward pass.
///
/// The scheduled runner and the interactive API both drive this type; they
/// differ only in the [`ScreenConfig`] they pass and in what they do with
/// the [`ScanReport`].
pub struct ScreenPipeline<I = StandardIndicators> {
    retriever: BatchRetriever,
    evaluator: Evaluator<I>,
    config: ScreenConfig,
}

impl ScreenPipeline<StandardIndicators> {
    pub fn new(
        provider: Arc<dyn HistoryProvider>,
        config: ScreenConfig,
    ) -> Result<Self, ConfigError> {
        Self::with_evaluator(provider, config, Evaluator::new())
    }
}

impl<I: Indicators> ScreenPipeline<I> {
    pub fn with_evaluator(
        provider: Arc<dyn HistoryProvider>,
        config: ScreenConfig,
        evaluator: Evaluator<I>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            retriever: BatchRetriever::new(provider, &config),
            evaluator,
            config,
        })
    }

    pub fn config(&self) -> &ScreenConfig {
        &self.config
    }

    /// Build the universe from `sources`, then scan it.
    pub async fn run_with_sources(&self, sources: &[Arc<dyn ListingSource>]) -> ScanReport {
        let universe = build_universe(sources).await;
        self.run(&universe).await
    }

    /// Scan a prepared universe. Data failures never abort the run; they
    /// show up in the report's statistics instead.
    pub async fn run(&self, universe: &Universe) -> ScanReport {
        let started_at = Utc::now();

        tracing::info!(
            "Starting scan of {} tickers in lots of up to {}",
            universe.len(),
            self.config.lot_size
        );

        let fetched = self
            .retriever
            .fetch_batches(universe, self.config.lot_size)
            .await;

        let mut result = ScanResult::default();
        let mut stats = ScanStats {
            universe_size: universe.len(),
            ..Default::default()
        };
        for lot_fetch in fetched {
            let (lot_result, lot_stats) = scan_lot(lot_fetch, &self.evaluator, &self.config);
            result.extend(lot_result);
            stats.merge(lot_stats);
        }

        tracing::info!(
            "Scan complete: {} superstocks, {} watchlist, {} lots skipped, {} symbols skipped",
            result.superstock_count(),
            result.watchlist_count(),
            stats.lots_skipped,
            stats.symbols_skipped()
        );

        ScanReport {
            result,
            stats,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

fn scan_lot<I: Indicators>(
    fetched: LotFetch,
    evaluator: &Evaluator<I>,
    config: &ScreenConfig,
) -> (ScanResult, ScanStats) {
    let LotFetch { lot, series } = fetched;
    let mut stats = ScanStats {
        lots_total: 1,
        ..Default::default()
    };

    let series = match series {
        Ok(series) => series,
        Err(e) => {
            tracing::warn!(
                "Lot {} ({}..{}) unavailable, skipping {} symbols: {}",
                lot.index,
                lot.symbols.first().map(|t| t.as_str()).unwrap_or(""),
                lot.symbols.last().map(|t| t.as_str()).unwrap_or(""),
                lot.symbols.len(),
                e
            );
            stats.lots_skipped = 1;
            stats.symbols_in_skipped_lots = lot.symbols.len();
            return (ScanResult::default(), stats);
        }
    };

    let mut aggregator = TierAggregator::new();

    for (ticker, extracted) in series {
        let series = match extracted {
            Ok(series) => series,
            Err(e) => {
                tracing::debug!("{}: unusable series: {}", ticker, e);
                stats.symbols_unusable += 1;
                continue;
            }
        };

        stats.symbols_evaluated += 1;
        match evaluator.evaluate(&ticker, &series, config) {
            Ok(record) => {
                let tier = aggregator.add(record, config);
                tracing::debug!("{}: accepted as {:?}", ticker, tier);
            }
            Err(rejection) => {
                tracing::debug!("{}: rejected: {}", ticker, rejection);
                stats.record_rejection(&rejection);
            }
        }
    }

    stats.symbols_discarded = aggregator.discarded();

    (aggregator.finish(), stats)
}
