use async_trait::async_trait;
use std::collections::HashMap;

use crate::{Lookback, ProviderError, RawBar, SourceError, Ticker};

/// A place that publishes ticker symbols (exchange directory, index page, ...).
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Short identifier used in logs.
    fn id(&self) -> &str;

    /// Raw, unsanitized symbols.
    async fn list_symbols(&self) -> Result<Vec<String>, SourceError>;
}

/// Weekly OHLCV history for a batch of symbols.
///
/// Symbols missing from the returned map are expected and simply skipped;
/// an `Err` marks the whole batch as unusable. A batch of one symbol has the
/// same shape as any other batch.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn fetch_weekly_history(
        &self,
        symbols: &[Ticker],
        lookback: Lookback,
    ) -> Result<HashMap<Ticker, Vec<RawBar>>, ProviderError>;
}
