use async_trait::async_trait;
use screener_core::{ListingSource, SourceError, Ticker};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Sorted, deduplicated set of tickers to scan.
pub type Universe = BTreeSet<Ticker>;

/// Sanitize raw listing entries and collect them into a universe.
pub fn sanitize_symbols<I, S>(raw: I) -> Universe
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|symbol| Ticker::parse(symbol.as_ref()))
        .collect()
}

/// Query every source and merge what they return.
///
/// A failing source is logged and contributes nothing. If all of them fail
/// the universe is empty, which is a valid (if useless) scan input.
pub async fn build_universe(sources: &[Arc<dyn ListingSource>]) -> Universe {
    let mut tasks = JoinSet::new();

    for source in sources {
        let source = Arc::clone(source);
        tasks.spawn(async move {
            let result = source.list_symbols().await;
            (source.id().to_string(), result)
        });
    }

    let mut universe = Universe::new();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((id, Ok(raw))) => {
                let raw_count = raw.len();
                let symbols = sanitize_symbols(raw);
                tracing::info!(
                    "Listing source {}: {} symbols ({} raw entries)",
                    id,
                    symbols.len(),
                    raw_count
                );
                universe.extend(symbols);
            }
            Ok((id, Err(e))) => {
                tracing::warn!("Listing source {} unavailable: {}", id, e);
            }
            Err(e) => {
                tracing::error!("Listing source task failed: {}", e);
            }
        }
    }

    tracing::info!("Universe: {} tickers", universe.len());
    universe
}

/// Fixed list of symbols, e.g. given on the command line.
pub struct StaticSource {
    id: String,
    symbols: Vec<String>,
}

impl StaticSource {
    pub fn new(id: impl Into<String>, symbols: Vec<String>) -> Self {
        Self {
            id: id.into(),
            symbols,
        }
    }
}

#[async_trait]
impl ListingSource for StaticSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_symbols(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.symbols.clone())
    }
}
