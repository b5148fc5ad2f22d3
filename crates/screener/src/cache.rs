use screener_core::ListingSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::universe::{build_universe, Universe};

struct CachedUniverse {
    built_at: Instant,
    universe: Arc<Universe>,
}

/// Caller-owned universe cache with a fixed time-to-live.
///
/// Listing pages change slowly while interactive scans are rerun often, so
/// the universe is rebuilt only when older than `ttl` or after
/// [`invalidate`](Self::invalidate). Empty universes are never stored.
pub struct UniverseCache {
    ttl: Duration,
    slot: RwLock<Option<CachedUniverse>>,
}

impl UniverseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached universe if still fresh, otherwise a freshly built one.
    pub async fn get_or_build(&self, sources: &[Arc<dyn ListingSource>]) -> Arc<Universe> {
        let cached = self.fresh(&*self.slot.read().await);
        if let Some(universe) = cached {
            tracing::debug!("Universe cache hit ({} tickers)", universe.len());
            return universe;
        }

        let mut slot = self.slot.write().await;
        // Another caller may have rebuilt it while we waited for the lock
        if let Some(universe) = self.fresh(&slot) {
            return universe;
        }

        let universe = Arc::new(build_universe(sources).await);
        if universe.is_empty() {
            tracing::warn!("Universe is empty; not caching it");
            *slot = None;
        } else {
            *slot = Some(CachedUniverse {
                built_at: Instant::now(),
                universe: Arc::clone(&universe),
            });
        }
        universe
    }

    /// Drop the cached universe so the next call rebuilds it.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
        tracing::info!("Universe cache invalidated");
    }

    /// Age of the cached universe, if any.
    pub async fn age(&self) -> Option<Duration> {
        self.slot
            .read()
            .await
            .as_ref()
            .map(|cached| cached.built_at.elapsed())
    }

    fn fresh(&self, slot: &Option<CachedUniverse>) -> Option<Arc<Universe>> {
        slot.as_ref()
            .filter(|cached| cached.built_at.elapsed() < self.ttl)
            .map(|cached| Arc::clone(&cached.universe))
    }
}
