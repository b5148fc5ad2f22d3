//! Weekly base-breakout screen: universe assembly, lot retrieval, the
//! per-symbol technical cascade and tier aggregation.

pub mod cache;
pub mod classifier;
pub mod evaluator;
pub mod pipeline;
pub mod retriever;
pub mod universe;

#[cfg(test)]
mod test_support;

pub use cache::UniverseCache;
pub use classifier::{classify, TierAggregator};
pub use evaluator::{base_window, evaluate, Evaluator, Indicators, StandardIndicators};
pub use pipeline::ScreenPipeline;
pub use retriever::{partition, BatchRetriever, Lot, LotFetch};
pub use universe::{build_universe, sanitize_symbols, StaticSource, Universe};
