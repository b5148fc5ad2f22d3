use screener_core::{CandidateRecord, ScanResult, ScreenConfig, Tier};

/// Tier for an accepted record, by its unrounded volume ratio.
pub fn classify(record: &CandidateRecord, config: &ScreenConfig) -> Tier {
    let ratio = record.surge_ratio();
    if ratio >= config.superstock_ratio {
        Tier::Superstock
    } else if ratio >= config.watchlist_ratio {
        Tier::Watchlist
    } else {
        Tier::Discard
    }
}

/// Appends classified records to their tier in arrival order.
#[derive(Debug, Default)]
pub struct TierAggregator {
    result: ScanResult,
    discarded: usize,
}

impl TierAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: CandidateRecord, config: &ScreenConfig) -> Tier {
        let tier = classify(&record, config);
        if !self.result.push(tier, record) {
            self.discarded += 1;
        }
        tier
    }

    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn finish(self) -> ScanResult {
        self.result
    }
}
