use screener_core::{
    CandidateRecord, Rejection, ScreenConfig, Ticker, WeeklyBar, WeeklySeries, MIN_SERIES_LEN,
    VOLUME_LOOKBACK_WEEKS,
};

/// Numeric building blocks of the cascade.
///
/// Kept behind a trait so the cascade can be driven with instrumented
/// implementations; production code uses [`StandardIndicators`].
pub trait Indicators: Send + Sync {
    /// High-low spread of the base window in percent of its lowest low.
    fn base_range_pct(&self, window: &[WeeklyBar]) -> Option<f64>;

    /// Fresh upward cross of the close over its `period` SMA on the last bar.
    fn crossed_above_sma(&self, closes: &[f64], period: usize) -> Option<bool>;

    /// Last volume over the mean of the `lookback` volumes before it.
    fn volume_ratio(&self, volumes: &[f64], lookback: usize) -> Option<f64>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardIndicators;

impl Indicators for StandardIndicators {
    fn base_range_pct(&self, window: &[WeeklyBar]) -> Option<f64> {
        technical_analysis::range_pct(window)
    }

    fn crossed_above_sma(&self, closes: &[f64], period: usize) -> Option<bool> {
        technical_analysis::crossed_above_sma(closes, period)
    }

    fn volume_ratio(&self, volumes: &[f64], lookback: usize) -> Option<f64> {
        technical_analysis::volume_ratio(volumes, lookback)
    }
}

/// Runs the ordered gate cascade over one symbol's series.
#[derive(Debug, Clone, Default)]
pub struct Evaluator<I = StandardIndicators> {
    indicators: I,
}

impl Evaluator<StandardIndicators> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<I: Indicators> Evaluator<I> {
    pub fn with_indicators(indicators: I) -> Self {
        Self { indicators }
    }

    pub fn indicators(&self) -> &I {
        &self.indicators
    }

    /// Evaluate one series. The first failing gate decides the rejection;
    /// later gates are never computed.
    pub fn evaluate(
        &self,
        ticker: &Ticker,
        series: &WeeklySeries,
        config: &ScreenConfig,
    ) -> Result<CandidateRecord, Rejection> {
        let bars = series.bars();
        let too_short = Rejection::InsufficientHistory {
            len: bars.len(),
            required: MIN_SERIES_LEN,
        };

        // 1. length
        if bars.len() < MIN_SERIES_LEN {
            return Err(too_short);
        }
        let last = bars.last().ok_or(too_short)?;

        // 2. price band
        if !(config.price_min <= last.close && last.close <= config.price_max) {
            return Err(Rejection::PriceOutOfBand(last.close));
        }

        // 3. liquidity
        if last.volume < config.min_weekly_volume {
            return Err(Rejection::Illiquid(last.volume));
        }

        // 4. base tightness
        let base = base_window(bars, config.base_weeks).ok_or(Rejection::BaseUndefined)?;
        let base_range = self
            .indicators
            .base_range_pct(base)
            .ok_or(Rejection::BaseUndefined)?;
        if base_range > config.base_max_range_pct {
            return Err(Rejection::BaseTooWide(base_range));
        }

        // 5. fresh SMA crossover
        if self.indicators.crossed_above_sma(&series.closes(), config.sma_window) != Some(true) {
            return Err(Rejection::NoCrossover);
        }

        // 6. volume surge
        let ratio = self
            .indicators
            .volume_ratio(&series.volumes(), VOLUME_LOOKBACK_WEEKS)
            .ok_or(Rejection::VolumeRatioUndefined)?;

        Ok(CandidateRecord::new(ticker.clone(), last.close, base_range, ratio))
    }
}

/// Evaluate with the standard indicators.
pub fn evaluate(
    ticker: &Ticker,
    series: &WeeklySeries,
    config: &ScreenConfig,
) -> Result<CandidateRecord, Rejection> {
    Evaluator::new().evaluate(ticker, series, config)
}

/// The `base_weeks` bars immediately before the last bar.
///
/// `None` when the history cannot supply the full window.
pub fn base_window(bars: &[WeeklyBar], base_weeks: usize) -> Option<&[WeeklyBar]> {
    if base_weeks == 0 {
        return None;
    }
    let last = bars.len().checked_sub(1)?;
    let start = last.checked_sub(base_weeks)?;
    bars.get(start..last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{breakout_bars, series, ticker, CountingIndicators};
    use approx::assert_relative_eq;

    fn config() -> ScreenConfig {
        ScreenConfig {
            pacing_ms: 0,
            ..ScreenConfig::scheduled()
        }
    }

    #[test]
    fn test_breakout_is_accepted() {
        let bars = series(breakout_bars(60, 10.0, 200_000.0, 20_000.0));
        let record = evaluate(&ticker("AAA"), &bars, &config()).unwrap();

        assert_eq!(record.ticker.as_str(), "AAA");
        assert_eq!(record.last_close, 10.0);
        assert_eq!(record.base_range_pct, "12.0%");
        assert_eq!(record.volume_ratio, 10.0);
        assert_relative_eq!(record.surge_ratio(), 10.0);
    }

    #[test]
    fn test_length_gate() {
        let short = series(breakout_bars(50, 10.0, 200_000.0, 20_000.0));
        assert_eq!(
            evaluate(&ticker("AAA"), &short, &config()),
            Err(Rejection::InsufficientHistory { len: 50, required: 51 })
        );

        let exact = series(breakout_bars(51, 10.0, 200_000.0, 20_000.0));
        assert!(evaluate(&ticker("AAA"), &exact, &config()).is_ok());
    }

    #[test]
    fn test_price_band_is_inclusive() {
        let at_max = series(breakout_bars(60, 15.0, 200_000.0, 20_000.0));
        // 15.0 breaks out of a 9.0 base: the base gate passes, the band is inclusive
        assert!(evaluate(&ticker("AAA"), &at_max, &config()).is_ok());

        let above = series(breakout_bars(60, 15.01, 200_000.0, 20_000.0));
        assert_eq!(
            evaluate(&ticker("AAA"), &above, &config()),
            Err(Rejection::PriceOutOfBand(15.01))
        );
    }

    #[test]
    fn test_liquidity_gate() {
        let thin = series(breakout_bars(60, 10.0, 99_999.0, 20_000.0));
        assert_eq!(
            evaluate(&ticker("AAA"), &thin, &config()),
            Err(Rejection::Illiquid(99_999.0))
        );
    }

    #[test]
    fn test_base_too_wide() {
        let mut bars = breakout_bars(60, 10.0, 200_000.0, 20_000.0);
        let n = bars.len();
        bars[n - 10].high = 12.0; // (12.0 - 8.5) / 8.5 = 41%

        assert!(matches!(
            evaluate(&ticker("AAA"), &series(bars), &config()),
            Err(Rejection::BaseTooWide(_))
        ));
    }

    #[test]
    fn test_base_window_excludes_last_bar_and_older_bars() {
        let mut bars = breakout_bars(60, 10.0, 200_000.0, 20_000.0);
        let n = bars.len();
        // Outside the 20-bar window on both sides: must not matter
        bars[n - 22].high = 30.0;
        bars[n - 1].high = 30.0;

        assert!(evaluate(&ticker("AAA"), &series(bars), &config()).is_ok());
    }

    #[test]
    fn test_base_window_bounds() {
        let bars = breakout_bars(60, 10.0, 200_000.0, 20_000.0);

        let window = base_window(&bars, 20).unwrap();
        assert_eq!(window.len(), 20);
        assert_eq!(window.first().unwrap().period_end, bars[39].period_end);
        assert_eq!(window.last().unwrap().period_end, bars[58].period_end);

        assert_eq!(base_window(&bars, 59).unwrap().len(), 59);
        assert!(base_window(&bars, 60).is_none());
        assert!(base_window(&bars, 0).is_none());
    }

    #[test]
    fn test_base_longer_than_history_is_rejected() {
        let config = ScreenConfig {
            base_weeks: 52,
            ..config()
        };
        let bars = series(breakout_bars(52, 10.0, 200_000.0, 20_000.0));

        assert_eq!(evaluate(&ticker("AAA"), &bars, &config), Err(Rejection::BaseUndefined));
    }

    #[test]
    fn test_zero_low_in_base_is_rejected() {
        let mut bars = breakout_bars(60, 10.0, 200_000.0, 20_000.0);
        let n = bars.len();
        bars[n - 5].low = 0.0;

        assert_eq!(
            evaluate(&ticker("AAA"), &series(bars), &config()),
            Err(Rejection::BaseUndefined)
        );
    }

    #[test]
    fn test_sustained_trend_is_not_a_crossover() {
        let mut bars = breakout_bars(60, 10.0, 200_000.0, 20_000.0);
        let n = bars.len();
        // Second-to-last close already above its average
        bars[n - 2].close = 9.4;

        assert_eq!(
            evaluate(&ticker("AAA"), &series(bars), &config()),
            Err(Rejection::NoCrossover)
        );
    }

    #[test]
    fn test_zero_prior_volume_is_rejected() {
        let bars = breakout_bars(60, 10.0, 200_000.0, 0.0);
        assert_eq!(
            evaluate(&ticker("AAA"), &series(bars), &config()),
            Err(Rejection::VolumeRatioUndefined)
        );
    }

    #[test]
    fn test_price_rejection_short_circuits_later_gates() {
        let evaluator = Evaluator::with_indicators(CountingIndicators::default());
        let expensive = series(breakout_bars(60, 40.0, 200_000.0, 20_000.0));

        let outcome = evaluator.evaluate(&ticker("AAA"), &expensive, &config());

        assert_eq!(outcome, Err(Rejection::PriceOutOfBand(40.0)));
        assert_eq!(evaluator.indicators().base_calls(), 0);
        assert_eq!(evaluator.indicators().crossover_calls(), 0);
        assert_eq!(evaluator.indicators().ratio_calls(), 0);
    }

    #[test]
    fn test_accepted_symbol_computes_each_indicator_once() {
        let evaluator = Evaluator::with_indicators(CountingIndicators::default());
        let good = series(breakout_bars(60, 10.0, 200_000.0, 20_000.0));

        assert!(evaluator.evaluate(&ticker("AAA"), &good, &config()).is_ok());
        assert_eq!(evaluator.indicators().base_calls(), 1);
        assert_eq!(evaluator.indicators().crossover_calls(), 1);
        assert_eq!(evaluator.indicators().ratio_calls(), 1);
    }
}
