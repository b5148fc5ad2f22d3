use screener_core::WeeklyBar;

/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result.push(sum / period as f64);
    }
    result
}

/// SMA of the `period` values ending at `index` (inclusive).
///
/// `None` when fewer than `period` values are available at that point.
pub fn sma_at(data: &[f64], period: usize, index: usize) -> Option<f64> {
    if period == 0 || index >= data.len() || index + 1 < period {
        return None;
    }
    sma(&data[index + 1 - period..=index], period)
        .first()
        .copied()
        .filter(|avg| avg.is_finite())
}

/// Arithmetic mean; `None` for an empty slice or a non-finite result.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let avg = data.iter().sum::<f64>() / data.len() as f64;
    avg.is_finite().then_some(avg)
}

/// Highest high and lowest low over the bars.
pub fn price_range(bars: &[WeeklyBar]) -> Option<(f64, f64)> {
    let highest = bars.iter().map(|b| b.high).reduce(f64::max)?;
    let lowest = bars.iter().map(|b| b.low).reduce(f64::min)?;
    Some((highest, lowest))
}

/// High-low spread of the bars as a percentage of the lowest low.
///
/// Undefined (`None`) for an empty window or a lowest low of zero.
pub fn range_pct(bars: &[WeeklyBar]) -> Option<f64> {
    let (highest, lowest) = price_range(bars)?;
    if lowest <= 0.0 {
        return None;
    }
    let pct = (highest - lowest) / lowest * 100.0;
    pct.is_finite().then_some(pct)
}

/// Whether the last close crossed strictly above its SMA, having been at or
/// below it one bar earlier.
///
/// `None` when either average cannot be computed.
pub fn crossed_above_sma(closes: &[f64], period: usize) -> Option<bool> {
    let last = closes.len().checked_sub(1)?;
    let prev = last.checked_sub(1)?;

    let sma_last = sma_at(closes, period, last)?;
    let sma_prev = sma_at(closes, period, prev)?;

    Some(closes[last] > sma_last && closes[prev] <= sma_prev)
}

/// Last volume divided by the mean of the `lookback` volumes right before it.
///
/// `None` when there is not enough history or the reference mean is zero.
pub fn volume_ratio(volumes: &[f64], lookback: usize) -> Option<f64> {
    let last = volumes.len().checked_sub(1)?;
    if lookback == 0 || last < lookback {
        return None;
    }

    let reference = mean(&volumes[last - lookback..last])?;
    if reference <= 0.0 {
        return None;
    }

    let ratio = volumes[last] / reference;
    ratio.is_finite().then_some(ratio)
}
