/// Average True Range (ATR), Wilder-smoothed.
///
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
use common::Candle;

/// Minutes in a 365-day year.
pub const MINUTES_PER_YEAR: f64 = 365.0 * 24.0 * 60.0;

pub(crate) fn true_range(prev: &Candle, current: &Candle) -> f64 {
    (current.high - current.low)
        .max((current.high - prev.close).abs())
        .max((current.low - prev.close).abs())
}

/// Calculate ATR at the latest candle.
///
/// Returns `None` if there are fewer than `period + 1` candles.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| true_range(&w[0], &w[1]))
        .collect();

    // First ATR is the simple average of the first `period` true ranges
    let mut atr = true_ranges[..period].iter().sum::<f64>() / period as f64;
    for tr in &true_ranges[period..] {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
    }

    Some(atr)
}

/// Annualised volatility in percent:
/// `(atr / close) * sqrt(minutes_per_year / interval_minutes) * 100`.
///
/// A non-positive close or interval yields 0 rather than a division fault.
pub fn annualized_volatility_pct(atr: f64, close: f64, interval_minutes: u32) -> f64 {
    if close <= 0.0 || interval_minutes == 0 {
        return 0.0;
    }
    let periods_per_year = MINUTES_PER_YEAR / interval_minutes as f64;
    (atr / close) * periods_per_year.sqrt() * 100.0
}
