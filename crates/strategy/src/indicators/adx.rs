/// Average Directional Index (ADX) - Measures trend strength
///
/// ADX ranges from 0 to 100:
/// - ADX > 25: Strong trend (bull or bear)
/// - ADX < 20: Weak trend / choppy / ranging market
///
/// +DM, -DM and TR are Wilder-smoothed from the sum of their first `period`
/// values. ADX is the Wilder-smoothed DX, seeded with the mean of the first
/// `period` DX values, or of every available DX value when fewer exist.
use serde::{Deserialize, Serialize};

use common::Candle;

use super::atr::true_range;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdxOutput {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

/// Calculate ADX, +DI and -DI at the latest candle.
///
/// Returns `None` if there are fewer than `period + 1` candles.
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<AdxOutput> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let mut true_ranges = Vec::with_capacity(candles.len() - 1);
    let mut plus_dms = Vec::with_capacity(candles.len() - 1);
    let mut minus_dms = Vec::with_capacity(candles.len() - 1);

    for w in candles.windows(2) {
        let (prev, current) = (&w[0], &w[1]);
        true_ranges.push(true_range(prev, current));

        let up_move = current.high - prev.high;
        let down_move = prev.low - current.low;

        plus_dms.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dms.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
    }

    let p = period as f64;
    let mut smoothed_tr: f64 = true_ranges[..period].iter().sum();
    let mut smoothed_plus: f64 = plus_dms[..period].iter().sum();
    let mut smoothed_minus: f64 = minus_dms[..period].iter().sum();

    let mut latest = directional(smoothed_plus, smoothed_minus, smoothed_tr);
    let mut dx_values = Vec::with_capacity(true_ranges.len() - period + 1);
    dx_values.push(latest.dx);

    for i in period..true_ranges.len() {
        smoothed_tr = smoothed_tr - smoothed_tr / p + true_ranges[i];
        smoothed_plus = smoothed_plus - smoothed_plus / p + plus_dms[i];
        smoothed_minus = smoothed_minus - smoothed_minus / p + minus_dms[i];

        latest = directional(smoothed_plus, smoothed_minus, smoothed_tr);
        dx_values.push(latest.dx);
    }

    let seed_len = period.min(dx_values.len());
    let mut adx = dx_values[..seed_len].iter().sum::<f64>() / seed_len as f64;
    for dx in &dx_values[seed_len..] {
        adx = (adx * (p - 1.0) + dx) / p;
    }

    Some(AdxOutput {
        adx,
        plus_di: latest.plus_di,
        minus_di: latest.minus_di,
    })
}

struct Directional {
    plus_di: f64,
    minus_di: f64,
    dx: f64,
}

/// Zero denominators (flat prices) define the ratios as zero.
fn directional(smoothed_plus: f64, smoothed_minus: f64, smoothed_tr: f64) -> Directional {
    let (plus_di, minus_di) = if smoothed_tr > 0.0 {
        (
            smoothed_plus / smoothed_tr * 100.0,
            smoothed_minus / smoothed_tr * 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    let di_sum = plus_di + minus_di;
    let dx = if di_sum > 0.0 {
        (plus_di - minus_di).abs() / di_sum * 100.0
    } else {
        0.0
    };

    Directional {
        plus_di,
        minus_di,
        dx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::candles_from_ohlc;

    #[test]
    fn adx_strong_uptrend() {
        let ohlc: Vec<_> = (0..40)
            .map(|i| {
                let base = 100.0 + i as f64 * 3.0;
                (base, base + 5.0, base - 1.0, base + 3.0)
            })
            .collect();
        let out = calculate_adx(&candles_from_ohlc(&ohlc), 14).unwrap();

        assert!(out.plus_di > out.minus_di, "+DI should be > -DI in uptrend");
        assert!(out.adx > 25.0, "ADX should signal a trend, got {:.2}", out.adx);
    }

    #[test]
    fn adx_strong_downtrend() {
        let ohlc: Vec<_> = (0..40)
            .map(|i| {
                let base = 300.0 - i as f64 * 3.0;
                (base, base + 1.0, base - 5.0, base - 3.0)
            })
            .collect();
        let out = calculate_adx(&candles_from_ohlc(&ohlc), 14).unwrap();

        assert!(out.minus_di > out.plus_di);
        assert!(out.adx > 25.0);
    }

    #[test]
    fn adx_of_flat_prices_is_zero_not_nan() {
        let candles = candles_from_ohlc(&[(100.0, 100.0, 100.0, 100.0); 30]);
        let out = calculate_adx(&candles, 14).unwrap();
        assert_eq!(out.adx, 0.0);
        assert_eq!(out.plus_di, 0.0);
        assert_eq!(out.minus_di, 0.0);
    }

    #[test]
    fn adx_needs_period_plus_one_candles() {
        let candles = candles_from_ohlc(&[(100.0, 102.0, 99.0, 101.0); 14]);
        assert!(calculate_adx(&candles, 14).is_none());

        let candles = candles_from_ohlc(&[(100.0, 102.0, 99.0, 101.0); 15]);
        assert!(calculate_adx(&candles, 14).is_some());
    }
}
