use chrono::{Duration, TimeZone, Utc};
use common::{Candle, Error};
use proptest::prelude::*;
use strategy::indicators::{calculate_adx, calculate_atr, calculate_ema, EmaSeries};
use strategy::{IndicatorSnapshot, StrategyConfig};

fn candles(closes: &[f64], spreads: &[f64]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .zip(spreads.iter().cycle())
        .enumerate()
        .map(|(i, (&close, &spread))| Candle {
            symbol: "PROPUSDT".into(),
            open_time: start + Duration::minutes(i as i64),
            open: close,
            high: close + spread,
            low: (close - spread).max(0.0),
            close,
            volume: 1000.0 + spread,
            is_closed: true,
        })
        .collect()
}

fn price_path() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0f64..100_000.0f64, 1..400)
}

proptest! {
    /// Identical windows give bit-for-bit identical indicator values.
    #[test]
    fn indicators_are_deterministic(
        closes in price_path(),
        spreads in prop::collection::vec(0.0f64..50.0f64, 1..20),
        period in 1usize..40,
    ) {
        let window = candles(&closes, &spreads);
        prop_assert_eq!(
            calculate_ema(&closes, period).map(f64::to_bits),
            calculate_ema(&closes, period).map(f64::to_bits)
        );
        prop_assert_eq!(
            calculate_atr(&window, period).map(f64::to_bits),
            calculate_atr(&window, period).map(f64::to_bits)
        );
        prop_assert_eq!(calculate_adx(&window, period), calculate_adx(&window, period));
    }

    /// EMA stays within the range of its inputs.
    #[test]
    fn ema_is_bounded_by_inputs(closes in price_path(), period in 1usize..60) {
        if let Some(series) = EmaSeries::compute(&closes, period) {
            let min = closes.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = closes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let last = series.last();
            prop_assert!(last >= min - 1e-6 && last <= max + 1e-6);
        } else {
            prop_assert!(closes.len() < period);
        }
    }

    /// ADX and the directional indices stay within 0..=100 and are never NaN.
    #[test]
    fn adx_is_bounded(
        closes in price_path(),
        spreads in prop::collection::vec(0.0f64..50.0f64, 1..20),
        period in 1usize..30,
    ) {
        let window = candles(&closes, &spreads);
        match calculate_adx(&window, period) {
            Some(out) => {
                for v in [out.adx, out.plus_di, out.minus_di] {
                    prop_assert!(!v.is_nan());
                    prop_assert!((0.0..=100.0 + 1e-9).contains(&v), "out of range: {}", v);
                }
            }
            None => prop_assert!(window.len() < period + 1),
        }
    }

    /// Short windows are rejected with InsufficientData, never a partial snapshot.
    #[test]
    fn short_windows_are_rejected(len in 0usize..250) {
        let config = StrategyConfig::named("defaults");
        let required = config.required_candles();
        prop_assume!(len < required);

        let closes: Vec<f64> = (0..len).map(|i| 100.0 + (i % 7) as f64).collect();
        let result = IndicatorSnapshot::compute(&config, &candles(&closes, &[1.0]));
        match result {
            Err(Error::InsufficientData { required: r, available }) => {
                prop_assert_eq!(r, required);
                prop_assert_eq!(available, len);
            }
            other => prop_assert!(false, "expected InsufficientData, got {:?}", other),
        }
    }
}
