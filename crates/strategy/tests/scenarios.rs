use chrono::{Duration, TimeZone, Utc};
use common::{Candle, Signal};
use strategy::{
    analyze, evaluate, ConditionEntry, ConditionSpec, EmaPeriods, IndicatorSnapshot,
    StrategyConfig,
};

fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                symbol: "BTCUSDT".into(),
                open_time: start + Duration::minutes(i as i64),
                open,
                high: open.max(close),
                low: open.min(close),
                close,
                volume: 1000.0,
                is_closed: true,
            }
        })
        .collect()
}

fn config_with(conditions: Vec<ConditionSpec>) -> StrategyConfig {
    StrategyConfig {
        ema: EmaPeriods {
            fast: 2,
            medium: Some(4),
            slow: None,
        },
        warmup_candles: 0,
        conditions: conditions.into_iter().map(ConditionEntry::from).collect(),
        ..StrategyConfig::named("scenario")
    }
}

#[test]
fn adx_gates_a_confirmed_golden_cross() {
    let config = config_with(vec![
        ConditionSpec::EmaCross {
            price_confirm: true,
        },
        ConditionSpec::AdxThreshold {
            period: 14,
            threshold: 25.0,
        },
    ]);

    // Steady downtrend, then a jump that carries the fast EMA and the close
    // above the medium EMA on the last candle.
    let mut closes: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();
    closes.push(171.0);
    let window = candles_from_closes(&closes);

    let mut weak = IndicatorSnapshot::compute(&config, &window).unwrap();
    weak.adx = 20.0;
    let eval = evaluate(&config, weak, &window).unwrap();
    assert_eq!(eval.signal, Signal::None);
    let adx_check = eval
        .checks
        .iter()
        .find(|c| c.kind == "adx_threshold")
        .unwrap();
    assert!(!adx_check.passed);

    let mut strong = IndicatorSnapshot::compute(&config, &window).unwrap();
    strong.adx = 30.0;
    let eval = evaluate(&config, strong, &window).unwrap();
    assert_eq!(eval.signal, Signal::Long);
}

#[test]
fn choppy_crossing_blocks_entry() {
    // Uptrend, a sharp drop (death cross), then a sharp jump (golden cross):
    // two crosses within the lookback.
    let mut closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
    closes.push(129.0);
    closes.push(149.0);
    let window = candles_from_closes(&closes);

    let limited = config_with(vec![
        ConditionSpec::EmaCross {
            price_confirm: true,
        },
        ConditionSpec::CrossCountLimit {
            lookback: 25,
            max_crosses: 1,
        },
    ]);
    let eval = analyze(&limited, &window).unwrap();
    assert_eq!(eval.snapshot.recent_cross_count, 2);
    assert_eq!(eval.signal, Signal::None);

    let relaxed = config_with(vec![
        ConditionSpec::EmaCross {
            price_confirm: true,
        },
        ConditionSpec::CrossCountLimit {
            lookback: 25,
            max_crosses: 2,
        },
    ]);
    let eval = analyze(&relaxed, &window).unwrap();
    assert_eq!(eval.signal, Signal::Long);
}
