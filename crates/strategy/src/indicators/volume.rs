use common::Candle;

/// Simple average volume over the `period` candles before the latest one.
///
/// The latest candle may still be forming, so it never contributes to its
/// own baseline. Returns `None` if there are fewer than `period + 1` candles.
pub fn volume_average(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let end = candles.len() - 1;
    let baseline = &candles[end - period..end];
    Some(baseline.iter().map(|c| c.volume).sum::<f64>() / period as f64)
}

/// Current volume as a multiple of its average; 0 when the average is 0.
pub fn volume_ratio(current: f64, average: f64) -> f64 {
    if average > 0.0 {
        current / average
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::candles_from_closes;

    fn with_volumes(volumes: &[f64]) -> Vec<Candle> {
        let mut candles = candles_from_closes(&vec![100.0; volumes.len()]);
        for (candle, &v) in candles.iter_mut().zip(volumes) {
            candle.volume = v;
        }
        candles
    }

    #[test]
    fn average_excludes_the_latest_candle() {
        let candles = with_volumes(&[10.0, 20.0, 30.0, 1000.0]);
        assert_eq!(volume_average(&candles, 3), Some(20.0));
        assert_eq!(volume_average(&candles, 2), Some(25.0));
    }

    #[test]
    fn average_needs_period_plus_one() {
        let candles = with_volumes(&[10.0, 20.0, 30.0]);
        assert_eq!(volume_average(&candles, 3), None);
    }

    #[test]
    fn ratio_of_zero_average_is_zero() {
        assert_eq!(volume_ratio(500.0, 0.0), 0.0);
        assert_eq!(volume_ratio(60.0, 20.0), 3.0);
    }
}
