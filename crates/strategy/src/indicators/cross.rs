use serde::{Deserialize, Serialize};

use super::ema::EmaSeries;

/// A fast average moving through a reference average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cross {
    /// Fast crossed above the reference.
    Golden,
    /// Fast crossed below the reference.
    Death,
}

/// Cross on the bar at `index`, comparing it with `index - 1`.
///
/// "Above" is strict (`fast > reference`), so touching the reference without
/// going through it is not a cross. Returns `None` when either series is
/// undefined at `index - 1` or `index`.
pub fn cross_at(fast: &EmaSeries, reference: &EmaSeries, index: usize) -> Option<Cross> {
    let prev = index.checked_sub(1)?;
    let above_now = fast.at(index)? > reference.at(index)?;
    let above_prev = fast.at(prev)? > reference.at(prev)?;

    match (above_prev, above_now) {
        (false, true) => Some(Cross::Golden),
        (true, false) => Some(Cross::Death),
        _ => None,
    }
}

/// Number of crosses over the last `lookback` bars, the latest bar included.
///
/// Returns `None` if the oldest bar in the lookback has no defined predecessor
/// on both series, i.e. the input is shorter than
/// `max(fast.period, reference.period) + lookback`.
pub fn count_crosses(fast: &EmaSeries, reference: &EmaSeries, lookback: usize) -> Option<usize> {
    let len = fast.input_len().min(reference.input_len());
    if lookback == 0 {
        return Some(0);
    }
    let start = len.checked_sub(lookback)?;
    let first_defined = fast.first_index().max(reference.first_index());
    if start < first_defined + 1 {
        return None;
    }

    Some(
        (start..len)
            .filter(|&i| cross_at(fast, reference, i).is_some())
            .count(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(prices: &[f64], fast: usize, slow: usize) -> (EmaSeries, EmaSeries) {
        (
            EmaSeries::compute(prices, fast).unwrap(),
            EmaSeries::compute(prices, slow).unwrap(),
        )
    }

    #[test]
    fn flat_then_jump_is_a_golden_cross_on_the_last_bar() {
        let mut prices = vec![100.0; 10];
        prices.push(110.0);
        let (fast, slow) = series(&prices, 2, 4);

        assert_eq!(cross_at(&fast, &slow, 10), Some(Cross::Golden));
        assert_eq!(cross_at(&fast, &slow, 9), None);
        assert_eq!(count_crosses(&fast, &slow, 5), Some(1));
    }

    #[test]
    fn drop_then_jump_counts_two_crosses() {
        // Uptrend keeps fast above slow; a sharp drop then a sharp jump
        // produces a death cross followed by a golden cross.
        let mut prices: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let last = *prices.last().unwrap();
        prices.push(last - 10.0);
        prices.push(last + 10.0);
        let (fast, slow) = series(&prices, 2, 4);

        let n = prices.len();
        assert_eq!(cross_at(&fast, &slow, n - 2), Some(Cross::Death));
        assert_eq!(cross_at(&fast, &slow, n - 1), Some(Cross::Golden));
        assert_eq!(count_crosses(&fast, &slow, 20), Some(2));
        assert_eq!(count_crosses(&fast, &slow, 1), Some(1));
    }

    #[test]
    fn count_needs_a_defined_predecessor() {
        let prices: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let (fast, slow) = series(&prices, 2, 4);
        // slow is defined from index 3, so the earliest countable bar is 4:
        // lookback 6 starts at index 4, lookback 7 at index 3.
        assert_eq!(count_crosses(&fast, &slow, 6), Some(0));
        assert_eq!(count_crosses(&fast, &slow, 7), None);
    }
}
