/// Exponential Moving Average.
///
/// Seeded with the simple average of the first `period` values, then
/// `ema = price * k + prev * (1 - k)` with `k = 2 / (period + 1)`.
/// The series is aligned to the input: the first value belongs to index
/// `period - 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmaSeries {
    period: usize,
    values: Vec<f64>,
}

impl EmaSeries {
    /// Compute the full series over `prices` (oldest first).
    /// Returns `None` if there are fewer than `period` values.
    pub fn compute(prices: &[f64], period: usize) -> Option<Self> {
        if period == 0 || prices.len() < period {
            return None;
        }

        let k = 2.0 / (period as f64 + 1.0);
        let seed = prices[..period].iter().sum::<f64>() / period as f64;

        let mut values = Vec::with_capacity(prices.len() - period + 1);
        values.push(seed);

        let mut ema = seed;
        for &price in &prices[period..] {
            ema = price * k + ema * (1.0 - k);
            values.push(ema);
        }

        Some(Self { period, values })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// EMA at input index `index`, or `None` before the seed.
    pub fn at(&self, index: usize) -> Option<f64> {
        index
            .checked_sub(self.period - 1)
            .and_then(|offset| self.values.get(offset))
            .copied()
    }

    /// Index of the first defined value.
    pub fn first_index(&self) -> usize {
        self.period - 1
    }

    /// Number of input values the series was computed from.
    pub fn input_len(&self) -> usize {
        self.values.len() + self.period - 1
    }

    pub fn last(&self) -> f64 {
        // `compute` never builds an empty series.
        self.values[self.values.len() - 1]
    }
}

/// EMA at the latest value.
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    EmaSeries::compute(prices, period).map(|s| s.last())
}
