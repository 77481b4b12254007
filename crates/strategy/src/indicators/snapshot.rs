use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use common::{Candle, Error, Result};

use super::{
    adx::calculate_adx,
    atr::{annualized_volatility_pct, calculate_atr},
    cross::count_crosses,
    ema::EmaSeries,
    volume::{volume_average, volume_ratio},
};
use crate::config::{EmaRole, StrategyConfig};

/// Indicator values at the latest candle of a window.
///
/// Computed fresh per evaluation and never persisted. The periods used are
/// recorded alongside the values so conditions configured with a different
/// period know to recompute instead of reading the wrong number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ema: BTreeMap<EmaRole, f64>,
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
    pub atr: f64,
    pub atr_annualized_pct: f64,
    pub volume_avg: f64,
    pub current_volume: f64,
    pub volume_ratio: f64,
    pub recent_cross_count: usize,
    pub close: f64,

    pub adx_period: usize,
    pub atr_period: usize,
    pub volume_period: usize,
    pub cross_lookback: usize,

    /// Series the cross count was read from, reused by cross conditions.
    #[serde(skip)]
    pub(crate) crossing: Option<CrossingSeries>,
}

/// Fast and cross-reference EMA series over the snapshot's window.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CrossingSeries {
    pub fast: EmaSeries,
    pub reference: EmaSeries,
}

impl CrossingSeries {
    /// True when both series were computed with these periods over a window
    /// of `len` values.
    pub fn matches(&self, fast: usize, reference: usize, len: usize) -> bool {
        self.fast.period() == fast
            && self.reference.period() == reference
            && self.fast.input_len() == len
            && self.reference.input_len() == len
    }
}

impl IndicatorSnapshot {
    /// Compute every indicator the strategy needs over `candles` (oldest first).
    ///
    /// Fails with `InsufficientData` when the window is shorter than
    /// [`StrategyConfig::required_candles`]; no partial snapshot is returned.
    pub fn compute(config: &StrategyConfig, candles: &[Candle]) -> Result<Self> {
        let required = config.required_candles();
        let insufficient = || Error::InsufficientData {
            required,
            available: candles.len(),
        };
        if candles.len() < required {
            return Err(insufficient());
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let latest = candles.last().ok_or_else(insufficient)?;

        let mut series = BTreeMap::new();
        for (role, period) in config.ema.defined() {
            let s = EmaSeries::compute(&closes, period).ok_or_else(insufficient)?;
            series.insert(role, s);
        }
        let ema = series.iter().map(|(role, s)| (*role, s.last())).collect();

        let cross_lookback = config.cross_lookback();
        let recent_cross_count = match (
            series.get(&EmaRole::Fast),
            series.get(&config.cross_reference),
        ) {
            (Some(fast), Some(reference)) => {
                count_crosses(fast, reference, cross_lookback).ok_or_else(insufficient)?
            }
            _ => 0,
        };
        let crossing = match (
            series.remove(&EmaRole::Fast),
            series.remove(&config.cross_reference),
        ) {
            (Some(fast), Some(reference)) => Some(CrossingSeries { fast, reference }),
            _ => None,
        };

        let adx_period = config.snapshot_adx_period();
        let adx = calculate_adx(candles, adx_period).ok_or_else(insufficient)?;

        let atr_period = config.atr_period;
        let atr = calculate_atr(candles, atr_period).ok_or_else(insufficient)?;

        let volume_period = config.snapshot_volume_period();
        let volume_avg = volume_average(candles, volume_period).ok_or_else(insufficient)?;

        Ok(Self {
            ema,
            adx: adx.adx,
            plus_di: adx.plus_di,
            minus_di: adx.minus_di,
            atr,
            atr_annualized_pct: annualized_volatility_pct(
                atr,
                latest.close,
                config.candle_interval_minutes,
            ),
            volume_avg,
            current_volume: latest.volume,
            volume_ratio: volume_ratio(latest.volume, volume_avg),
            recent_cross_count,
            close: latest.close,
            adx_period,
            atr_period,
            volume_period,
            cross_lookback,
            crossing,
        })
    }

    pub fn ema(&self, role: EmaRole) -> Option<f64> {
        self.ema.get(&role).copied()
    }
}
