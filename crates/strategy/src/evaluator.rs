use std::borrow::Cow;

use serde::Serialize;
use tracing::{debug, warn};

use common::{Candle, Error, Result, Side, Signal};

use crate::config::{ConditionSpec, EmaRole, PriceSide, StrategyConfig};
use crate::indicators::{
    calculate_adx, count_crosses, cross_at, volume_average, Cross, CrossingSeries, EmaSeries,
    IndicatorSnapshot,
};

/// Result of one evaluation: the signal plus everything needed to audit it.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub signal: Signal,
    pub snapshot: IndicatorSnapshot,
    pub checks: Vec<ConditionCheck>,
    pub diagnostic: Option<Diagnostic>,
}

impl Evaluation {
    pub fn checks_for(&self, side: Side) -> impl Iterator<Item = &ConditionCheck> {
        self.checks.iter().filter(move |c| c.direction == side)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionCheck {
    pub kind: &'static str,
    pub direction: Side,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Both directions passed every enabled condition on the same candle.
    Ambiguous { strategy: String },
}

/// Validate, snapshot and evaluate in one step.
pub fn analyze(config: &StrategyConfig, window: &[Candle]) -> Result<Evaluation> {
    config.validate()?;
    let snapshot = IndicatorSnapshot::compute(config, window)?;
    evaluate(config, snapshot, window)
}

/// Evaluate every enabled condition for LONG and SHORT independently.
///
/// A direction fires only when it has at least one enabled condition and all
/// of them pass. When both directions fire the result is `Signal::None` with
/// [`Diagnostic::Ambiguous`].
pub fn evaluate(
    config: &StrategyConfig,
    snapshot: IndicatorSnapshot,
    window: &[Candle],
) -> Result<Evaluation> {
    config.validate()?;

    let required = config.required_candles();
    if window.len() < required {
        return Err(Error::InsufficientData {
            required,
            available: window.len(),
        });
    }

    let ctx = Context::new(config, &snapshot, window)?;

    let mut checks = Vec::new();
    let mut qualified = Vec::with_capacity(2);

    for side in [Side::Long, Side::Short] {
        if !config.direction.allows(side) {
            continue;
        }

        let mut all_passed = true;
        let mut evaluated = 0;
        for condition in config.enabled_conditions() {
            let check = ctx.check(condition, side)?;
            debug!(
                strategy = %config.name,
                direction = %side,
                kind = check.kind,
                passed = check.passed,
                detail = %check.detail,
                "Condition evaluated"
            );
            all_passed &= check.passed;
            evaluated += 1;
            checks.push(check);
        }

        if evaluated > 0 && all_passed {
            qualified.push(side);
        }
    }

    let (signal, diagnostic) = match qualified.as_slice() {
        [side] => (Signal::from(*side), None),
        [] => (Signal::None, None),
        _ => {
            warn!(
                strategy = %config.name,
                "Both LONG and SHORT conditions passed; returning NONE"
            );
            (
                Signal::None,
                Some(Diagnostic::Ambiguous {
                    strategy: config.name.clone(),
                }),
            )
        }
    };

    Ok(Evaluation {
        signal,
        snapshot,
        checks,
        diagnostic,
    })
}

/// Inputs shared by every condition of one evaluation.
struct Context<'a> {
    snapshot: &'a IndicatorSnapshot,
    window: &'a [Candle],
    /// Fast and reference series, present when the reference role is defined.
    crossing: Option<Cow<'a, CrossingSeries>>,
    last: usize,
}

impl<'a> Context<'a> {
    fn new(
        config: &StrategyConfig,
        snapshot: &'a IndicatorSnapshot,
        window: &'a [Candle],
    ) -> Result<Self> {
        let crossing = match config.ema.period(config.cross_reference) {
            Some(reference) => match &snapshot.crossing {
                Some(c) if c.matches(config.ema.fast, reference, window.len()) => {
                    Some(Cow::Borrowed(c))
                }
                // Deserialised snapshot or one computed for another config.
                _ => Some(Cow::Owned(crossing_series(window, config.ema.fast, reference)?)),
            },
            None => None,
        };

        Ok(Self {
            snapshot,
            window,
            crossing,
            last: window.len() - 1,
        })
    }

    fn crossing(&self) -> Result<(&EmaSeries, &EmaSeries)> {
        self.crossing
            .as_deref()
            .map(|c| (&c.fast, &c.reference))
            .ok_or_else(|| Error::InvalidConfig("cross reference ema is not defined".into()))
    }

    fn check(&self, condition: &ConditionSpec, side: Side) -> Result<ConditionCheck> {
        let close = self.snapshot.close;

        let (passed, detail) = match condition {
            ConditionSpec::EmaCross { price_confirm } => {
                let (fast, reference) = self.crossing()?;
                let wanted = match side {
                    Side::Long => Cross::Golden,
                    Side::Short => Cross::Death,
                };
                let cross = cross_at(fast, reference, self.last);
                let reference_now = reference.last();
                let confirmed = match side {
                    Side::Long => close > reference_now,
                    Side::Short => close < reference_now,
                };

                if cross != Some(wanted) {
                    (false, format!("no {wanted:?} cross on latest candle ({cross:?})"))
                } else if *price_confirm && !confirmed {
                    (
                        false,
                        format!("{wanted:?} cross but close {close} not beyond reference {reference_now:.4}"),
                    )
                } else {
                    (true, format!("{wanted:?} cross, close {close}, reference {reference_now:.4}"))
                }
            }

            ConditionSpec::PriceVsEma { role, side: wanted } => {
                let ema = self.snapshot.ema(*role).ok_or_else(|| undefined_role(*role))?;
                let passed = match (side, wanted) {
                    (Side::Long, PriceSide::Above) => close > ema,
                    (Side::Short, PriceSide::Below) => close < ema,
                    _ => false,
                };
                (passed, format!("close {close} vs {role} ema {ema:.4} ({wanted:?})"))
            }

            ConditionSpec::AdxThreshold { period, threshold } => {
                let adx = if *period == self.snapshot.adx_period {
                    self.snapshot.adx
                } else {
                    calculate_adx(self.window, *period)
                        .ok_or_else(|| self.insufficient(period + 1))?
                        .adx
                };
                (adx >= *threshold, format!("adx({period}) {adx:.2} vs {threshold}"))
            }

            ConditionSpec::VolumeSurge { period, multiplier } => {
                let average = if *period == self.snapshot.volume_period {
                    self.snapshot.volume_avg
                } else {
                    volume_average(self.window, *period)
                        .ok_or_else(|| self.insufficient(period + 1))?
                };
                let current = self.snapshot.current_volume;
                (
                    current >= average * multiplier,
                    format!("volume {current} vs {period}-candle average {average:.2} x {multiplier}"),
                )
            }

            ConditionSpec::CrossCountLimit {
                lookback,
                max_crosses,
            } => {
                let count = if *lookback == self.snapshot.cross_lookback {
                    self.snapshot.recent_cross_count
                } else {
                    let (fast, reference) = self.crossing()?;
                    count_crosses(fast, reference, *lookback).ok_or_else(|| {
                        self.insufficient(fast.period().max(reference.period()) + lookback)
                    })?
                };
                (
                    count <= *max_crosses,
                    format!("{count} crosses in last {lookback} candles (max {max_crosses})"),
                )
            }
        };

        Ok(ConditionCheck {
            kind: condition.kind(),
            direction: side,
            passed,
            detail,
        })
    }

    fn insufficient(&self, required: usize) -> Error {
        Error::InsufficientData {
            required,
            available: self.window.len(),
        }
    }
}

fn crossing_series(window: &[Candle], fast: usize, reference: usize) -> Result<CrossingSeries> {
    let closes: Vec<f64> = window.iter().map(|c| c.close).collect();
    let series = |period| {
        EmaSeries::compute(&closes, period).ok_or(Error::InsufficientData {
            required: period,
            available: closes.len(),
        })
    };
    Ok(CrossingSeries {
        fast: series(fast)?,
        reference: series(reference)?,
    })
}

fn undefined_role(role: EmaRole) -> Error {
    Error::InvalidConfig(format!("ema role '{role}' is not defined"))
}
