use serde::{Deserialize, Serialize};

use common::{Error, Result, Side};

/// Top-level strategy config file (TOML).
///
/// Example `config/strategy.toml`:
/// ```toml
/// active = "trend-follow"
///
/// [[strategy]]
/// name = "trend-follow"
/// direction = "both"
///
/// [strategy.ema]
/// fast = 9
/// medium = 72
/// slow = 200
///
/// [[strategy.condition]]
/// type = "ema_cross"
/// price_confirm = true
///
/// [[strategy.condition]]
/// type = "adx_threshold"
/// period = 14
/// threshold = 25.0
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    /// Name of the strategy evaluations run against.
    pub active: String,
    #[serde(rename = "strategy")]
    pub strategies: Vec<StrategyConfig>,
}

impl StrategyFileConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// The single active strategy, validated.
    pub fn active_strategy(&self) -> Result<&StrategyConfig> {
        let strategy = self
            .strategies
            .iter()
            .find(|s| s.name == self.active)
            .ok_or_else(|| {
                Error::InvalidConfig(format!("active strategy '{}' is not defined", self.active))
            })?;
        strategy.validate()?;
        Ok(strategy)
    }
}

pub const DEFAULT_ADX_PERIOD: usize = 14;
pub const DEFAULT_ATR_PERIOD: usize = 14;
pub const DEFAULT_VOLUME_PERIOD: usize = 30;
pub const DEFAULT_CROSS_LOOKBACK: usize = 25;
pub const DEFAULT_WARMUP_CANDLES: usize = 50;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default)]
    pub direction: TradeDirection,
    #[serde(default)]
    pub ema: EmaPeriods,
    /// EMA the fast line is crossed against.
    #[serde(default = "default_cross_reference")]
    pub cross_reference: EmaRole,
    /// ADX period used when no `adx_threshold` condition names one.
    #[serde(default = "default_adx_period")]
    pub adx_period: usize,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    /// Volume average period used when no `volume_surge` condition names one.
    #[serde(default = "default_volume_period")]
    pub volume_period: usize,
    /// Width of one candle. Feeds ATR annualisation.
    #[serde(default = "default_candle_interval")]
    pub candle_interval_minutes: u32,
    /// Extra candles kept beyond the longest lookback so the EMAs settle.
    #[serde(default = "default_warmup")]
    pub warmup_candles: usize,
    /// Ordered entry conditions. All enabled entries must pass.
    #[serde(default, rename = "condition")]
    pub conditions: Vec<ConditionEntry>,
}

fn default_cross_reference() -> EmaRole {
    EmaRole::Medium
}
fn default_adx_period() -> usize {
    DEFAULT_ADX_PERIOD
}
fn default_atr_period() -> usize {
    DEFAULT_ATR_PERIOD
}
fn default_volume_period() -> usize {
    DEFAULT_VOLUME_PERIOD
}
fn default_candle_interval() -> u32 {
    1
}
fn default_warmup() -> usize {
    DEFAULT_WARMUP_CANDLES
}

impl StrategyConfig {
    /// A strategy with default periods and no conditions.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: TradeDirection::default(),
            ema: EmaPeriods::default(),
            cross_reference: default_cross_reference(),
            adx_period: DEFAULT_ADX_PERIOD,
            atr_period: DEFAULT_ATR_PERIOD,
            volume_period: DEFAULT_VOLUME_PERIOD,
            candle_interval_minutes: 1,
            warmup_candles: DEFAULT_WARMUP_CANDLES,
            conditions: Vec::new(),
        }
    }

    pub fn enabled_conditions(&self) -> impl Iterator<Item = &ConditionSpec> {
        self.conditions
            .iter()
            .filter(|c| c.enabled)
            .map(|c| &c.spec)
    }

    /// ADX period the snapshot is computed with.
    pub fn snapshot_adx_period(&self) -> usize {
        self.enabled_conditions()
            .find_map(|c| match c {
                ConditionSpec::AdxThreshold { period, .. } => Some(*period),
                _ => None,
            })
            .unwrap_or(self.adx_period)
    }

    /// Volume average period the snapshot is computed with.
    pub fn snapshot_volume_period(&self) -> usize {
        self.enabled_conditions()
            .find_map(|c| match c {
                ConditionSpec::VolumeSurge { period, .. } => Some(*period),
                _ => None,
            })
            .unwrap_or(self.volume_period)
    }

    /// Longest cross-count lookback among enabled conditions.
    pub fn cross_lookback(&self) -> usize {
        self.enabled_conditions()
            .filter_map(|c| match c {
                ConditionSpec::CrossCountLimit { lookback, .. } => Some(*lookback),
                _ => None,
            })
            .max()
            .unwrap_or(DEFAULT_CROSS_LOOKBACK)
    }

    /// Minimum window length for a snapshot and every enabled condition.
    pub fn required_candles(&self) -> usize {
        let mut required = self.ema.defined().map(|(_, p)| p).max().unwrap_or(0);

        if let Some(reference) = self.ema.period(self.cross_reference) {
            // Crosses compare each bar with its predecessor on both series.
            required = required.max(self.ema.fast.max(reference) + self.cross_lookback());
        }

        required = required
            .max(self.snapshot_adx_period() + 1)
            .max(self.atr_period + 1)
            .max(self.snapshot_volume_period() + 1);

        for condition in self.enabled_conditions() {
            let needed = match condition {
                ConditionSpec::AdxThreshold { period, .. } => period + 1,
                ConditionSpec::VolumeSurge { period, .. } => period + 1,
                _ => 0,
            };
            required = required.max(needed);
        }

        required + self.warmup_candles
    }

    /// Reject configurations an evaluation could only answer by guessing.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(format!("{}: {msg}", self.name)));

        for (role, period) in self.ema.defined() {
            if period == 0 {
                return invalid(format!("ema role '{role}' has period 0"));
            }
        }
        if self.cross_reference == EmaRole::Fast {
            return invalid("cross_reference cannot be the fast EMA".into());
        }
        if self.adx_period == 0 || self.atr_period == 0 || self.volume_period == 0 {
            return invalid("indicator periods must be at least 1".into());
        }
        if self.candle_interval_minutes == 0 {
            return invalid("candle_interval_minutes must be at least 1".into());
        }

        for condition in self.enabled_conditions() {
            match condition {
                ConditionSpec::EmaCross { .. } | ConditionSpec::CrossCountLimit { .. } => {
                    if self.ema.period(self.cross_reference).is_none() {
                        return invalid(format!(
                            "{} references undefined ema role '{}'",
                            condition.kind(),
                            self.cross_reference
                        ));
                    }
                }
                ConditionSpec::PriceVsEma { role, .. } => {
                    if self.ema.period(*role).is_none() {
                        return invalid(format!(
                            "price_vs_ema references undefined ema role '{role}'"
                        ));
                    }
                }
                ConditionSpec::AdxThreshold { .. } | ConditionSpec::VolumeSurge { .. } => {}
            }

            match condition {
                ConditionSpec::AdxThreshold { period: 0, .. }
                | ConditionSpec::VolumeSurge { period: 0, .. }
                | ConditionSpec::CrossCountLimit { lookback: 0, .. } => {
                    return invalid(format!("{} period must be at least 1", condition.kind()));
                }
                ConditionSpec::VolumeSurge { multiplier, .. } if *multiplier <= 0.0 => {
                    return invalid(format!("volume_surge multiplier must be positive, got {multiplier}"));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Which directions a strategy may signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Long,
    Short,
    #[default]
    Both,
}

impl TradeDirection {
    pub fn allows(self, side: Side) -> bool {
        matches!(
            (self, side),
            (TradeDirection::Both, _)
                | (TradeDirection::Long, Side::Long)
                | (TradeDirection::Short, Side::Short)
        )
    }
}

/// Logical name of an EMA line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmaRole {
    Fast,
    Medium,
    Slow,
}

impl std::fmt::Display for EmaRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmaRole::Fast => write!(f, "fast"),
            EmaRole::Medium => write!(f, "medium"),
            EmaRole::Slow => write!(f, "slow"),
        }
    }
}

/// EMA role → period. `fast` is always defined.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EmaPeriods {
    #[serde(default = "default_fast_period")]
    pub fast: usize,
    #[serde(default)]
    pub medium: Option<usize>,
    #[serde(default)]
    pub slow: Option<usize>,
}

fn default_fast_period() -> usize {
    9
}

impl Default for EmaPeriods {
    fn default() -> Self {
        Self {
            fast: 9,
            medium: Some(72),
            slow: Some(200),
        }
    }
}

impl EmaPeriods {
    pub fn period(&self, role: EmaRole) -> Option<usize> {
        match role {
            EmaRole::Fast => Some(self.fast),
            EmaRole::Medium => self.medium,
            EmaRole::Slow => self.slow,
        }
    }

    pub fn defined(&self) -> impl Iterator<Item = (EmaRole, usize)> + '_ {
        [EmaRole::Fast, EmaRole::Medium, EmaRole::Slow]
            .into_iter()
            .filter_map(|role| self.period(role).map(|p| (role, p)))
    }
}

/// One `[[strategy.condition]]` table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConditionEntry {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(flatten)]
    pub spec: ConditionSpec,
}

fn enabled_by_default() -> bool {
    true
}

impl From<ConditionSpec> for ConditionEntry {
    fn from(spec: ConditionSpec) -> Self {
        Self {
            enabled: true,
            spec,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionSpec {
    /// Fast EMA crosses the reference EMA on the latest candle.
    EmaCross {
        #[serde(default = "enabled_by_default")]
        price_confirm: bool,
    },
    PriceVsEma { role: EmaRole, side: PriceSide },
    AdxThreshold {
        #[serde(default = "default_adx_period")]
        period: usize,
        threshold: f64,
    },
    VolumeSurge {
        #[serde(default = "default_volume_period")]
        period: usize,
        multiplier: f64,
    },
    /// Rejects choppy markets where the EMAs keep crossing.
    CrossCountLimit { lookback: usize, max_crosses: usize },
}

impl ConditionSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ConditionSpec::EmaCross { .. } => "ema_cross",
            ConditionSpec::PriceVsEma { .. } => "price_vs_ema",
            ConditionSpec::AdxThreshold { .. } => "adx_threshold",
            ConditionSpec::VolumeSurge { .. } => "volume_surge",
            ConditionSpec::CrossCountLimit { .. } => "cross_count_limit",
        }
    }
}

/// Where the close must sit relative to an EMA. `Above` can only pass for
/// LONG and `Below` only for SHORT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSide {
    Above,
    Below,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
active = "trend"

[[strategy]]
name = "trend"

[strategy.ema]
fast = 9
medium = 72

[[strategy.condition]]
type = "ema_cross"

[[strategy.condition]]
type = "adx_threshold"
threshold = 25.0

[[strategy.condition]]
type = "volume_surge"
enabled = false
period = 20
multiplier = 1.8

[[strategy.condition]]
type = "cross_count_limit"
lookback = 30
max_crosses = 1

[[strategy]]
name = "shorts-only"
direction = "short"

[[strategy.condition]]
type = "price_vs_ema"
role = "slow"
side = "below"
"#;

    #[test]
    fn parses_named_strategies_and_conditions() {
        let file = StrategyFileConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(file.strategies.len(), 2);

        let active = file.active_strategy().unwrap();
        assert_eq!(active.name, "trend");
        assert_eq!(active.ema.slow, None);
        assert_eq!(active.conditions.len(), 4);
        assert_eq!(
            active.conditions[0].spec,
            ConditionSpec::EmaCross {
                price_confirm: true
            }
        );
        assert_eq!(
            active.conditions[1].spec,
            ConditionSpec::AdxThreshold {
                period: 14,
                threshold: 25.0
            }
        );
        assert!(!active.conditions[2].enabled);
        assert_eq!(active.enabled_conditions().count(), 3);

        let shorts = &file.strategies[1];
        assert_eq!(shorts.direction, TradeDirection::Short);
        assert_eq!(shorts.ema, EmaPeriods::default());
    }

    #[test]
    fn missing_active_strategy_is_invalid() {
        let mut file = StrategyFileConfig::from_toml(SAMPLE).unwrap();
        file.active = "nope".into();
        assert!(matches!(
            file.active_strategy(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn required_candles_covers_lookbacks_and_warmup() {
        let file = StrategyFileConfig::from_toml(SAMPLE).unwrap();
        let active = file.active_strategy().unwrap();
        // medium 72 + cross lookback 30 dominates ADX 15 and volume 31.
        assert_eq!(active.required_candles(), 72 + 30 + DEFAULT_WARMUP_CANDLES);

        let defaults = StrategyConfig::named("defaults");
        assert_eq!(defaults.required_candles(), 200 + DEFAULT_WARMUP_CANDLES);
    }

    #[test]
    fn disabled_conditions_do_not_drive_periods() {
        let file = StrategyFileConfig::from_toml(SAMPLE).unwrap();
        let active = file.active_strategy().unwrap();
        assert_eq!(active.snapshot_volume_period(), DEFAULT_VOLUME_PERIOD);
        assert_eq!(active.snapshot_adx_period(), 14);
        assert_eq!(active.cross_lookback(), 30);
    }

    #[test]
    fn undefined_role_is_invalid() {
        let mut config = StrategyConfig::named("bad");
        config.ema.slow = None;
        config.conditions.push(
            ConditionSpec::PriceVsEma {
                role: EmaRole::Slow,
                side: PriceSide::Above,
            }
            .into(),
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("slow"), "{err}");
    }

    #[test]
    fn undefined_cross_reference_is_invalid() {
        let mut config = StrategyConfig::named("bad");
        config.ema.medium = None;
        config.conditions.push(
            ConditionSpec::EmaCross {
                price_confirm: false,
            }
            .into(),
        );
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        // Disabled conditions are never checked.
        config.conditions[0].enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn direction_filter() {
        assert!(TradeDirection::Both.allows(Side::Long));
        assert!(TradeDirection::Long.allows(Side::Long));
        assert!(!TradeDirection::Long.allows(Side::Short));
        assert!(TradeDirection::Short.allows(Side::Short));
    }
}
