use serde::Serialize;
use tracing::debug;

use common::{Error, Result};

/// Global leverage bounds. Every decision is clamped into this range.
pub const MIN_LEVERAGE: u32 = 3;
pub const MAX_LEVERAGE: u32 = 25;

/// When an adjustment rule applies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleCondition {
    Always,
    VolatilityAbove(f64),
    /// Ignores a zero (unknown) volatility.
    VolatilityBelow(f64),
    AdxAbove(f64),
    VolumeRatioAtLeast(f64),
    AdxAboveVolatilityBelow { adx: f64, volatility: f64 },
}

/// What an adjustment rule does to the tier's base leverage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    RaiseBy(u32),
    Floor,
    Ceiling,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustmentRule {
    pub when: RuleCondition,
    pub then: Adjustment,
    pub reason: &'static str,
}

/// A market-cap tier with its leverage band and ordered adjustment rules.
#[derive(Debug, Clone, PartialEq)]
pub struct LeverageTier {
    pub id: u8,
    pub name: &'static str,
    /// Inclusive lower bound of the tier's market-cap range (USD).
    pub min_market_cap_usd: f64,
    pub floor: u32,
    pub ceiling: u32,
    pub base: u32,
    /// Evaluated in order; the first match wins.
    pub rules: &'static [AdjustmentRule],
}

pub static TIERS: [LeverageTier; 4] = [
    LeverageTier {
        id: 1,
        name: "mega cap",
        min_market_cap_usd: 1e12,
        floor: 20,
        ceiling: 25,
        base: 22,
        rules: &[
            AdjustmentRule {
                when: RuleCondition::VolatilityAbove(100.0),
                then: Adjustment::Floor,
                reason: "volatility above 100%",
            },
            AdjustmentRule {
                when: RuleCondition::VolatilityBelow(50.0),
                then: Adjustment::RaiseBy(3),
                reason: "volatility below 50%",
            },
        ],
    },
    LeverageTier {
        id: 2,
        name: "large cap",
        min_market_cap_usd: 1e10,
        floor: 10,
        ceiling: 18,
        base: 15,
        rules: &[AdjustmentRule {
            when: RuleCondition::AdxAbove(30.0),
            then: Adjustment::RaiseBy(3),
            reason: "strong trend (ADX above 30)",
        }],
    },
    LeverageTier {
        id: 3,
        name: "mid cap",
        min_market_cap_usd: 1e9,
        floor: 5,
        ceiling: 8,
        base: 7,
        rules: &[
            AdjustmentRule {
                when: RuleCondition::VolatilityAbove(180.0),
                then: Adjustment::Floor,
                reason: "volatility above 180%",
            },
            AdjustmentRule {
                when: RuleCondition::VolumeRatioAtLeast(3.0),
                then: Adjustment::Ceiling,
                reason: "volume surge (3x average)",
            },
        ],
    },
    LeverageTier {
        id: 4,
        name: "small cap",
        min_market_cap_usd: 0.0,
        floor: 3,
        ceiling: 5,
        base: 3,
        rules: &[
            AdjustmentRule {
                when: RuleCondition::AdxAboveVolatilityBelow {
                    adx: 35.0,
                    volatility: 200.0,
                },
                then: Adjustment::Ceiling,
                reason: "strong trend with contained volatility",
            },
            AdjustmentRule {
                when: RuleCondition::Always,
                then: Adjustment::Floor,
                reason: "small cap default",
            },
        ],
    },
];

/// Market-cap classification for tier suppliers.
pub struct MarketCapTier;

impl MarketCapTier {
    /// Tier for a market cap in USD. Unknown or invalid caps fall to the
    /// lowest tier.
    pub fn classify(market_cap_usd: Option<f64>) -> &'static LeverageTier {
        let cap = market_cap_usd.filter(|c| c.is_finite()).unwrap_or(0.0);
        TIERS
            .iter()
            .find(|t| cap >= t.min_market_cap_usd)
            .unwrap_or(&TIERS[TIERS.len() - 1])
    }

    pub fn by_id(id: u8) -> Result<&'static LeverageTier> {
        TIERS
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::UnknownTier(format!("no tier with id {id}")))
    }

    pub fn lowest() -> &'static LeverageTier {
        &TIERS[TIERS.len() - 1]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeverageDecision {
    pub leverage: u32,
    pub base_leverage: u32,
    pub tier_id: u8,
    pub reason: &'static str,
}

impl RuleCondition {
    fn matches(self, adx: f64, volatility: f64, volume_ratio: f64) -> bool {
        match self {
            RuleCondition::Always => true,
            RuleCondition::VolatilityAbove(v) => volatility > v,
            RuleCondition::VolatilityBelow(v) => volatility > 0.0 && volatility < v,
            RuleCondition::AdxAbove(a) => adx > a,
            RuleCondition::VolumeRatioAtLeast(r) => volume_ratio >= r,
            RuleCondition::AdxAboveVolatilityBelow { adx: a, volatility: v } => {
                adx > a && volatility < v
            }
        }
    }
}

/// Choose leverage for a position about to open.
///
/// Starts from the tier's base, applies the first matching rule, then clamps
/// to the tier band and the global range. Never guesses a tier.
pub fn select(
    tier: Option<&LeverageTier>,
    adx: f64,
    atr_annualized_pct: f64,
    volume_ratio: f64,
) -> Result<LeverageDecision> {
    let tier = tier.ok_or_else(|| {
        Error::UnknownTier("leverage selection requires a market-cap tier".into())
    })?;

    let rule = tier
        .rules
        .iter()
        .find(|r| r.when.matches(adx, atr_annualized_pct, volume_ratio));

    let (raw, reason) = match rule {
        Some(rule) => {
            let raw = match rule.then {
                Adjustment::RaiseBy(n) => tier.base + n,
                Adjustment::Floor => tier.floor,
                Adjustment::Ceiling => tier.ceiling,
            };
            (raw, rule.reason)
        }
        None => (tier.base, "tier base"),
    };

    let leverage = raw
        .clamp(tier.floor, tier.ceiling)
        .clamp(MIN_LEVERAGE, MAX_LEVERAGE);

    debug!(
        tier = tier.id,
        adx,
        volatility = atr_annualized_pct,
        volume_ratio,
        leverage,
        reason,
        "Leverage selected"
    );

    Ok(LeverageDecision {
        leverage,
        base_leverage: tier.base,
        tier_id: tier.id,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(id: u8) -> &'static LeverageTier {
        MarketCapTier::by_id(id).unwrap()
    }

    #[test]
    fn classify_uses_market_cap_thresholds() {
        assert_eq!(MarketCapTier::classify(Some(1.5e12)).id, 1);
        assert_eq!(MarketCapTier::classify(Some(1e12)).id, 1);
        assert_eq!(MarketCapTier::classify(Some(5e10)).id, 2);
        assert_eq!(MarketCapTier::classify(Some(2e9)).id, 3);
        assert_eq!(MarketCapTier::classify(Some(5e8)).id, 4);
        assert_eq!(MarketCapTier::classify(None).id, 4);
        assert_eq!(MarketCapTier::classify(Some(f64::NAN)).id, 4);
    }

    #[test]
    fn missing_tier_is_an_error() {
        assert!(matches!(
            select(None, 30.0, 60.0, 1.0),
            Err(Error::UnknownTier(_))
        ));
        assert!(matches!(MarketCapTier::by_id(9), Err(Error::UnknownTier(_))));
    }

    #[test]
    fn tier_one_rules() {
        let calm = select(Some(tier(1)), 20.0, 40.0, 1.0).unwrap();
        assert_eq!(calm.leverage, 25);
        assert_eq!(calm.base_leverage, 22);

        let wild = select(Some(tier(1)), 20.0, 120.0, 1.0).unwrap();
        assert_eq!(wild.leverage, 20);

        let normal = select(Some(tier(1)), 20.0, 75.0, 1.0).unwrap();
        assert_eq!(normal.leverage, 22);
        assert_eq!(normal.reason, "tier base");

        // Zero volatility means unknown, not calm.
        assert_eq!(select(Some(tier(1)), 20.0, 0.0, 1.0).unwrap().leverage, 22);
    }

    #[test]
    fn tier_two_raises_on_strong_trend() {
        assert_eq!(select(Some(tier(2)), 31.0, 80.0, 1.0).unwrap().leverage, 18);
        assert_eq!(select(Some(tier(2)), 30.0, 80.0, 1.0).unwrap().leverage, 15);
    }

    #[test]
    fn tier_three_volatility_outranks_volume() {
        assert_eq!(select(Some(tier(3)), 20.0, 200.0, 4.0).unwrap().leverage, 5);
        assert_eq!(select(Some(tier(3)), 20.0, 90.0, 3.0).unwrap().leverage, 8);
        assert_eq!(select(Some(tier(3)), 20.0, 90.0, 1.0).unwrap().leverage, 7);
    }

    #[test]
    fn tier_four_needs_trend_and_calm() {
        assert_eq!(select(Some(tier(4)), 40.0, 150.0, 1.0).unwrap().leverage, 5);
        assert_eq!(select(Some(tier(4)), 40.0, 250.0, 1.0).unwrap().leverage, 3);
        assert_eq!(select(Some(tier(4)), 20.0, 150.0, 1.0).unwrap().leverage, 3);
    }

    #[test]
    fn nan_inputs_fall_back_to_base() {
        let d = select(Some(tier(2)), f64::NAN, f64::NAN, f64::NAN).unwrap();
        assert_eq!(d.leverage, 15);
    }

    #[test]
    fn every_tier_stays_in_global_range() {
        for t in &TIERS {
            for adx in [0.0, 25.0, 50.0] {
                for vol in [0.0, 40.0, 150.0, 300.0] {
                    for ratio in [0.0, 1.0, 5.0] {
                        let d = select(Some(t), adx, vol, ratio).unwrap();
                        assert!((MIN_LEVERAGE..=MAX_LEVERAGE).contains(&d.leverage));
                        assert!((t.floor..=t.ceiling).contains(&d.leverage));
                    }
                }
            }
        }
    }
}
