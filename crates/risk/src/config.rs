use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// One rung of the stop ladder. Both values are unleveraged price percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfitLevel {
    /// Profit that activates the level (e.g. 1.8 = 1.8%).
    pub trigger_pct: f64,
    /// Profit the stop locks in once the level is active.
    pub lock_pct: f64,
}

/// Stop ladder parameters, in percent of entry price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Protective stop distance on open (e.g. 2.0 = 2% against the position).
    pub initial_stop_pct: f64,
    pub level_1: ProfitLevel,
    pub level_2: ProfitLevel,
    pub level_3: ProfitLevel,
    /// Trailing band behind the high-water mark once level 3 is active.
    pub trailing_pct: f64,
    /// Share of the remaining quantity closed once at level 3.
    pub partial_close_pct: f64,
    /// Re-issues allowed after a failed partial close.
    pub partial_close_retries: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            initial_stop_pct: 2.0,
            level_1: ProfitLevel {
                trigger_pct: 1.8,
                lock_pct: 0.1,
            },
            level_2: ProfitLevel {
                trigger_pct: 2.5,
                lock_pct: 1.9,
            },
            level_3: ProfitLevel {
                trigger_pct: 4.0,
                lock_pct: 1.9,
            },
            trailing_pct: 1.5,
            partial_close_pct: 50.0,
            partial_close_retries: 2,
        }
    }
}

/// The strategy file, seen only for its optional `[risk]` table.
#[derive(Debug, Default, Deserialize)]
struct RiskSection {
    #[serde(default)]
    risk: RiskConfig,
}

impl RiskConfig {
    /// Read the `[risk]` table of a TOML file; defaults apply when it is absent.
    pub fn from_toml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let section: RiskSection = toml::from_str(content)?;
        section.risk.validate()?;
        Ok(section.risk)
    }

    pub fn levels(&self) -> [ProfitLevel; 3] {
        [self.level_1, self.level_2, self.level_3]
    }

    pub fn validate(&self) -> Result<()> {
        let pct = |name: &str, v: f64, max: f64| {
            if v.is_finite() && v > 0.0 && v <= max {
                Ok(())
            } else {
                Err(Error::InvalidConfig(format!(
                    "risk.{name} must be in (0, {max}], got {v}"
                )))
            }
        };
        pct("initial_stop_pct", self.initial_stop_pct, 100.0)?;
        pct("trailing_pct", self.trailing_pct, 100.0)?;
        pct("partial_close_pct", self.partial_close_pct, 100.0)?;
        if self.partial_close_pct >= 100.0 {
            return Err(Error::InvalidConfig(format!(
                "risk.partial_close_pct must leave a remainder to trail, got {}",
                self.partial_close_pct
            )));
        }

        let mut previous = 0.0;
        for (i, level) in self.levels().iter().enumerate() {
            if !(level.trigger_pct > previous) {
                return Err(Error::InvalidConfig(format!(
                    "risk.level_{} trigger {} must exceed {previous}",
                    i + 1,
                    level.trigger_pct
                )));
            }
            if !(level.lock_pct >= 0.0 && level.lock_pct < level.trigger_pct) {
                return Err(Error::InvalidConfig(format!(
                    "risk.level_{} lock {} must be in [0, trigger)",
                    i + 1,
                    level.lock_pct
                )));
            }
            previous = level.trigger_pct;
        }
        Ok(())
    }
}
