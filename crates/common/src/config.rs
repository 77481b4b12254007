use std::str::FromStr;

use crate::{Error, Result};

/// Host-process settings loaded from environment variables at startup.
///
/// Strategy rules and the stop ladder live in the strategy TOML file; this
/// only covers where to find inputs and how the host wires collaborators.
#[derive(Debug, Clone)]
pub struct Config {
    /// Strategy config file path.
    pub strategy_config_path: String,

    /// JSON candle file replayed by the host binary.
    pub candle_file: Option<String>,

    /// Width of one candle in minutes. Feeds ATR annualisation.
    pub candle_interval_minutes: u32,

    /// Market-cap tier used when the tier supplier has nothing for a symbol.
    pub default_tier: Option<u8>,

    // Paper execution
    pub paper_slippage_bps: f64,
    pub paper_fail_partial_close: bool,

    /// Base-asset quantity opened per accepted signal.
    pub position_quantity: f64,

    pub log_filter: String,
}

impl Config {
    /// Load configuration from the process environment.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Malformed values are reported as
    /// `Error::Config` instead of falling back silently.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_tier = match lookup("DEFAULT_TIER") {
            Some(raw) => {
                let tier: u8 = parse_value("DEFAULT_TIER", &raw)?;
                if !(1..=4).contains(&tier) {
                    return Err(Error::Config(format!(
                        "DEFAULT_TIER must be between 1 and 4, got {tier}"
                    )));
                }
                Some(tier)
            }
            None => None,
        };

        let candle_interval_minutes: u32 =
            optional_parsed(&lookup, "CANDLE_INTERVAL_MINUTES", 1)?;
        if candle_interval_minutes == 0 {
            return Err(Error::Config(
                "CANDLE_INTERVAL_MINUTES must be at least 1".into(),
            ));
        }

        let position_quantity: f64 = optional_parsed(&lookup, "POSITION_QUANTITY", 1.0)?;
        if position_quantity <= 0.0 || !position_quantity.is_finite() {
            return Err(Error::Config(format!(
                "POSITION_QUANTITY must be a positive number, got {position_quantity}"
            )));
        }

        Ok(Config {
            strategy_config_path: lookup("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategy.toml".to_string()),
            candle_file: lookup("CANDLE_FILE"),
            candle_interval_minutes,
            default_tier,
            paper_slippage_bps: optional_parsed(&lookup, "PAPER_SLIPPAGE_BPS", 10.0)?,
            paper_fail_partial_close: optional_parsed(&lookup, "PAPER_FAIL_PARTIAL_CLOSE", false)?,
            position_quantity,
            log_filter: lookup("LOG_FILTER").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// The candle file, required by hosts that replay history.
    pub fn candle_file(&self) -> Result<&str> {
        self.candle_file
            .as_deref()
            .ok_or_else(|| Error::Config("CANDLE_FILE is not set".into()))
    }
}

fn optional_parsed<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let cfg = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg.strategy_config_path, "config/strategy.toml");
        assert_eq!(cfg.candle_interval_minutes, 1);
        assert_eq!(cfg.default_tier, None);
        assert_eq!(cfg.paper_slippage_bps, 10.0);
        assert!(!cfg.paper_fail_partial_close);
        assert_eq!(cfg.position_quantity, 1.0);
        assert!(cfg.candle_file().is_err());
    }

    #[test]
    fn explicit_values_are_parsed() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("CANDLE_FILE", "data/btc.json"),
            ("CANDLE_INTERVAL_MINUTES", "5"),
            ("DEFAULT_TIER", "4"),
            ("PAPER_FAIL_PARTIAL_CLOSE", "true"),
        ]))
        .unwrap();
        assert_eq!(cfg.candle_file().unwrap(), "data/btc.json");
        assert_eq!(cfg.candle_interval_minutes, 5);
        assert_eq!(cfg.default_tier, Some(4));
        assert!(cfg.paper_fail_partial_close);
    }

    #[test]
    fn out_of_range_tier_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("DEFAULT_TIER", "7")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_number_is_rejected() {
        let err =
            Config::from_lookup(lookup_from(&[("PAPER_SLIPPAGE_BPS", "ten")])).unwrap_err();
        assert!(err.to_string().contains("PAPER_SLIPPAGE_BPS"));
    }
}
