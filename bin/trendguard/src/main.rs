mod replay;

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::Config;
use paper::PaperExecutor;
use risk::{MarketCapTier, PositionBook, RiskConfig, RiskManager};
use strategy::{SignalRegistry, StrategyFileConfig};

use replay::Replay;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env()?;

    // ── Logging ──────────────────────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_filter))
        .context("invalid LOG_FILTER")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    info!(strategy_file = %cfg.strategy_config_path, "TrendGuard starting");

    // ── Strategy ──────────────────────────────────────────────────────────────
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)
        .with_context(|| format!("loading {}", cfg.strategy_config_path))?;
    let mut strategy = strategy_file.active_strategy()?.clone();
    strategy.candle_interval_minutes = cfg.candle_interval_minutes;
    info!(
        strategy = %strategy.name,
        conditions = strategy.enabled_conditions().count(),
        required_candles = strategy.required_candles(),
        "Strategy loaded"
    );
    let registry = SignalRegistry::new(strategy)?;

    // ── Risk ──────────────────────────────────────────────────────────────────
    let risk_cfg = RiskConfig::from_toml_file(&cfg.strategy_config_path)?;
    let book = Arc::new(PositionBook::new(risk_cfg)?);
    let risk_manager = RiskManager::new(book);

    let tier = match cfg.default_tier {
        Some(id) => MarketCapTier::by_id(id)?,
        None => {
            warn!("DEFAULT_TIER not set, using the lowest leverage tier");
            MarketCapTier::lowest()
        }
    };
    info!(tier = tier.id, name = tier.name, "Leverage tier");

    // ── Paper execution ───────────────────────────────────────────────────────
    let executor = Arc::new(PaperExecutor::new(
        cfg.paper_slippage_bps,
        cfg.paper_fail_partial_close,
    ));
    info!(
        slippage_bps = cfg.paper_slippage_bps,
        fail_partial_close = cfg.paper_fail_partial_close,
        "Paper executor ready"
    );

    // ── Replay ────────────────────────────────────────────────────────────────
    let candle_file = cfg.candle_file()?;
    let candles = replay::load_candles(candle_file)?;
    info!(file = candle_file, candles = candles.len(), "Replaying candles");

    let mut replay = Replay::new(registry, risk_manager, executor, tier, cfg.position_quantity);
    for candle in &candles {
        replay.step(candle).await?;
    }

    let summary = replay.finish()?;
    info!(
        candles = summary.candles,
        signals = summary.signals,
        opened = summary.opened,
        skipped = summary.skipped_open,
        closed = summary.closed,
        realized_pnl = summary.realized_pnl,
        unrealized_pnl = summary.unrealized_pnl,
        "Replay finished"
    );
    Ok(())
}
