use std::collections::{HashMap, VecDeque};

use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use common::{Candle, Result};

use crate::config::StrategyConfig;
use crate::evaluator::{analyze, Evaluation};

/// An actionable evaluation for one symbol.
#[derive(Debug, Clone)]
pub struct SymbolSignal {
    pub symbol: String,
    pub evaluation: Evaluation,
}

/// Keeps a bounded rolling window of closed candles per symbol and evaluates
/// the active strategy whenever a window receives a new candle.
pub struct SignalRegistry {
    config: StrategyConfig,
    windows: HashMap<String, VecDeque<Candle>>,
    capacity: usize,
}

impl SignalRegistry {
    pub fn new(config: StrategyConfig) -> Result<Self> {
        config.validate()?;
        let capacity = config.required_candles();
        info!(
            strategy = %config.name,
            window = capacity,
            conditions = config.enabled_conditions().count(),
            "SignalRegistry configured"
        );
        Ok(Self {
            config,
            windows: HashMap::new(),
            capacity,
        })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Swap the active strategy. Existing windows are kept and trimmed to
    /// the new strategy's size on their next candle.
    pub fn set_config(&mut self, config: StrategyConfig) -> Result<()> {
        config.validate()?;
        info!(from = %self.config.name, to = %config.name, "Active strategy changed");
        self.capacity = config.required_candles();
        self.config = config;
        Ok(())
    }

    pub fn window(&self, symbol: &str) -> Option<&VecDeque<Candle>> {
        self.windows.get(symbol)
    }

    /// Append a candle and evaluate its symbol.
    ///
    /// Returns `Ok(None)` for forming candles, stale candles and while the
    /// window is still shorter than the strategy needs.
    pub fn process(&mut self, candle: &Candle) -> Result<Option<Evaluation>> {
        if !candle.is_closed {
            return Ok(None);
        }

        let window = self.windows.entry(candle.symbol.clone()).or_default();
        match window.back() {
            Some(last) if candle.open_time < last.open_time => {
                warn!(
                    symbol = %candle.symbol,
                    open_time = %candle.open_time,
                    "Ignoring out-of-order candle"
                );
                return Ok(None);
            }
            Some(last) if candle.open_time == last.open_time => {
                window.pop_back();
            }
            _ => {}
        }
        window.push_back(candle.clone());
        while window.len() > self.capacity {
            window.pop_front();
        }

        match analyze(&self.config, window.make_contiguous()) {
            Ok(evaluation) => Ok(Some(evaluation)),
            Err(e) if e.is_recoverable() => {
                debug!(symbol = %candle.symbol, reason = %e, "Window still filling");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Run the dispatch loop.
    /// Reads closed candles from `candle_rx`, pushes LONG/SHORT evaluations to `signal_tx`.
    pub async fn run(
        mut self,
        mut candle_rx: broadcast::Receiver<Candle>,
        signal_tx: mpsc::Sender<SymbolSignal>,
    ) {
        info!("SignalRegistry running");
        loop {
            match candle_rx.recv().await {
                Ok(candle) => {
                    let evaluation = match self.process(&candle) {
                        Ok(Some(evaluation)) => evaluation,
                        Ok(None) => continue,
                        Err(e) => {
                            error!(symbol = %candle.symbol, error = %e, "Evaluation failed");
                            continue;
                        }
                    };

                    if !evaluation.signal.is_actionable() {
                        continue;
                    }

                    info!(
                        symbol = %candle.symbol,
                        signal = %evaluation.signal,
                        close = evaluation.snapshot.close,
                        adx = evaluation.snapshot.adx,
                        "Entry signal"
                    );
                    let event = SymbolSignal {
                        symbol: candle.symbol.clone(),
                        evaluation,
                    };
                    if signal_tx.send(event).await.is_err() {
                        warn!("Signal channel closed, stopping signal registry");
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(dropped = n, "Signal registry lagged, dropped candles");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Candle channel closed");
                    return;
                }
            }
        }
    }
}
