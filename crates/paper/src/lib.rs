use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use common::{
    Error, ExecutionReport, InstructionKind, OrderExecutor, OrderInstruction, Result, Side,
};

/// Simulated order executor for paper trading and replays.
///
/// Fills are simulated at the latest known price with configurable slippage.
/// No real orders are ever sent anywhere.
pub struct PaperExecutor {
    /// Latest known price per symbol, updated via `update_price`.
    prices: Arc<RwLock<HashMap<String, f64>>>,
    /// Slippage in basis points applied to all market fills.
    slippage_bps: f64,
    /// When set, every partial close is reported as failed.
    fail_partial_close: AtomicBool,
    /// Every report handed out, in order.
    history: Arc<RwLock<Vec<ExecutionReport>>>,
}

impl PaperExecutor {
    pub fn new(slippage_bps: f64, fail_partial_close: bool) -> Self {
        info!(
            slippage_bps = slippage_bps,
            fail_partial_close = fail_partial_close,
            "PaperExecutor initialized"
        );
        Self {
            prices: Arc::new(RwLock::new(HashMap::new())),
            slippage_bps,
            fail_partial_close: AtomicBool::new(fail_partial_close),
            history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Update the latest price for a symbol (called by the price feed).
    pub async fn update_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    pub fn set_fail_partial_close(&self, fail: bool) {
        self.fail_partial_close.store(fail, Ordering::Relaxed);
    }

    pub async fn history(&self) -> Vec<ExecutionReport> {
        self.history.read().await.clone()
    }

    /// Slippage always works against the trader: buys pay more, sells
    /// receive less. Opening trades in the position's direction, reducing
    /// trades against it.
    fn fill_price(&self, mid: f64, instruction: &OrderInstruction) -> f64 {
        let buying = match instruction.side {
            Side::Long => !instruction.is_reducing(),
            Side::Short => instruction.is_reducing(),
        };
        let slip = self.slippage_bps / 10_000.0;
        if buying {
            mid * (1.0 + slip)
        } else {
            mid * (1.0 - slip)
        }
    }

    async fn record(&self, report: ExecutionReport) -> ExecutionReport {
        self.history.write().await.push(report.clone());
        report
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    async fn execute(&self, instruction: &OrderInstruction) -> Result<ExecutionReport> {
        if let InstructionKind::UpdateStop { stop_price } = instruction.kind {
            debug!(
                symbol = %instruction.symbol,
                stop = stop_price,
                "Paper stop order replaced"
            );
            return Ok(self
                .record(ExecutionReport::filled(instruction, stop_price))
                .await);
        }

        if instruction.kind == InstructionKind::PartialClose
            && self.fail_partial_close.load(Ordering::Relaxed)
        {
            warn!(symbol = %instruction.symbol, "Simulated partial close failure");
            return Ok(self
                .record(ExecutionReport::failed(
                    instruction,
                    "simulated partial close failure",
                ))
                .await);
        }

        let mid = self.current_price(&instruction.symbol).await?;
        let fill_price = self.fill_price(mid, instruction);

        debug!(
            symbol = %instruction.symbol,
            kind = ?instruction.kind,
            mid = mid,
            fill = fill_price,
            qty = instruction.quantity,
            "Paper fill simulated"
        );

        Ok(self
            .record(ExecutionReport::filled(instruction, fill_price))
            .await)
    }

    async fn current_price(&self, symbol: &str) -> Result<f64> {
        self.prices
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| {
                Error::Exchange(format!(
                    "PaperExecutor has no price for '{symbol}'. Ensure prices are flowing."
                ))
            })
    }
}
