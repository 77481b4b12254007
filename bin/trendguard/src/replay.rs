use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use uuid::Uuid;

use common::{
    Candle, ExecutionReport, ExecutionStatus, InstructionKind, OrderExecutor, OrderInstruction,
    PriceTick, Side,
};
use paper::PaperExecutor;
use risk::{select, LeverageTier, OpenParams, Position, RiskManager};
use strategy::{Evaluation, SignalRegistry};

/// Read a JSON array of candles, oldest first.
pub fn load_candles(path: &str) -> Result<Vec<Candle>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading candle file '{path}'"))?;
    let mut candles: Vec<Candle> =
        serde_json::from_str(&content).with_context(|| format!("parsing candle file '{path}'"))?;
    // Stable: candles of different symbols keep their relative order.
    candles.sort_by_key(|c| c.open_time);
    Ok(candles)
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReplaySummary {
    pub candles: usize,
    pub signals: usize,
    pub opened: usize,
    pub skipped_open: usize,
    pub closed: usize,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
}

/// Drives candles through signal → leverage → paper fill → risk machine in
/// order, one candle at a time, so a replay is reproducible.
pub struct Replay {
    registry: SignalRegistry,
    risk: RiskManager,
    executor: Arc<PaperExecutor>,
    tier: &'static LeverageTier,
    quantity: f64,
    last_prices: HashMap<String, f64>,
    summary: ReplaySummary,
}

impl Replay {
    pub fn new(
        registry: SignalRegistry,
        risk: RiskManager,
        executor: Arc<PaperExecutor>,
        tier: &'static LeverageTier,
        quantity: f64,
    ) -> Self {
        Self {
            registry,
            risk,
            executor,
            tier,
            quantity,
            last_prices: HashMap::new(),
            summary: ReplaySummary::default(),
        }
    }

    pub async fn step(&mut self, candle: &Candle) -> Result<()> {
        self.summary.candles += 1;
        self.executor.update_price(&candle.symbol, candle.close).await;
        self.last_prices.insert(candle.symbol.clone(), candle.close);

        let tick = PriceTick {
            symbol: candle.symbol.clone(),
            price: candle.close,
            timestamp: candle.open_time,
        };
        let instructions = self.risk.apply_tick(&tick);
        self.execute_all(instructions).await?;

        if let Some(evaluation) = self.registry.process(candle)? {
            if let Some(side) = evaluation.signal.side() {
                self.summary.signals += 1;
                self.open(candle, side, &evaluation).await?;
            }
        }
        Ok(())
    }

    async fn open(&mut self, candle: &Candle, side: Side, evaluation: &Evaluation) -> Result<()> {
        if self.risk.book().by_symbol(&candle.symbol)?.is_some() {
            self.summary.skipped_open += 1;
            info!(symbol = %candle.symbol, signal = %evaluation.signal, "Position already open, signal skipped");
            return Ok(());
        }

        let snapshot = &evaluation.snapshot;
        let decision = select(
            Some(self.tier),
            snapshot.adx,
            snapshot.atr_annualized_pct,
            snapshot.volume_ratio,
        )?;

        let id = Uuid::new_v4();
        let instruction = OrderInstruction::new(
            id,
            candle.symbol.clone(),
            side,
            self.quantity,
            InstructionKind::Open {
                leverage: decision.leverage,
            },
        );
        let report = self.executor.execute(&instruction).await?;
        let ExecutionStatus::Filled { price, quantity } = report.status else {
            warn!(symbol = %candle.symbol, "Opening order not filled");
            return Ok(());
        };

        let position = self.risk.book().open_with_id(
            id,
            OpenParams {
                symbol: candle.symbol.clone(),
                side,
                entry_price: price,
                quantity,
                leverage: decision.leverage,
            },
        )?;
        self.summary.opened += 1;
        info!(
            symbol = %position.symbol,
            side = %side,
            entry = price,
            leverage = decision.leverage,
            tier = decision.tier_id,
            reason = decision.reason,
            adx = snapshot.adx,
            volatility = snapshot.atr_annualized_pct,
            "Signal accepted"
        );
        Ok(())
    }

    /// Execute instructions, feeding each report back until nothing is left.
    async fn execute_all(&mut self, mut pending: Vec<OrderInstruction>) -> Result<()> {
        while !pending.is_empty() {
            let mut next = Vec::new();
            for instruction in pending {
                let report: ExecutionReport = self.executor.execute(&instruction).await?;
                next.extend(self.risk.apply_report(&report));
            }
            pending = next;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<ReplaySummary> {
        let archived: Vec<Position> = self.risk.book().archived()?;
        self.summary.closed = archived.len();
        self.summary.realized_pnl = archived.iter().map(|p| p.realized_pnl).sum();

        for position in self.risk.book().open_positions()? {
            self.summary.realized_pnl += position.realized_pnl;
            if let Some(price) = self.last_prices.get(&position.symbol) {
                self.summary.unrealized_pnl += position.unrealized_pnl(*price);
            }
        }
        Ok(self.summary)
    }
}
