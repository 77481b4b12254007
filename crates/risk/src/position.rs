use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use common::{
    CloseReason, Error, ExecutionReport, ExecutionStatus, InstructionKind, OrderInstruction,
    Result, Side,
};

use crate::config::RiskConfig;

/// Stop ladder position. Only ever increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RiskLevel {
    Level0,
    Level1,
    Level2,
    Level3,
}

impl RiskLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LEVEL_{}", self.as_u8())
    }
}

/// Lifecycle of the one-time partial close.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PartialCloseState {
    NotTriggered,
    Pending { instruction_id: String },
    Filled,
    Failed { reason: String },
}

/// Static parameters of a position whose opening order has filled.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenParams {
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub quantity: f64,
    pub leverage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub quantity: f64,
    pub leverage: u32,
    pub stop_price: f64,
    pub level: RiskLevel,
    pub is_partial_closed: bool,
    pub partial_close: PartialCloseState,
    pub partial_close_quantity: f64,
    pub partial_close_attempts: u32,
    pub remaining_quantity: f64,
    /// Most favourable price since entry: highest for LONG, lowest for SHORT.
    pub high_water_mark: f64,
    /// Quote-currency P&L of filled reductions.
    pub realized_pnl: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
    pub exit_price: Option<f64>,
}

impl Position {
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    /// Unleveraged profit at `price`, in percent of entry.
    pub fn profit_pct(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) / self.entry_price * 100.0
    }

    /// Quote-currency P&L of the remaining quantity at `price`.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) * self.remaining_quantity
    }

    /// Profit at `price` as a percentage of posted margin.
    pub fn return_on_margin_pct(&self, price: f64) -> f64 {
        self.profit_pct(price) * self.leverage as f64
    }

    fn instruction(&self, quantity: f64, kind: InstructionKind) -> OrderInstruction {
        OrderInstruction::new(self.id, self.symbol.clone(), self.side, quantity, kind)
    }
}

/// Decisions produced by one price tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub level: RiskLevel,
    pub stop_update: Option<OrderInstruction>,
    pub partial_close: Option<OrderInstruction>,
    pub close: Option<OrderInstruction>,
}

impl TickOutcome {
    fn idle(level: RiskLevel) -> Self {
        Self {
            level,
            stop_update: None,
            partial_close: None,
            close: None,
        }
    }

    /// The new stop price, if this tick moved it.
    pub fn new_stop(&self) -> Option<f64> {
        match self.stop_update.as_ref().map(|i| &i.kind) {
            Some(InstructionKind::UpdateStop { stop_price }) => Some(*stop_price),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.stop_update.is_none() && self.partial_close.is_none() && self.close.is_none()
    }

    /// Instructions in execution order: stop update, partial close, close.
    pub fn into_instructions(self) -> impl Iterator<Item = OrderInstruction> {
        self.stop_update
            .into_iter()
            .chain(self.partial_close)
            .chain(self.close)
    }
}

/// Owns one position for its lifetime and is its only writer.
#[derive(Debug)]
pub struct PositionRiskMachine {
    position: Position,
    config: RiskConfig,
}

impl PositionRiskMachine {
    pub(crate) fn open(id: Uuid, params: OpenParams, config: RiskConfig) -> Result<Self> {
        if !(params.entry_price.is_finite() && params.entry_price > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "entry price must be positive, got {}",
                params.entry_price
            )));
        }
        if !(params.quantity.is_finite() && params.quantity > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "quantity must be positive, got {}",
                params.quantity
            )));
        }
        if params.leverage == 0 {
            return Err(Error::InvalidConfig("leverage must be at least 1".into()));
        }

        let sign = params.side.sign();
        let stop_price = params.entry_price * (1.0 - sign * config.initial_stop_pct / 100.0);

        let position = Position {
            id,
            symbol: params.symbol,
            side: params.side,
            entry_price: params.entry_price,
            quantity: params.quantity,
            leverage: params.leverage,
            stop_price,
            level: RiskLevel::Level0,
            is_partial_closed: false,
            partial_close: PartialCloseState::NotTriggered,
            partial_close_quantity: 0.0,
            partial_close_attempts: 0,
            remaining_quantity: params.quantity,
            high_water_mark: params.entry_price,
            realized_pnl: 0.0,
            opened_at: Utc::now(),
            closed_at: None,
            close_reason: None,
            exit_price: None,
        };

        info!(
            id = %position.id,
            symbol = %position.symbol,
            side = %position.side,
            entry = position.entry_price,
            quantity = position.quantity,
            leverage = position.leverage,
            stop = stop_price,
            "Position opened"
        );

        Ok(Self { position, config })
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Stop price locked in by a level, before any trailing.
    fn level_stop(&self, level: RiskLevel) -> f64 {
        let p = &self.position;
        let sign = p.side.sign();
        let lock_pct = match level {
            RiskLevel::Level0 => -self.config.initial_stop_pct,
            RiskLevel::Level1 => self.config.level_1.lock_pct,
            RiskLevel::Level2 => self.config.level_2.lock_pct,
            RiskLevel::Level3 => self.config.level_3.lock_pct,
        };
        p.entry_price * (1.0 + sign * lock_pct / 100.0)
    }

    /// Highest level whose trigger `profit_pct` reaches.
    fn level_for(&self, profit_pct: f64) -> RiskLevel {
        let levels = self.config.levels();
        if profit_pct >= levels[2].trigger_pct {
            RiskLevel::Level3
        } else if profit_pct >= levels[1].trigger_pct {
            RiskLevel::Level2
        } else if profit_pct >= levels[0].trigger_pct {
            RiskLevel::Level1
        } else {
            RiskLevel::Level0
        }
    }

    /// The tighter of two stops: higher for LONG, lower for SHORT.
    fn tighter(&self, current: f64, candidate: f64) -> f64 {
        match self.position.side {
            Side::Long => current.max(candidate),
            Side::Short => current.min(candidate),
        }
    }

    fn stop_crossed(&self, price: f64) -> bool {
        match self.position.side {
            Side::Long => price <= self.position.stop_price,
            Side::Short => price >= self.position.stop_price,
        }
    }

    /// Apply one price observation.
    ///
    /// Order: high-water mark, stop check against the stop in force, level
    /// escalation, then trailing. A closed position ignores further ticks.
    pub fn on_tick(&mut self, price: f64) -> TickOutcome {
        if self.position.is_closed() {
            return TickOutcome::idle(self.position.level);
        }
        if !(price.is_finite() && price > 0.0) {
            warn!(symbol = %self.position.symbol, price, "Ignoring invalid price tick");
            return TickOutcome::idle(self.position.level);
        }

        let mut outcome = TickOutcome::idle(self.position.level);

        self.position.high_water_mark = match self.position.side {
            Side::Long => self.position.high_water_mark.max(price),
            Side::Short => self.position.high_water_mark.min(price),
        };

        if self.stop_crossed(price) {
            outcome.close = Some(self.close_at(price));
            return outcome;
        }

        let previous_stop = self.position.stop_price;
        let target = self.level_for(self.position.profit_pct(price));
        if target > self.position.level {
            let from = self.position.level;
            self.position.level = target;
            self.position.stop_price = self.tighter(previous_stop, self.level_stop(target));
            info!(
                symbol = %self.position.symbol,
                from = %from,
                to = %target,
                price,
                stop = self.position.stop_price,
                "Risk level raised"
            );
        }

        if self.position.level == RiskLevel::Level3 {
            if self.position.partial_close == PartialCloseState::NotTriggered {
                outcome.partial_close = Some(self.issue_partial_close());
            }

            let band = self.position.side.sign() * self.config.trailing_pct / 100.0;
            let trailing = self.position.high_water_mark * (1.0 - band);
            self.position.stop_price = self.tighter(self.position.stop_price, trailing);
        }

        if self.position.stop_price != previous_stop {
            info!(
                symbol = %self.position.symbol,
                level = %self.position.level,
                high_water_mark = self.position.high_water_mark,
                stop = self.position.stop_price,
                "Stop moved"
            );
            outcome.stop_update = Some(self.position.instruction(
                self.position.remaining_quantity,
                InstructionKind::UpdateStop {
                    stop_price: self.position.stop_price,
                },
            ));
        }

        outcome.level = self.position.level;
        outcome
    }

    fn close_reason(&self) -> CloseReason {
        match self.position.level {
            RiskLevel::Level0 => CloseReason::StopLoss,
            RiskLevel::Level1 | RiskLevel::Level2 => CloseReason::ProfitLock,
            RiskLevel::Level3 => CloseReason::TrailingStop,
        }
    }

    fn close_at(&mut self, price: f64) -> OrderInstruction {
        let reason = self.close_reason();
        let quantity = self.position.remaining_quantity;
        let instruction = self
            .position
            .instruction(quantity, InstructionKind::Close { reason });

        self.position.realized_pnl += self.position.unrealized_pnl(price);
        self.position.remaining_quantity = 0.0;
        self.position.exit_price = Some(price);
        self.position.close_reason = Some(reason);
        self.position.closed_at = Some(Utc::now());

        info!(
            symbol = %self.position.symbol,
            level = %self.position.level,
            reason = %reason,
            price,
            stop = self.position.stop_price,
            quantity,
            realized_pnl = self.position.realized_pnl,
            "Position closed"
        );
        instruction
    }

    fn issue_partial_close(&mut self) -> OrderInstruction {
        let p = &mut self.position;
        if p.partial_close_quantity == 0.0 {
            p.partial_close_quantity = p.remaining_quantity * self.config.partial_close_pct / 100.0;
        }
        p.partial_close_attempts += 1;
        let instruction = p.instruction(p.partial_close_quantity, InstructionKind::PartialClose);
        p.partial_close = PartialCloseState::Pending {
            instruction_id: instruction.id.clone(),
        };
        info!(
            symbol = %p.symbol,
            quantity = p.partial_close_quantity,
            attempt = p.partial_close_attempts,
            "Partial close issued"
        );
        instruction
    }

    /// Re-issue a failed partial close. `None` unless the last attempt failed
    /// and the position is still open.
    pub fn retry_partial_close(&mut self) -> Option<OrderInstruction> {
        if self.position.is_closed()
            || !matches!(self.position.partial_close, PartialCloseState::Failed { .. })
        {
            return None;
        }
        Some(self.issue_partial_close())
    }

    /// Consume the executor's acknowledgement of a partial close.
    ///
    /// A failure leaves the trailing stop covering the full remaining quantity
    /// and is returned as `PartialCloseExecution` so the caller can retry.
    /// Acknowledgements for other instruction kinds are accepted and ignored.
    pub fn acknowledge(&mut self, report: &ExecutionReport) -> Result<()> {
        if report.kind != InstructionKind::PartialClose {
            return Ok(());
        }

        let pending_id = match &self.position.partial_close {
            PartialCloseState::Pending { instruction_id } => instruction_id.clone(),
            other => {
                warn!(
                    symbol = %self.position.symbol,
                    instruction = %report.instruction_id,
                    state = ?other,
                    "Unexpected partial close acknowledgement"
                );
                return Ok(());
            }
        };
        if pending_id != report.instruction_id {
            warn!(
                symbol = %self.position.symbol,
                expected = %pending_id,
                got = %report.instruction_id,
                "Stale partial close acknowledgement"
            );
            return Ok(());
        }

        match &report.status {
            ExecutionStatus::Filled { price, quantity } => {
                let p = &mut self.position;
                let filled = quantity.min(p.remaining_quantity);
                p.realized_pnl += p.side.sign() * (price - p.entry_price) * filled;
                p.remaining_quantity -= filled;
                p.is_partial_closed = true;
                p.partial_close = PartialCloseState::Filled;
                info!(
                    symbol = %p.symbol,
                    price,
                    quantity = filled,
                    remaining = p.remaining_quantity,
                    "Partial close filled"
                );
                if p.remaining_quantity <= 0.0 {
                    // Over-filled: nothing left to protect.
                    let reason = self.close_reason();
                    let p = &mut self.position;
                    p.remaining_quantity = 0.0;
                    p.exit_price = Some(*price);
                    p.close_reason = Some(reason);
                    p.closed_at = Some(Utc::now());
                    info!(
                        symbol = %p.symbol,
                        reason = %reason,
                        realized_pnl = p.realized_pnl,
                        "Position closed by partial fill"
                    );
                }
                Ok(())
            }
            ExecutionStatus::Failed { reason } => {
                let p = &mut self.position;
                p.partial_close = PartialCloseState::Failed {
                    reason: reason.clone(),
                };
                warn!(
                    symbol = %p.symbol,
                    reason = %reason,
                    stop = p.stop_price,
                    remaining = p.remaining_quantity,
                    "Partial close failed; stop still covers the full quantity"
                );
                Err(Error::PartialCloseExecution {
                    symbol: p.symbol.clone(),
                    quantity: p.partial_close_quantity,
                    reason: reason.clone(),
                })
            }
        }
    }
}
