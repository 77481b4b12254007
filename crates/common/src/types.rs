use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One OHLCV candle. Windows are ordered ascending by `open_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// False while the candle is still forming. Only closed candles enter
    /// the rolling window.
    #[serde(default = "closed_by_default")]
    pub is_closed: bool,
}

fn closed_by_default() -> bool {
    true
}

/// A live price observation for one symbol, fed to the risk state machines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl PriceTick {
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp: Utc::now(),
        }
    }
}

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short. Multiplying a price move by this gives the
    /// move in the position's favour.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Directional output of the condition evaluator. `None` is a valid result,
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Long,
    Short,
    #[default]
    None,
}

impl Signal {
    pub fn side(self) -> Option<Side> {
        match self {
            Signal::Long => Some(Side::Long),
            Signal::Short => Some(Side::Short),
            Signal::None => None,
        }
    }

    pub fn is_actionable(self) -> bool {
        self != Signal::None
    }
}

impl From<Side> for Signal {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => Signal::Long,
            Side::Short => Signal::Short,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Long => write!(f, "LONG"),
            Signal::Short => write!(f, "SHORT"),
            Signal::None => write!(f, "NONE"),
        }
    }
}

/// Why a position was fully closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Initial protective stop hit before any profit level was reached.
    StopLoss,
    /// Breakeven or locked-profit stop from levels 1 and 2.
    ProfitLock,
    /// Trailing stop behind the high-water mark after level 3.
    TrailingStop,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "stop-loss"),
            CloseReason::ProfitLock => write!(f, "profit lock"),
            CloseReason::TrailingStop => write!(f, "trailing stop"),
        }
    }
}

/// What the execution layer is being asked to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstructionKind {
    Open { leverage: u32 },
    UpdateStop { stop_price: f64 },
    PartialClose,
    Close { reason: CloseReason },
}

/// A decision emitted by the core for an external executor to carry out.
/// `quantity` is always in base units of the position being managed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInstruction {
    pub id: String,
    pub position_id: Uuid,
    pub symbol: String,
    /// Side of the position, not of the order that reduces it.
    pub side: Side,
    pub quantity: f64,
    pub kind: InstructionKind,
}

impl OrderInstruction {
    pub fn new(
        position_id: Uuid,
        symbol: impl Into<String>,
        side: Side,
        quantity: f64,
        kind: InstructionKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            position_id,
            symbol: symbol.into(),
            side,
            quantity,
            kind,
        }
    }

    /// True for instructions that reduce exposure.
    pub fn is_reducing(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::PartialClose | InstructionKind::Close { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Filled { price: f64, quantity: f64 },
    Failed { reason: String },
}

/// Outcome acknowledgement returned by the execution layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub instruction_id: String,
    pub position_id: Uuid,
    pub symbol: String,
    pub kind: InstructionKind,
    pub status: ExecutionStatus,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionReport {
    pub fn filled(instruction: &OrderInstruction, price: f64) -> Self {
        Self::with_status(
            instruction,
            ExecutionStatus::Filled {
                price,
                quantity: instruction.quantity,
            },
        )
    }

    pub fn failed(instruction: &OrderInstruction, reason: impl Into<String>) -> Self {
        Self::with_status(
            instruction,
            ExecutionStatus::Failed {
                reason: reason.into(),
            },
        )
    }

    fn with_status(instruction: &OrderInstruction, status: ExecutionStatus) -> Self {
        Self {
            instruction_id: instruction.id.clone(),
            position_id: instruction.position_id,
            symbol: instruction.symbol.clone(),
            kind: instruction.kind.clone(),
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self.status, ExecutionStatus::Filled { .. })
    }
}
