pub mod book;
pub mod config;
pub mod leverage;
pub mod manager;
pub mod position;

pub use book::PositionBook;
pub use config::{ProfitLevel, RiskConfig};
pub use leverage::{select, LeverageDecision, LeverageTier, MarketCapTier};
pub use manager::RiskManager;
pub use position::{
    OpenParams, PartialCloseState, Position, PositionRiskMachine, RiskLevel, TickOutcome,
};
