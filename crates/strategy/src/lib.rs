pub mod config;
pub mod evaluator;
pub mod indicators;
pub mod registry;

pub use config::{
    ConditionEntry, ConditionSpec, EmaPeriods, EmaRole, PriceSide, StrategyConfig,
    StrategyFileConfig, TradeDirection,
};
pub use evaluator::{analyze, evaluate, ConditionCheck, Diagnostic, Evaluation};
pub use indicators::IndicatorSnapshot;
pub use registry::{SignalRegistry, SymbolSignal};
