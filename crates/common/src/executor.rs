use async_trait::async_trait;

use crate::{ExecutionReport, OrderInstruction, Result};

/// Abstraction over whatever carries out the core's decisions.
///
/// `PaperExecutor` implements this for simulation. A live exchange adapter
/// belongs to the host. A rejected order is reported through
/// `ExecutionReport::status`; `Err` is reserved for transport failures where
/// no report could be produced at all.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Carry out one instruction and report the outcome.
    async fn execute(&self, instruction: &OrderInstruction) -> Result<ExecutionReport>;

    /// Latest price the executor knows for a symbol.
    async fn current_price(&self, symbol: &str) -> Result<f64>;
}
