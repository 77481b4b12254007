use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use common::{ExecutionReport, OrderInstruction, PriceTick};

use crate::book::PositionBook;

/// Routes price ticks and execution acknowledgements into the position book
/// and turns the outcomes into instructions for the executor.
///
/// The book is shared so the host can open positions while this runs; all
/// state changes still happen inside each position's own machine.
pub struct RiskManager {
    book: Arc<PositionBook>,
}

impl RiskManager {
    pub fn new(book: Arc<PositionBook>) -> Self {
        Self { book }
    }

    pub fn book(&self) -> &Arc<PositionBook> {
        &self.book
    }

    /// Run until the tick channel closes or the order channel is dropped.
    pub async fn run(
        self,
        mut tick_rx: broadcast::Receiver<PriceTick>,
        mut report_rx: mpsc::Receiver<ExecutionReport>,
        order_tx: mpsc::Sender<OrderInstruction>,
    ) {
        info!("RiskManager running");
        let mut reports_open = true;
        loop {
            let instructions = tokio::select! {
                // ── Price tick ────────────────────────────────────────────
                tick = tick_rx.recv() => {
                    match tick {
                        Ok(tick) => self.apply_tick(&tick),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(dropped = n, "RiskManager tick channel lagged");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Tick channel closed, RiskManager exiting");
                            return;
                        }
                    }
                }

                // ── Execution acknowledgement ─────────────────────────────
                report = report_rx.recv(), if reports_open => {
                    match report {
                        Some(report) => self.apply_report(&report),
                        None => {
                            warn!("Execution report channel closed");
                            reports_open = false;
                            continue;
                        }
                    }
                }
            };

            for instruction in instructions {
                if order_tx.send(instruction).await.is_err() {
                    warn!("Order channel closed, RiskManager exiting");
                    return;
                }
            }
        }
    }

    /// Apply one tick; returns the instructions it produced in execution order.
    pub fn apply_tick(&self, tick: &PriceTick) -> Vec<OrderInstruction> {
        match self.book.on_tick(tick) {
            Ok(Some(outcome)) => outcome.into_instructions().collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                error!(symbol = %tick.symbol, error = %e, "Tick could not be applied");
                Vec::new()
            }
        }
    }

    /// Apply one acknowledgement. A failed partial close is re-issued while
    /// the retry budget lasts.
    pub fn apply_report(&self, report: &ExecutionReport) -> Vec<OrderInstruction> {
        match self.book.acknowledge(report) {
            Ok(()) => Vec::new(),
            Err(e) if e.is_recoverable() => {
                warn!(symbol = %report.symbol, error = %e, "Partial close failed");
                self.retry_partial_close(report).into_iter().collect()
            }
            Err(e) => {
                error!(
                    symbol = %report.symbol,
                    instruction = %report.instruction_id,
                    error = %e,
                    "Execution report rejected"
                );
                Vec::new()
            }
        }
    }

    fn retry_partial_close(&self, report: &ExecutionReport) -> Option<OrderInstruction> {
        let attempts = match self.book.get(&report.position_id) {
            Ok(Some(position)) => position.partial_close_attempts,
            Ok(None) => return None,
            Err(e) => {
                error!(error = %e, "Position lookup failed");
                return None;
            }
        };

        // The first attempt is not a retry.
        if attempts > self.book.config().partial_close_retries {
            warn!(
                symbol = %report.symbol,
                attempts,
                "Partial close retries exhausted; trailing stop covers the full quantity"
            );
            return None;
        }

        match self.book.retry_partial_close(&report.position_id) {
            Ok(instruction) => instruction,
            Err(e) => {
                error!(symbol = %report.symbol, error = %e, "Partial close retry failed");
                None
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::position::OpenParams;
    use common::{CloseReason, InstructionKind, Side};
    use std::time::Duration;

    struct Harness {
        book: Arc<PositionBook>,
        tick_tx: broadcast::Sender<PriceTick>,
        report_tx: mpsc::Sender<ExecutionReport>,
        order_rx: mpsc::Receiver<OrderInstruction>,
    }

    fn start(config: RiskConfig) -> Harness {
        let book = Arc::new(PositionBook::new(config).unwrap());
        let (tick_tx, tick_rx) = broadcast::channel(64);
        let (report_tx, report_rx) = mpsc::channel(32);
        let (order_tx, order_rx) = mpsc::channel(32);

        let manager = RiskManager::new(book.clone());
        tokio::spawn(manager.run(tick_rx, report_rx, order_tx));

        Harness {
            book,
            tick_tx,
            report_tx,
            order_rx,
        }
    }

    fn open_long(book: &PositionBook) {
        book.open(OpenParams {
            symbol: "BTCUSDT".into(),
            side: Side::Long,
            entry_price: 1000.0,
            quantity: 1.0,
            leverage: 10,
        })
        .unwrap();
    }

    async fn next_order(rx: &mut mpsc::Receiver<OrderInstruction>) -> OrderInstruction {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn stop_loss_emits_close() {
        let mut h = start(RiskConfig::default());
        open_long(&h.book);

        h.tick_tx.send(PriceTick::new("BTCUSDT", 975.0)).unwrap();

        let order = next_order(&mut h.order_rx).await;
        assert_eq!(
            order.kind,
            InstructionKind::Close {
                reason: CloseReason::StopLoss
            }
        );
        assert_eq!(order.quantity, 1.0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.book.is_empty().unwrap());
    }

    #[tokio::test]
    async fn level_three_emits_stop_then_partial_close() {
        let mut h = start(RiskConfig::default());
        open_long(&h.book);

        h.tick_tx.send(PriceTick::new("BTCUSDT", 1042.0)).unwrap();

        let stop = next_order(&mut h.order_rx).await;
        assert!(matches!(stop.kind, InstructionKind::UpdateStop { .. }));
        let partial = next_order(&mut h.order_rx).await;
        assert_eq!(partial.kind, InstructionKind::PartialClose);
        assert_eq!(partial.quantity, 0.5);

        h.report_tx
            .send(ExecutionReport::filled(&partial, 1042.0))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let position = h.book.by_symbol("BTCUSDT").unwrap().unwrap();
        assert!(position.is_partial_closed);
        assert_eq!(position.remaining_quantity, 0.5);
    }

    #[tokio::test]
    async fn failed_partial_close_is_retried_until_exhausted() {
        let config = RiskConfig {
            partial_close_retries: 1,
            ..RiskConfig::default()
        };
        let mut h = start(config);
        open_long(&h.book);

        h.tick_tx.send(PriceTick::new("BTCUSDT", 1042.0)).unwrap();
        let _stop = next_order(&mut h.order_rx).await;
        let first = next_order(&mut h.order_rx).await;

        h.report_tx
            .send(ExecutionReport::failed(&first, "rejected"))
            .await
            .unwrap();
        let retry = next_order(&mut h.order_rx).await;
        assert_eq!(retry.kind, InstructionKind::PartialClose);
        assert_ne!(retry.id, first.id);

        h.report_tx
            .send(ExecutionReport::failed(&retry, "rejected again"))
            .await
            .unwrap();
        let nothing = tokio::time::timeout(Duration::from_millis(100), h.order_rx.recv()).await;
        assert!(nothing.is_err(), "no retry after the budget is spent");

        let position = h.book.by_symbol("BTCUSDT").unwrap().unwrap();
        assert!(!position.is_partial_closed);
        assert_eq!(position.remaining_quantity, 1.0);
        assert_eq!(position.partial_close_attempts, 2);
    }
}
