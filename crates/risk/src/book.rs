use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info};
use uuid::Uuid;

use common::{Error, ExecutionReport, OrderInstruction, PriceTick, Result};

use crate::config::RiskConfig;
use crate::position::{OpenParams, Position, PositionRiskMachine, TickOutcome};

#[derive(Default)]
struct OpenPositions {
    machines: HashMap<Uuid, Arc<Mutex<PositionRiskMachine>>>,
    by_symbol: HashMap<String, Uuid>,
}

/// Table of open positions, one state machine each.
///
/// The table lock is held only to look a machine up. Updates to a position
/// run under that position's own mutex, so ticks for different symbols never
/// wait on each other while ticks for one position apply in arrival order.
pub struct PositionBook {
    config: RiskConfig,
    open: RwLock<OpenPositions>,
    archive: Mutex<Vec<Position>>,
}

fn poisoned<T>(_: T) -> Error {
    Error::Poisoned("position book".into())
}

impl PositionBook {
    pub fn new(config: RiskConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            open: RwLock::new(OpenPositions::default()),
            archive: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Start managing a position whose opening order has filled.
    /// At most one open position per symbol.
    pub fn open(&self, params: OpenParams) -> Result<Position> {
        self.open_with_id(Uuid::new_v4(), params)
    }

    /// Like [`open`](Self::open), keeping the id the opening order was sent with.
    pub fn open_with_id(&self, id: Uuid, params: OpenParams) -> Result<Position> {
        let mut open = self.open.write().map_err(poisoned)?;
        if open.by_symbol.contains_key(&params.symbol) {
            return Err(Error::DuplicatePosition(params.symbol));
        }
        if open.machines.contains_key(&id) || self.archived_position(&id)?.is_some() {
            return Err(Error::DuplicatePosition(id.to_string()));
        }

        let machine = PositionRiskMachine::open(id, params, self.config.clone())?;
        let position = machine.position().clone();
        open.by_symbol.insert(position.symbol.clone(), position.id);
        open.machines
            .insert(position.id, Arc::new(Mutex::new(machine)));
        Ok(position)
    }

    fn machine(&self, id: &Uuid) -> Result<Option<Arc<Mutex<PositionRiskMachine>>>> {
        let open = self.open.read().map_err(poisoned)?;
        Ok(open.machines.get(id).cloned())
    }

    fn machine_for_symbol(&self, symbol: &str) -> Result<Option<Arc<Mutex<PositionRiskMachine>>>> {
        let open = self.open.read().map_err(poisoned)?;
        Ok(open
            .by_symbol
            .get(symbol)
            .and_then(|id| open.machines.get(id))
            .cloned())
    }

    /// Apply a tick to the symbol's open position, if any. A position that
    /// closes on this tick moves to the archive.
    pub fn on_tick(&self, tick: &PriceTick) -> Result<Option<TickOutcome>> {
        let Some(machine) = self.machine_for_symbol(&tick.symbol)? else {
            return Ok(None);
        };

        let (outcome, closed) = {
            let mut machine = machine.lock().map_err(poisoned)?;
            let outcome = machine.on_tick(tick.price);
            let closed = machine
                .position()
                .is_closed()
                .then(|| machine.position().clone());
            (outcome, closed)
        };

        if let Some(position) = closed {
            self.archive_position(position)?;
        }
        Ok(Some(outcome))
    }

    fn archive_position(&self, position: Position) -> Result<()> {
        {
            let mut open = self.open.write().map_err(poisoned)?;
            open.machines.remove(&position.id);
            if open.by_symbol.get(&position.symbol) == Some(&position.id) {
                open.by_symbol.remove(&position.symbol);
            }
        }
        info!(id = %position.id, symbol = %position.symbol, "Position archived");
        self.archive.lock().map_err(poisoned)?.push(position);
        Ok(())
    }

    /// Route an execution acknowledgement to its position.
    pub fn acknowledge(&self, report: &ExecutionReport) -> Result<()> {
        match self.machine(&report.position_id)? {
            Some(machine) => {
                let (result, closed) = {
                    let mut machine = machine.lock().map_err(poisoned)?;
                    let result = machine.acknowledge(report);
                    let closed = machine
                        .position()
                        .is_closed()
                        .then(|| machine.position().clone());
                    (result, closed)
                };
                if let Some(position) = closed {
                    self.archive_position(position)?;
                }
                result
            }
            None if self.archived_position(&report.position_id)?.is_some() => {
                debug!(
                    id = %report.position_id,
                    instruction = %report.instruction_id,
                    "Acknowledgement for archived position"
                );
                Ok(())
            }
            None => Err(Error::UnknownPosition(report.position_id.to_string())),
        }
    }

    /// Re-issue a failed partial close for `id`.
    pub fn retry_partial_close(&self, id: &Uuid) -> Result<Option<OrderInstruction>> {
        let machine = self
            .machine(id)?
            .ok_or_else(|| Error::UnknownPosition(id.to_string()))?;
        let mut machine = machine.lock().map_err(poisoned)?;
        Ok(machine.retry_partial_close())
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<Position>> {
        match self.machine(id)? {
            Some(machine) => Ok(Some(machine.lock().map_err(poisoned)?.position().clone())),
            None => Ok(None),
        }
    }

    pub fn by_symbol(&self, symbol: &str) -> Result<Option<Position>> {
        match self.machine_for_symbol(symbol)? {
            Some(machine) => Ok(Some(machine.lock().map_err(poisoned)?.position().clone())),
            None => Ok(None),
        }
    }

    pub fn open_positions(&self) -> Result<Vec<Position>> {
        let machines: Vec<_> = {
            let open = self.open.read().map_err(poisoned)?;
            open.machines.values().cloned().collect()
        };
        machines
            .iter()
            .map(|m| Ok(m.lock().map_err(poisoned)?.position().clone()))
            .collect()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.open.read().map_err(poisoned)?.machines.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Closed positions, oldest first.
    pub fn archived(&self) -> Result<Vec<Position>> {
        Ok(self.archive.lock().map_err(poisoned)?.clone())
    }

    pub fn archived_position(&self, id: &Uuid) -> Result<Option<Position>> {
        let archive = self.archive.lock().map_err(poisoned)?;
        Ok(archive.iter().find(|p| p.id == *id).cloned())
    }
}
