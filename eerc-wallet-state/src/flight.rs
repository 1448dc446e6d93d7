//! Single-flight table of pending operations.
//!
//! One [`PendingOperation`] slot per [`OperationKind`]. Starting a kind
//! whose slot is busy is rejected, never queued. A started run is
//! represented by a [`FlightGuard`]; dropping the guard before it is
//! finished (the caller abandoned the future) puts the slot back to idle.
//!
//! Once a transaction is broadcast the guard is handed off: the slot then
//! belongs to whoever awaits the receipt and is only released through
//! [`FlightTable::complete`]. Dropping a handed-off guard changes nothing.
//!
//! The mutex is only held for in-memory reads and writes, never across an
//! await point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use eerc_common::{OperationKind, OperationStatus, OperationView, PendingOperation};
use ethers_core::types::{TxHash, U256};
use tracing::debug;

use crate::error::OrchestratorError;

#[derive(Debug)]
pub struct FlightTable {
    slots: Mutex<HashMap<OperationKind, PendingOperation>>,
}

impl FlightTable {
    pub fn new() -> Self {
        let slots = OperationKind::ALL
            .iter()
            .map(|kind| (*kind, PendingOperation::idle(*kind)))
            .collect();
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// Claim the slot for `kind`, replacing the previous (terminal or idle)
    /// record with a fresh one in `Validating`.
    pub fn begin(&self, kind: OperationKind) -> Result<FlightGuard<'_>, OrchestratorError> {
        let mut slots = self.lock();
        let slot = slots
            .entry(kind)
            .or_insert_with(|| PendingOperation::idle(kind));
        if slot.status.is_busy() {
            debug!(kind = %kind, status = ?slot.status, "rejecting duplicate submission");
            return Err(OrchestratorError::Busy(kind));
        }
        let mut fresh = PendingOperation::idle(kind);
        fresh.advance(OperationStatus::Validating);
        *slot = fresh;
        Ok(FlightGuard {
            table: self,
            kind,
            finished: false,
            handed_off: AtomicBool::new(false),
        })
    }

    /// Terminal write for a handed-off slot.
    pub fn complete(&self, kind: OperationKind, outcome: Result<(), String>) {
        self.update(kind, |op| match outcome {
            Ok(()) => {
                op.last_error = None;
                op.advance(OperationStatus::Succeeded)
            }
            Err(message) => {
                op.last_error = Some(message);
                op.advance(OperationStatus::Failed)
            }
        });
    }

    pub fn get(&self, kind: OperationKind) -> PendingOperation {
        self.lock()
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| PendingOperation::idle(kind))
    }

    pub fn view(&self, kind: OperationKind) -> OperationView {
        self.get(kind).view()
    }

    fn update<R>(&self, kind: OperationKind, f: impl FnOnce(&mut PendingOperation) -> R) -> R {
        let mut slots = self.lock();
        let slot = slots
            .entry(kind)
            .or_insert_with(|| PendingOperation::idle(kind));
        f(slot)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<OperationKind, PendingOperation>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for FlightTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive claim on one operation slot.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    table: &'a FlightTable,
    kind: OperationKind,
    finished: bool,
    handed_off: AtomicBool,
}

impl FlightGuard<'_> {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn status(&self) -> OperationStatus {
        self.table.get(self.kind).status
    }

    /// Forward-only; returns `false` when `next` would move backwards.
    pub fn advance(&self, next: OperationStatus) -> bool {
        self.table.update(self.kind, |op| op.advance(next))
    }

    pub fn set_required_amount(&self, amount: U256) {
        self.table
            .update(self.kind, |op| op.required_amount = Some(amount));
    }

    pub fn set_tx_hash(&self, tx_hash: TxHash) {
        self.table
            .update(self.kind, |op| op.result_tx_hash = Some(tx_hash));
    }

    /// Give up ownership of the slot; from here on only
    /// [`FlightTable::complete`] ends it.
    pub fn hand_off(&self) {
        self.handed_off.store(true, Ordering::SeqCst);
    }

    pub fn is_handed_off(&self) -> bool {
        self.handed_off.load(Ordering::SeqCst)
    }

    /// No-op on the slot once handed off.
    pub fn succeed(mut self) {
        self.finished = true;
        if !self.is_handed_off() {
            self.table.complete(self.kind, Ok(()));
        }
    }

    /// No-op on the slot once handed off.
    pub fn fail(mut self, message: String) {
        self.finished = true;
        if !self.is_handed_off() {
            self.table.complete(self.kind, Err(message));
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self.is_handed_off() {
            debug!(kind = %self.kind, "caller gone after broadcast; slot stays busy until confirmation");
            return;
        }
        let kind = self.kind;
        debug!(kind = %kind, "operation abandoned; releasing slot");
        self.table.update(kind, |op| {
            *op = PendingOperation {
                result_tx_hash: op.result_tx_hash,
                ..PendingOperation::idle(kind)
            }
        });
    }
}
