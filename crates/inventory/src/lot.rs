//! Lot ledger: purchase batches of a part and their depletion.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fleetdepot_catalog::StockItemId;
use fleetdepot_core::{DomainError, DomainResult, Entity};

use crate::adjustment::AdjustmentId;

/// Lot identifier (one purchase batch of one part).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LotId(pub Uuid);

impl LotId {
    /// Uses UUIDv7 (time-ordered); pass explicit ids in tests.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LotId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for LotId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A traceable batch of a part acquired at one unit cost.
///
/// `remaining` never goes below zero: depletion beyond the remainder is
/// rejected before any state changes. Quantity only ever increases at
/// creation; revaluation rewrites cost, never quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub part_id: StockItemId,
    pub remaining: Decimal,
    pub unit_cost: Decimal,
    /// The entry adjustment that created this batch.
    pub entry_ref: AdjustmentId,
    pub received_at: DateTime<Utc>,
}

impl Entity for Lot {
    type Id = LotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Lot {
    pub fn is_available(&self) -> bool {
        self.remaining > Decimal::ZERO
    }

    /// Take `quantity` (positive) out of this lot.
    pub fn deplete(&mut self, quantity: Decimal) -> DomainResult<()> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation(
                "depletion quantity must be positive",
            ));
        }
        if quantity > self.remaining {
            return Err(DomainError::insufficient_lot(quantity, self.remaining));
        }
        self.remaining -= quantity;
        Ok(())
    }

    /// Rewrite the acquisition cost. Quantity is untouched.
    pub fn revalue(&mut self, unit_cost: Decimal) {
        self.unit_cost = unit_cost;
    }
}

/// The lot ledger held inside the stockroom aggregate state.
///
/// Selection policy is the operator's: `available_for` orders oldest-first so
/// a caller can *suggest* FIFO, but nothing here auto-picks a lot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LotLedger {
    lots: HashMap<LotId, Lot>,
}

impl LotLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &LotId) -> Option<&Lot> {
        self.lots.get(id)
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    /// Lots of `part_id` with stock left, oldest acquisition first
    /// (receipt time, then lot id for determinism).
    pub fn available_for(&self, part_id: &StockItemId) -> Vec<&Lot> {
        let mut lots: Vec<&Lot> = self
            .lots
            .values()
            .filter(|l| l.part_id == *part_id && l.is_available())
            .collect();
        lots.sort_by_key(|l| (l.received_at, l.id.0));
        lots
    }

    /// Record a freshly received batch. Lot ids are never reused.
    pub fn receive(&mut self, lot: Lot) -> DomainResult<()> {
        if lot.remaining <= Decimal::ZERO {
            return Err(DomainError::validation("lot quantity must be positive"));
        }
        if self.lots.contains_key(&lot.id) {
            return Err(DomainError::invariant(format!(
                "lot {} already exists",
                lot.id
            )));
        }
        self.lots.insert(lot.id, lot);
        Ok(())
    }

    /// Deplete a named lot of `part_id`, returning the remainder after.
    ///
    /// The caller names the lot; this only enforces that it exists, belongs
    /// to the part, and still holds enough.
    pub fn deplete(
        &mut self,
        part_id: &StockItemId,
        lot_id: &LotId,
        quantity: Decimal,
    ) -> DomainResult<Decimal> {
        let lot = self.resolve_mut(part_id, lot_id)?;
        lot.deplete(quantity)?;
        Ok(lot.remaining)
    }

    /// Rewrite a named lot's unit cost (quantity untouched).
    pub fn revalue(
        &mut self,
        part_id: &StockItemId,
        lot_id: &LotId,
        unit_cost: Decimal,
    ) -> DomainResult<()> {
        let lot = self.resolve_mut(part_id, lot_id)?;
        lot.revalue(unit_cost);
        Ok(())
    }

    /// Remaining-quantity-weighted average cost over a part's lots.
    ///
    /// `None` when the part has no stock left in any lot.
    pub fn part_average_cost(&self, part_id: &StockItemId) -> Option<Decimal> {
        let mut total_qty = Decimal::ZERO;
        let mut total_value = Decimal::ZERO;
        for lot in self.lots.values().filter(|l| l.part_id == *part_id) {
            total_qty += lot.remaining;
            total_value += lot.remaining * lot.unit_cost;
        }
        if total_qty > Decimal::ZERO {
            Some(total_value / total_qty)
        } else {
            None
        }
    }

    /// Re-insert a lot during event replay (infallible path).
    pub(crate) fn restore(&mut self, lot: Lot) {
        self.lots.insert(lot.id, lot);
    }

    /// Overwrite a lot's remainder during event replay (infallible path).
    pub(crate) fn set_remaining(&mut self, lot_id: &LotId, remaining: Decimal) {
        if let Some(lot) = self.lots.get_mut(lot_id) {
            lot.remaining = remaining;
        }
    }

    /// Overwrite a lot's unit cost during event replay (infallible path).
    pub(crate) fn set_unit_cost(&mut self, lot_id: &LotId, unit_cost: Decimal) {
        if let Some(lot) = self.lots.get_mut(lot_id) {
            lot.unit_cost = unit_cost;
        }
    }

    fn resolve_mut(&mut self, part_id: &StockItemId, lot_id: &LotId) -> DomainResult<&mut Lot> {
        let lot = self
            .lots
            .get_mut(lot_id)
            .ok_or_else(|| DomainError::stale_reference(format!("lot {lot_id} no longer exists")))?;
        if lot.part_id != *part_id {
            return Err(DomainError::stale_reference(format!(
                "lot {lot_id} does not belong to part {part_id}"
            )));
        }
        Ok(lot)
    }
}
