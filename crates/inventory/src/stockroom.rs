//! The stockroom ledger aggregate.
//!
//! One instance per physical stockroom. It owns every stock quantity,
//! weighted-average cost and lot in that room, so applying an adjustment or a
//! count is a single command against a single stream: all-or-nothing across
//! lines, serialized per stockroom by the store's optimistic concurrency
//! check.
//!
//! `handle` resolves every line against a working copy of the state and emits
//! one event whose per-line effects already carry the recomputed figures;
//! `apply` only replays those figures, keeping rehydration deterministic.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use fleetdepot_catalog::{StockItemDetails, StockItemId, StockItemKind};
use fleetdepot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use fleetdepot_events::Event;

use crate::adjustment::{AdjustmentId, AdjustmentType, LineId};
use crate::count::{CountLine, CountSessionId};
use crate::lot::{Lot, LotId, LotLedger};
use crate::rules::{self, Rule, RuleViolation};

/// Stockroom identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockroomId(pub AggregateId);

impl StockroomId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StockroomId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Current ledger figures for one registered item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    pub kind: StockItemKind,
    pub details: StockItemDetails,
    pub on_hand: Decimal,
    pub average_cost: Decimal,
}

/// A resolved, ledger-facing adjustment line.
///
/// For ENTRY lines on parts `lot_id` is the id the new lot is created under
/// (chosen by the caller, since `handle` cannot generate ids); for EXIT and
/// REVALUATION it names the existing lot; for supplies it is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustmentLine {
    pub line_id: LineId,
    pub item_id: StockItemId,
    pub lot_id: Option<LotId>,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

/// Aggregate root: Stockroom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stockroom {
    id: StockroomId,
    tenant_id: Option<TenantId>,
    name: String,
    items: HashMap<StockItemId, StockLevel>,
    lots: LotLedger,
    applied_adjustments: HashSet<AdjustmentId>,
    applied_counts: HashSet<CountSessionId>,
    version: u64,
    created: bool,
}

impl Stockroom {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StockroomId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            items: HashMap::new(),
            lots: LotLedger::new(),
            applied_adjustments: HashSet::new(),
            applied_counts: HashSet::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StockroomId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stock_level(&self, item_id: &StockItemId) -> Option<&StockLevel> {
        self.items.get(item_id)
    }

    pub fn lots(&self) -> &LotLedger {
        &self.lots
    }

    pub fn is_adjustment_applied(&self, adjustment_id: &AdjustmentId) -> bool {
        self.applied_adjustments.contains(adjustment_id)
    }

    pub fn is_count_applied(&self, count_id: &CountSessionId) -> bool {
        self.applied_counts.contains(count_id)
    }
}

impl AggregateRoot for Stockroom {
    type Id = StockroomId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: EstablishStockroom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstablishStockroom {
    pub tenant_id: TenantId,
    pub stockroom_id: StockroomId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RegisterItem (catalog entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterItem {
    pub tenant_id: TenantId,
    pub stockroom_id: StockroomId,
    pub item_id: StockItemId,
    pub kind: StockItemKind,
    pub details: StockItemDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplyAdjustment (the single atomic ledger mutation for a
/// pending adjustment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyAdjustment {
    pub tenant_id: TenantId,
    pub stockroom_id: StockroomId,
    pub adjustment_id: AdjustmentId,
    pub adjustment_type: AdjustmentType,
    pub lines: Vec<StockAdjustmentLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplyCount (full overwrite of counted supplies).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyCount {
    pub tenant_id: TenantId,
    pub stockroom_id: StockroomId,
    pub count_id: CountSessionId,
    pub lines: Vec<CountLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockroomCommand {
    EstablishStockroom(EstablishStockroom),
    RegisterItem(RegisterItem),
    ApplyAdjustment(ApplyAdjustment),
    ApplyCount(ApplyCount),
}

/// Per-line outcome embedded in ledger events.
///
/// Carries the recomputed figures so replay never recomputes and the edit
/// surface gets its acknowledgment straight from the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEffect {
    pub line_id: LineId,
    pub item_id: StockItemId,
    pub lot_id: Option<LotId>,
    /// Signed on-hand change this line caused.
    pub quantity_delta: Decimal,
    pub new_on_hand: Decimal,
    pub new_average_cost: Decimal,
    /// Remainder of the touched lot after this line (parts only).
    pub lot_remaining: Option<Decimal>,
    /// Unit cost recorded on the touched lot (parts only).
    pub lot_unit_cost: Option<Decimal>,
}

/// Event: StockroomEstablished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockroomEstablished {
    pub tenant_id: TenantId,
    pub stockroom_id: StockroomId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistered {
    pub tenant_id: TenantId,
    pub stockroom_id: StockroomId,
    pub item_id: StockItemId,
    pub kind: StockItemKind,
    pub details: StockItemDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AdjustmentApplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentApplied {
    pub tenant_id: TenantId,
    pub stockroom_id: StockroomId,
    pub adjustment_id: AdjustmentId,
    pub adjustment_type: AdjustmentType,
    pub effects: Vec<LineEffect>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CountReconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountReconciled {
    pub tenant_id: TenantId,
    pub stockroom_id: StockroomId,
    pub count_id: CountSessionId,
    pub effects: Vec<LineEffect>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockroomEvent {
    StockroomEstablished(StockroomEstablished),
    ItemRegistered(ItemRegistered),
    AdjustmentApplied(AdjustmentApplied),
    CountReconciled(CountReconciled),
}

impl Event for StockroomEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockroomEvent::StockroomEstablished(_) => "inventory.stockroom.established",
            StockroomEvent::ItemRegistered(_) => "inventory.stockroom.item_registered",
            StockroomEvent::AdjustmentApplied(_) => "inventory.stockroom.adjustment_applied",
            StockroomEvent::CountReconciled(_) => "inventory.stockroom.count_reconciled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockroomEvent::StockroomEstablished(e) => e.occurred_at,
            StockroomEvent::ItemRegistered(e) => e.occurred_at,
            StockroomEvent::AdjustmentApplied(e) => e.occurred_at,
            StockroomEvent::CountReconciled(e) => e.occurred_at,
        }
    }
}

/// Running weighted average after receiving `quantity` at `unit_cost`.
fn weighted_average(
    on_hand: Decimal,
    average_cost: Decimal,
    quantity: Decimal,
    unit_cost: Decimal,
) -> Decimal {
    let total = on_hand + quantity;
    if total <= Decimal::ZERO {
        return unit_cost;
    }
    (on_hand * average_cost + quantity * unit_cost) / total
}

impl Aggregate for Stockroom {
    type Command = StockroomCommand;
    type Event = StockroomEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockroomEvent::StockroomEstablished(e) => {
                self.id = e.stockroom_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.created = true;
            }
            StockroomEvent::ItemRegistered(e) => {
                self.items.insert(
                    e.item_id,
                    StockLevel {
                        kind: e.kind,
                        details: e.details.clone(),
                        on_hand: Decimal::ZERO,
                        average_cost: Decimal::ZERO,
                    },
                );
            }
            StockroomEvent::AdjustmentApplied(e) => {
                self.applied_adjustments.insert(e.adjustment_id);
                for effect in &e.effects {
                    self.replay_lot_effect(e.adjustment_type, e.adjustment_id, e.occurred_at, effect);
                    if let Some(item) = self.items.get_mut(&effect.item_id) {
                        item.on_hand = effect.new_on_hand;
                        item.average_cost = effect.new_average_cost;
                    }
                }
            }
            StockroomEvent::CountReconciled(e) => {
                self.applied_counts.insert(e.count_id);
                for effect in &e.effects {
                    if let Some(item) = self.items.get_mut(&effect.item_id) {
                        item.on_hand = effect.new_on_hand;
                        item.average_cost = effect.new_average_cost;
                    }
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockroomCommand::EstablishStockroom(cmd) => self.handle_establish(cmd),
            StockroomCommand::RegisterItem(cmd) => self.handle_register(cmd),
            StockroomCommand::ApplyAdjustment(cmd) => self.handle_apply_adjustment(cmd),
            StockroomCommand::ApplyCount(cmd) => self.handle_apply_count(cmd),
        }
    }
}

impl Stockroom {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_stockroom_id(&self, stockroom_id: StockroomId) -> Result<(), DomainError> {
        if self.id != stockroom_id {
            return Err(DomainError::invariant("stockroom_id mismatch"));
        }
        Ok(())
    }

    fn handle_establish(
        &self,
        cmd: &EstablishStockroom,
    ) -> Result<Vec<StockroomEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("stockroom already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![StockroomEvent::StockroomEstablished(
            StockroomEstablished {
                tenant_id: cmd.tenant_id,
                stockroom_id: cmd.stockroom_id,
                name: cmd.name.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_register(&self, cmd: &RegisterItem) -> Result<Vec<StockroomEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_stockroom_id(cmd.stockroom_id)?;

        if self.items.contains_key(&cmd.item_id) {
            return Err(DomainError::conflict("stock item already registered"));
        }
        if cmd.details.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.details.minimum_stock < Decimal::ZERO {
            return Err(DomainError::validation(
                "minimum stock cannot be negative",
            ));
        }

        Ok(vec![StockroomEvent::ItemRegistered(ItemRegistered {
            tenant_id: cmd.tenant_id,
            stockroom_id: cmd.stockroom_id,
            item_id: cmd.item_id,
            kind: cmd.kind,
            details: cmd.details.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply_adjustment(
        &self,
        cmd: &ApplyAdjustment,
    ) -> Result<Vec<StockroomEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_stockroom_id(cmd.stockroom_id)?;

        if self.applied_adjustments.contains(&cmd.adjustment_id) {
            return Err(DomainError::already_applied(format!(
                "adjustment {} is already applied",
                cmd.adjustment_id
            )));
        }
        if cmd.lines.is_empty() {
            return Err(RuleViolation::header(Rule::LinesRequired).into());
        }

        // Resolve against working copies so a failing line aborts the whole
        // command with nothing half-applied, including cumulative depletion
        // of one lot across lines.
        let mut items = self.items.clone();
        let mut lots = self.lots.clone();
        let mut effects = Vec::with_capacity(cmd.lines.len());

        for (idx, line) in cmd.lines.iter().enumerate() {
            if let Some(rule) = rules::quantity_rule(cmd.adjustment_type, line.quantity) {
                return Err(RuleViolation::at_line(rule, idx).into());
            }

            let item = items.get_mut(&line.item_id).ok_or_else(|| {
                DomainError::stale_reference(format!(
                    "stock item {} no longer exists (line {})",
                    line.item_id,
                    idx + 1
                ))
            })?;

            let effect = match cmd.adjustment_type {
                AdjustmentType::Entry => entry_effect(
                    item,
                    &mut lots,
                    line,
                    cmd.adjustment_id,
                    cmd.occurred_at,
                    idx,
                )?,
                AdjustmentType::Exit => exit_effect(item, &mut lots, line, idx)?,
                AdjustmentType::Revaluation => revaluation_effect(item, &mut lots, line, idx)?,
            };
            effects.push(effect);
        }

        Ok(vec![StockroomEvent::AdjustmentApplied(AdjustmentApplied {
            tenant_id: cmd.tenant_id,
            stockroom_id: cmd.stockroom_id,
            adjustment_id: cmd.adjustment_id,
            adjustment_type: cmd.adjustment_type,
            effects,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply_count(&self, cmd: &ApplyCount) -> Result<Vec<StockroomEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_stockroom_id(cmd.stockroom_id)?;

        if self.applied_counts.contains(&cmd.count_id) {
            return Err(DomainError::already_applied(format!(
                "count {} is already applied",
                cmd.count_id
            )));
        }
        if cmd.lines.is_empty() {
            return Err(RuleViolation::header(Rule::LinesRequired).into());
        }

        let mut items = self.items.clone();
        let mut effects = Vec::with_capacity(cmd.lines.len());

        for (idx, line) in cmd.lines.iter().enumerate() {
            if line.counted_qty < Decimal::ZERO {
                return Err(RuleViolation::at_line(Rule::CountedQuantityNegative, idx).into());
            }
            if line.unit_cost < Decimal::ZERO {
                return Err(RuleViolation::at_line(Rule::UnitCostNegative, idx).into());
            }

            let item = items.get_mut(&line.supply_id).ok_or_else(|| {
                DomainError::stale_reference(format!(
                    "supply {} no longer exists (line {})",
                    line.supply_id,
                    idx + 1
                ))
            })?;
            if item.kind != StockItemKind::Supply {
                return Err(DomainError::validation(format!(
                    "item {} is lot-tracked; counts cover supplies (line {})",
                    line.supply_id,
                    idx + 1
                )));
            }

            // Full overwrite, never a delta merge.
            let delta = line.counted_qty - item.on_hand;
            item.on_hand = line.counted_qty;
            item.average_cost = line.unit_cost;

            effects.push(LineEffect {
                line_id: line.line_id,
                item_id: line.supply_id,
                lot_id: None,
                quantity_delta: delta,
                new_on_hand: line.counted_qty,
                new_average_cost: line.unit_cost,
                lot_remaining: None,
                lot_unit_cost: None,
            });
        }

        Ok(vec![StockroomEvent::CountReconciled(CountReconciled {
            tenant_id: cmd.tenant_id,
            stockroom_id: cmd.stockroom_id,
            count_id: cmd.count_id,
            effects,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn replay_lot_effect(
        &mut self,
        adjustment_type: AdjustmentType,
        adjustment_id: AdjustmentId,
        occurred_at: DateTime<Utc>,
        effect: &LineEffect,
    ) {
        let Some(lot_id) = effect.lot_id else {
            return;
        };
        match adjustment_type {
            AdjustmentType::Entry => {
                self.lots.restore(Lot {
                    id: lot_id,
                    part_id: effect.item_id,
                    remaining: effect.lot_remaining.unwrap_or(Decimal::ZERO),
                    unit_cost: effect.lot_unit_cost.unwrap_or(Decimal::ZERO),
                    entry_ref: adjustment_id,
                    received_at: occurred_at,
                });
            }
            AdjustmentType::Exit => {
                if let Some(remaining) = effect.lot_remaining {
                    self.lots.set_remaining(&lot_id, remaining);
                }
            }
            AdjustmentType::Revaluation => {
                if let Some(unit_cost) = effect.lot_unit_cost {
                    self.lots.set_unit_cost(&lot_id, unit_cost);
                }
            }
        }
    }
}

fn entry_effect(
    item: &mut StockLevel,
    lots: &mut LotLedger,
    line: &StockAdjustmentLine,
    entry_ref: AdjustmentId,
    received_at: DateTime<Utc>,
    idx: usize,
) -> Result<LineEffect, DomainError> {
    if line.unit_cost < Decimal::ZERO {
        return Err(RuleViolation::at_line(Rule::UnitCostNegative, idx).into());
    }

    let mut lot_remaining = None;
    let mut lot_unit_cost = None;
    if item.kind.is_lot_tracked() {
        let lot_id = line
            .lot_id
            .ok_or_else(|| DomainError::invariant("entry line for a part carries no lot id"))?;
        lots.receive(Lot {
            id: lot_id,
            part_id: line.item_id,
            remaining: line.quantity,
            unit_cost: line.unit_cost,
            entry_ref,
            received_at,
        })?;
        lot_remaining = Some(line.quantity);
        lot_unit_cost = Some(line.unit_cost);
    } else if line.lot_id.is_some() {
        return Err(DomainError::invariant("supplies are not lot-tracked"));
    }

    let new_average_cost =
        weighted_average(item.on_hand, item.average_cost, line.quantity, line.unit_cost);
    item.on_hand += line.quantity;
    item.average_cost = new_average_cost;

    Ok(LineEffect {
        line_id: line.line_id,
        item_id: line.item_id,
        lot_id: line.lot_id,
        quantity_delta: line.quantity,
        new_on_hand: item.on_hand,
        new_average_cost,
        lot_remaining,
        lot_unit_cost,
    })
}

fn exit_effect(
    item: &mut StockLevel,
    lots: &mut LotLedger,
    line: &StockAdjustmentLine,
    idx: usize,
) -> Result<LineEffect, DomainError> {
    let take = -line.quantity;

    let mut lot_remaining = None;
    let mut lot_unit_cost = None;
    if item.kind.is_lot_tracked() {
        let lot_id = line
            .lot_id
            .ok_or_else(|| RuleViolation::at_line(Rule::LotRequiredForPartIssue, idx))?;
        let remaining = lots.deplete(&line.item_id, &lot_id, take)?;
        lot_remaining = Some(remaining);
        lot_unit_cost = lots.get(&lot_id).map(|l| l.unit_cost);
    } else if line.lot_id.is_some() {
        return Err(DomainError::invariant("supplies are not lot-tracked"));
    }

    if item.on_hand - take < Decimal::ZERO {
        return Err(DomainError::invariant("stock cannot go negative"));
    }
    item.on_hand -= take;
    // Issues never move the weighted average.

    Ok(LineEffect {
        line_id: line.line_id,
        item_id: line.item_id,
        lot_id: line.lot_id,
        quantity_delta: line.quantity,
        new_on_hand: item.on_hand,
        new_average_cost: item.average_cost,
        lot_remaining,
        lot_unit_cost,
    })
}

fn revaluation_effect(
    item: &mut StockLevel,
    lots: &mut LotLedger,
    line: &StockAdjustmentLine,
    idx: usize,
) -> Result<LineEffect, DomainError> {
    if line.unit_cost < Decimal::ZERO {
        return Err(RuleViolation::at_line(Rule::UnitCostNegative, idx).into());
    }

    let mut lot_remaining = None;
    let mut lot_unit_cost = None;
    if item.kind.is_lot_tracked() {
        let lot_id = line
            .lot_id
            .ok_or_else(|| RuleViolation::at_line(Rule::LotRequiredForPartIssue, idx))?;
        lots.revalue(&line.item_id, &lot_id, line.unit_cost)?;
        // The item's average follows its remaining lots; an exhausted part
        // just takes the revalued cost.
        item.average_cost = lots
            .part_average_cost(&line.item_id)
            .unwrap_or(line.unit_cost);
        lot_remaining = lots.get(&lot_id).map(|l| l.remaining);
        lot_unit_cost = Some(line.unit_cost);
    } else {
        if line.lot_id.is_some() {
            return Err(DomainError::invariant("supplies are not lot-tracked"));
        }
        item.average_cost = line.unit_cost;
    }

    Ok(LineEffect {
        line_id: line.line_id,
        item_id: line.item_id,
        lot_id: line.lot_id,
        quantity_delta: Decimal::ZERO,
        new_on_hand: item.on_hand,
        new_average_cost: item.average_cost,
        lot_remaining,
        lot_unit_cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_stockroom_id() -> StockroomId {
        StockroomId::new(AggregateId::new())
    }

    fn test_item_id() -> StockItemId {
        StockItemId::new(AggregateId::new())
    }

    fn test_adjustment_id() -> AdjustmentId {
        AdjustmentId::new(AggregateId::new())
    }

    fn test_count_id() -> CountSessionId {
        CountSessionId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn details(name: &str) -> StockItemDetails {
        StockItemDetails::new(name, "ea", Decimal::ZERO)
    }

    struct Fixture {
        stockroom: Stockroom,
        tenant_id: TenantId,
        stockroom_id: StockroomId,
    }

    impl Fixture {
        fn new() -> Self {
            let tenant_id = test_tenant_id();
            let stockroom_id = test_stockroom_id();
            let mut stockroom = Stockroom::empty(stockroom_id);
            let events = stockroom
                .handle(&StockroomCommand::EstablishStockroom(EstablishStockroom {
                    tenant_id,
                    stockroom_id,
                    name: "Main depot".to_string(),
                    occurred_at: test_time(),
                }))
                .unwrap();
            for e in &events {
                stockroom.apply(e);
            }
            Self {
                stockroom,
                tenant_id,
                stockroom_id,
            }
        }

        fn dispatch(&mut self, command: StockroomCommand) -> Vec<StockroomEvent> {
            let events = self.stockroom.handle(&command).unwrap();
            for e in &events {
                self.stockroom.apply(e);
            }
            events
        }

        fn register(&mut self, kind: StockItemKind, name: &str) -> StockItemId {
            let item_id = test_item_id();
            self.dispatch(StockroomCommand::RegisterItem(RegisterItem {
                tenant_id: self.tenant_id,
                stockroom_id: self.stockroom_id,
                item_id,
                kind,
                details: details(name),
                occurred_at: test_time(),
            }));
            item_id
        }

        fn entry(&mut self, item_id: StockItemId, lot_id: Option<LotId>, qty: i64, cost: Decimal) {
            self.dispatch(StockroomCommand::ApplyAdjustment(ApplyAdjustment {
                tenant_id: self.tenant_id,
                stockroom_id: self.stockroom_id,
                adjustment_id: test_adjustment_id(),
                adjustment_type: AdjustmentType::Entry,
                lines: vec![StockAdjustmentLine {
                    line_id: LineId::new(),
                    item_id,
                    lot_id,
                    quantity: Decimal::from(qty),
                    unit_cost: cost,
                }],
                occurred_at: test_time(),
            }));
        }
    }

    #[test]
    fn entry_recomputes_weighted_average() {
        let mut fx = Fixture::new();
        let part = fx.register(StockItemKind::Part, "Brake pad");

        // 10 @ 2.00, then 5 @ 4.00.
        fx.entry(part, Some(LotId::new()), 10, Decimal::from(2));
        fx.entry(part, Some(LotId::new()), 5, Decimal::from(4));

        let level = fx.stockroom.stock_level(&part).unwrap();
        assert_eq!(level.on_hand, Decimal::from(15));
        assert_eq!(level.average_cost.round_dp(3), Decimal::new(2667, 3));
    }

    #[test]
    fn exit_depletes_lot_and_leaves_average_untouched() {
        let mut fx = Fixture::new();
        let part = fx.register(StockItemKind::Part, "Brake pad");
        let lot_a = LotId::new();
        let lot_b = LotId::new();
        fx.entry(part, Some(lot_a), 10, Decimal::from(2));
        fx.entry(part, Some(lot_b), 5, Decimal::from(4));
        let avg_before = fx.stockroom.stock_level(&part).unwrap().average_cost;

        fx.dispatch(StockroomCommand::ApplyAdjustment(ApplyAdjustment {
            tenant_id: fx.tenant_id,
            stockroom_id: fx.stockroom_id,
            adjustment_id: test_adjustment_id(),
            adjustment_type: AdjustmentType::Exit,
            lines: vec![StockAdjustmentLine {
                line_id: LineId::new(),
                item_id: part,
                lot_id: Some(lot_b),
                quantity: Decimal::from(-5),
                unit_cost: Decimal::ZERO,
            }],
            occurred_at: test_time(),
        }));

        let level = fx.stockroom.stock_level(&part).unwrap();
        assert_eq!(level.on_hand, Decimal::from(10));
        assert_eq!(level.average_cost, avg_before);
        assert_eq!(
            fx.stockroom.lots().get(&lot_b).unwrap().remaining,
            Decimal::ZERO
        );
    }

    #[test]
    fn over_depleting_a_lot_rejects_the_whole_adjustment() {
        let mut fx = Fixture::new();
        let part = fx.register(StockItemKind::Part, "Filter");
        let lot = LotId::new();
        fx.entry(part, Some(lot), 6, Decimal::from(3));
        let before = fx.stockroom.clone();

        // Two lines that individually fit but cumulatively over-deplete.
        let err = fx
            .stockroom
            .handle(&StockroomCommand::ApplyAdjustment(ApplyAdjustment {
                tenant_id: fx.tenant_id,
                stockroom_id: fx.stockroom_id,
                adjustment_id: test_adjustment_id(),
                adjustment_type: AdjustmentType::Exit,
                lines: vec![
                    StockAdjustmentLine {
                        line_id: LineId::new(),
                        item_id: part,
                        lot_id: Some(lot),
                        quantity: Decimal::from(-4),
                        unit_cost: Decimal::ZERO,
                    },
                    StockAdjustmentLine {
                        line_id: LineId::new(),
                        item_id: part,
                        lot_id: Some(lot),
                        quantity: Decimal::from(-4),
                        unit_cost: Decimal::ZERO,
                    },
                ],
                occurred_at: test_time(),
            }))
            .unwrap_err();

        assert!(matches!(err, DomainError::InsufficientLotQuantity { .. }));
        // Rejected apply leaves the ledger exactly as it was.
        assert_eq!(fx.stockroom, before);
    }

    #[test]
    fn exit_without_lot_and_unknown_item_are_rejected() {
        let mut fx = Fixture::new();
        let part = fx.register(StockItemKind::Part, "Filter");
        fx.entry(part, Some(LotId::new()), 6, Decimal::from(3));

        let exit_line = |item_id, lot_id| StockAdjustmentLine {
            line_id: LineId::new(),
            item_id,
            lot_id,
            quantity: Decimal::from(-1),
            unit_cost: Decimal::ZERO,
        };

        let err = fx
            .stockroom
            .handle(&StockroomCommand::ApplyAdjustment(ApplyAdjustment {
                tenant_id: fx.tenant_id,
                stockroom_id: fx.stockroom_id,
                adjustment_id: test_adjustment_id(),
                adjustment_type: AdjustmentType::Exit,
                lines: vec![exit_line(part, None)],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = fx
            .stockroom
            .handle(&StockroomCommand::ApplyAdjustment(ApplyAdjustment {
                tenant_id: fx.tenant_id,
                stockroom_id: fx.stockroom_id,
                adjustment_id: test_adjustment_id(),
                adjustment_type: AdjustmentType::Exit,
                lines: vec![exit_line(test_item_id(), Some(LotId::new()))],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::StaleReference(_)));
    }

    #[test]
    fn revaluation_rewrites_costs_without_touching_quantity() {
        let mut fx = Fixture::new();
        let part = fx.register(StockItemKind::Part, "Alternator");
        let lot_a = LotId::new();
        let lot_b = LotId::new();
        fx.entry(part, Some(lot_a), 10, Decimal::from(2));
        fx.entry(part, Some(lot_b), 10, Decimal::from(4));

        fx.dispatch(StockroomCommand::ApplyAdjustment(ApplyAdjustment {
            tenant_id: fx.tenant_id,
            stockroom_id: fx.stockroom_id,
            adjustment_id: test_adjustment_id(),
            adjustment_type: AdjustmentType::Revaluation,
            lines: vec![StockAdjustmentLine {
                line_id: LineId::new(),
                item_id: part,
                lot_id: Some(lot_a),
                quantity: Decimal::ZERO,
                unit_cost: Decimal::from(6),
            }],
            occurred_at: test_time(),
        }));

        let level = fx.stockroom.stock_level(&part).unwrap();
        assert_eq!(level.on_hand, Decimal::from(20));
        // (10*6 + 10*4) / 20
        assert_eq!(level.average_cost, Decimal::from(5));
        let lot = fx.stockroom.lots().get(&lot_a).unwrap();
        assert_eq!(lot.unit_cost, Decimal::from(6));
        assert_eq!(lot.remaining, Decimal::from(10));
    }

    #[test]
    fn count_overwrites_supply_quantity_and_cost() {
        let mut fx = Fixture::new();
        let supply = fx.register(StockItemKind::Supply, "Diesel");
        fx.entry(supply, None, 20, Decimal::from(2));

        let count_id = test_count_id();
        let apply = ApplyCount {
            tenant_id: fx.tenant_id,
            stockroom_id: fx.stockroom_id,
            count_id,
            lines: vec![CountLine {
                line_id: LineId::new(),
                supply_id: supply,
                counted_qty: Decimal::from(17),
                unit_cost: Decimal::new(150, 2),
                system_qty: Decimal::from(20),
            }],
            occurred_at: test_time(),
        };
        fx.dispatch(StockroomCommand::ApplyCount(apply.clone()));

        let level = fx.stockroom.stock_level(&supply).unwrap();
        assert_eq!(level.on_hand, Decimal::from(17));
        assert_eq!(level.average_cost, Decimal::new(150, 2));
        assert!(fx.stockroom.is_count_applied(&count_id));

        // Applying the same count again must fail, not double-adjust.
        let err = fx
            .stockroom
            .handle(&StockroomCommand::ApplyCount(apply))
            .unwrap_err();
        assert!(matches!(err, DomainError::AlreadyApplied(_)));
    }

    #[test]
    fn counting_a_part_is_rejected() {
        let mut fx = Fixture::new();
        let part = fx.register(StockItemKind::Part, "Brake pad");

        let err = fx
            .stockroom
            .handle(&StockroomCommand::ApplyCount(ApplyCount {
                tenant_id: fx.tenant_id,
                stockroom_id: fx.stockroom_id,
                count_id: test_count_id(),
                lines: vec![CountLine {
                    line_id: LineId::new(),
                    supply_id: part,
                    counted_qty: Decimal::from(1),
                    unit_cost: Decimal::ONE,
                    system_qty: Decimal::ZERO,
                }],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn reapplying_an_adjustment_id_is_rejected() {
        let mut fx = Fixture::new();
        let supply = fx.register(StockItemKind::Supply, "Coolant");

        let adjustment_id = test_adjustment_id();
        let apply = ApplyAdjustment {
            tenant_id: fx.tenant_id,
            stockroom_id: fx.stockroom_id,
            adjustment_id,
            adjustment_type: AdjustmentType::Entry,
            lines: vec![StockAdjustmentLine {
                line_id: LineId::new(),
                item_id: supply,
                lot_id: None,
                quantity: Decimal::from(5),
                unit_cost: Decimal::ONE,
            }],
            occurred_at: test_time(),
        };
        fx.dispatch(StockroomCommand::ApplyAdjustment(apply.clone()));
        assert!(fx.stockroom.is_adjustment_applied(&adjustment_id));

        let err = fx
            .stockroom
            .handle(&StockroomCommand::ApplyAdjustment(apply))
            .unwrap_err();
        assert!(matches!(err, DomainError::AlreadyApplied(_)));
    }

    #[test]
    fn rehydration_from_events_matches_live_state() {
        let mut fx = Fixture::new();
        let part = fx.register(StockItemKind::Part, "Brake pad");
        let lot = LotId::new();
        fx.entry(part, Some(lot), 10, Decimal::from(2));

        let mut all_events = Vec::new();
        let mut replayed = Stockroom::empty(fx.stockroom_id);

        // Re-drive the same commands against a fresh instance, applying as we go.
        let mut live = Stockroom::empty(fx.stockroom_id);
        for command in [
            StockroomCommand::EstablishStockroom(EstablishStockroom {
                tenant_id: fx.tenant_id,
                stockroom_id: fx.stockroom_id,
                name: "Main depot".to_string(),
                occurred_at: test_time(),
            }),
            StockroomCommand::RegisterItem(RegisterItem {
                tenant_id: fx.tenant_id,
                stockroom_id: fx.stockroom_id,
                item_id: part,
                kind: StockItemKind::Part,
                details: details("Brake pad"),
                occurred_at: test_time(),
            }),
            StockroomCommand::ApplyAdjustment(ApplyAdjustment {
                tenant_id: fx.tenant_id,
                stockroom_id: fx.stockroom_id,
                adjustment_id: test_adjustment_id(),
                adjustment_type: AdjustmentType::Entry,
                lines: vec![StockAdjustmentLine {
                    line_id: LineId::new(),
                    item_id: part,
                    lot_id: Some(lot),
                    quantity: Decimal::from(10),
                    unit_cost: Decimal::from(2),
                }],
                occurred_at: test_time(),
            }),
            StockroomCommand::ApplyAdjustment(ApplyAdjustment {
                tenant_id: fx.tenant_id,
                stockroom_id: fx.stockroom_id,
                adjustment_id: test_adjustment_id(),
                adjustment_type: AdjustmentType::Exit,
                lines: vec![StockAdjustmentLine {
                    line_id: LineId::new(),
                    item_id: part,
                    lot_id: Some(lot),
                    quantity: Decimal::from(-4),
                    unit_cost: Decimal::ZERO,
                }],
                occurred_at: test_time(),
            }),
        ] {
            let events = live.handle(&command).unwrap();
            for e in &events {
                live.apply(e);
            }
            all_events.extend(events);
        }

        for e in &all_events {
            replayed.apply(e);
        }
        assert_eq!(replayed, live);
        assert_eq!(
            replayed.stock_level(&part).unwrap().on_hand,
            Decimal::from(6)
        );
        assert_eq!(
            replayed.lots().get(&lot).unwrap().remaining,
            Decimal::from(6)
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: for any sequence of entries, on-hand is the sum of the
        /// received quantities and the running weighted average matches total
        /// value over total quantity.
        #[test]
        fn weighted_average_invariant_over_entry_sequences(
            receipts in prop::collection::vec((1i64..1_000i64, 0i64..100_000i64), 1..10)
        ) {
            let mut fx = Fixture::new();
            let supply = fx.register(StockItemKind::Supply, "Diesel");

            let mut total_qty = Decimal::ZERO;
            let mut total_value = Decimal::ZERO;

            for (qty, cost_cents) in receipts {
                let cost = Decimal::new(cost_cents, 2);
                fx.entry(supply, None, qty, cost);
                total_qty += Decimal::from(qty);
                total_value += Decimal::from(qty) * cost;
            }

            let level = fx.stockroom.stock_level(&supply).unwrap();
            prop_assert_eq!(level.on_hand, total_qty);

            let direct = total_value / total_qty;
            let drift = (level.average_cost - direct).abs();
            prop_assert!(drift < Decimal::new(1, 9), "drift {} too large", drift);
        }
    }
}
