//! Application services: the boundary the edit surface talks to.
//!
//! Drafts come in as plain structured data, get validated against the shared
//! rule set, and flow through the command dispatcher. Outcomes go back as
//! typed acknowledgments (recomputed stock/cost per line) or typed errors,
//! verbatim, for user-facing messaging; nothing here auto-retries.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

use fleetdepot_catalog::{StockItemDetails, StockItemId, StockItemKind, StockItemRegistry};
use fleetdepot_core::{DomainError, TenantId};
use fleetdepot_events::{EventBus, EventEnvelope};
use fleetdepot_inventory::adjustment::{
    Adjustment, AdjustmentCommand, AdjustmentDraft, AdjustmentEvent, AdjustmentId,
    AdjustmentStatus, AdjustmentType, DraftAdjustment, LineId, LineTarget, MarkAdjustmentApplied,
    ReviseAdjustment,
};
use fleetdepot_inventory::count::{
    CancelCount, CountCommand, CountDraft, CountEvent, CountHeader, CountLine, CountSession,
    CountSessionId, CountStatus, MarkCountApplied, OpenCount, ReviseCount,
};
use fleetdepot_inventory::lot::LotId;
use fleetdepot_inventory::rules::{self, RuleViolation};
use fleetdepot_inventory::stockroom::{
    ApplyAdjustment, ApplyCount, EstablishStockroom, LineEffect, RegisterItem,
    StockAdjustmentLine, Stockroom, StockroomCommand, StockroomEvent, StockroomId,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::stock_levels::STOCKROOM_AGGREGATE_TYPE;

const ADJUSTMENT_AGGREGATE_TYPE: &str = "inventory.adjustment";
const COUNT_AGGREGATE_TYPE: &str = "inventory.count";

/// Boundary error: everything the edit surface can be told.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A draft failed the validation rule set (tagged rule + offending line).
    #[error("validation failed: {0}")]
    Validation(RuleViolation),

    /// Deterministic domain failure, surfaced verbatim.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A concurrent apply won the race; reloading and retrying is the
    /// caller's decision.
    #[error("concurrency conflict: {0}")]
    Conflict(String),

    /// Store, bus or serialization failure below the domain.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl From<DispatchError> for ServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Concurrency(msg) => ServiceError::Conflict(msg),
            DispatchError::Domain(err) => ServiceError::Domain(err),
            DispatchError::TenantIsolation(msg) => {
                ServiceError::Infrastructure(format!("tenant isolation: {msg}"))
            }
            DispatchError::Deserialize(msg) => {
                ServiceError::Infrastructure(format!("deserialize: {msg}"))
            }
            DispatchError::Store(err) => ServiceError::Infrastructure(err.to_string()),
            DispatchError::Publish(msg) => ServiceError::Infrastructure(format!("publish: {msg}")),
        }
    }
}

/// Outcome of re-saving an edited draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The revision was persisted; `changes` lists what the operator
    /// confirmed, one "old -> new" line each.
    Saved { changes: Vec<String> },
    /// The draft equals the stored snapshot field for field; nothing was
    /// written.
    NothingToSave,
}

/// Per-line acknowledgment after an apply: the recomputed figures for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedLine {
    pub line_id: LineId,
    pub item_id: StockItemId,
    pub quantity_delta: Decimal,
    pub new_on_hand: Decimal,
    pub new_average_cost: Decimal,
    pub lot_id: Option<LotId>,
    pub lot_remaining: Option<Decimal>,
}

impl From<&LineEffect> for AppliedLine {
    fn from(effect: &LineEffect) -> Self {
        Self {
            line_id: effect.line_id,
            item_id: effect.item_id,
            quantity_delta: effect.quantity_delta,
            new_on_hand: effect.new_on_hand,
            new_average_cost: effect.new_average_cost,
            lot_id: effect.lot_id,
            lot_remaining: effect.lot_remaining,
        }
    }
}

/// One requested count line; system quantity and the default cost are
/// captured from the registry when the line is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountLineRequest {
    pub supply_id: StockItemId,
    pub counted_qty: Decimal,
    /// Overrides the default (the item's current average cost).
    pub unit_cost: Option<Decimal>,
}

/// The inventory application service.
///
/// Stateless besides its collaborators: the dispatcher (event store + bus)
/// and the read-only stock registry.
pub struct InventoryService<S, B, R> {
    dispatcher: CommandDispatcher<S, B>,
    registry: R,
}

impl<S, B, R> InventoryService<S, B, R>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    R: StockItemRegistry,
{
    pub fn new(store: S, bus: B, registry: R) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            registry,
        }
    }

    pub fn establish_stockroom(
        &self,
        tenant_id: TenantId,
        stockroom_id: StockroomId,
        name: impl Into<String>,
    ) -> Result<(), ServiceError> {
        self.dispatcher.dispatch(
            tenant_id,
            stockroom_id.0,
            STOCKROOM_AGGREGATE_TYPE,
            StockroomCommand::EstablishStockroom(EstablishStockroom {
                tenant_id,
                stockroom_id,
                name: name.into(),
                occurred_at: Utc::now(),
            }),
            |_, id| Stockroom::empty(StockroomId::new(id)),
        )?;
        Ok(())
    }

    pub fn register_item(
        &self,
        tenant_id: TenantId,
        stockroom_id: StockroomId,
        item_id: StockItemId,
        kind: StockItemKind,
        details: StockItemDetails,
    ) -> Result<(), ServiceError> {
        self.dispatcher.dispatch(
            tenant_id,
            stockroom_id.0,
            STOCKROOM_AGGREGATE_TYPE,
            StockroomCommand::RegisterItem(RegisterItem {
                tenant_id,
                stockroom_id,
                item_id,
                kind,
                details,
                occurred_at: Utc::now(),
            }),
            |_, id| Stockroom::empty(StockroomId::new(id)),
        )?;
        Ok(())
    }

    /// Persist a new pending adjustment.
    pub fn draft_adjustment(
        &self,
        tenant_id: TenantId,
        adjustment_id: AdjustmentId,
        draft: AdjustmentDraft,
    ) -> Result<(), ServiceError> {
        rules::validate_adjustment(&draft).map_err(ServiceError::Validation)?;

        self.dispatcher.dispatch(
            tenant_id,
            adjustment_id.0,
            ADJUSTMENT_AGGREGATE_TYPE,
            AdjustmentCommand::DraftAdjustment(DraftAdjustment {
                tenant_id,
                adjustment_id,
                draft,
                occurred_at: Utc::now(),
            }),
            |_, id| Adjustment::empty(AdjustmentId::new(id)),
        )?;
        Ok(())
    }

    /// Re-save an edited pending adjustment.
    ///
    /// The change-detection guard decides whether anything is written; an
    /// unchanged draft comes back as [`SaveOutcome::NothingToSave`].
    pub fn revise_adjustment(
        &self,
        tenant_id: TenantId,
        adjustment_id: AdjustmentId,
        draft: AdjustmentDraft,
    ) -> Result<SaveOutcome, ServiceError> {
        rules::validate_adjustment(&draft).map_err(ServiceError::Validation)?;

        let committed = self.dispatcher.dispatch(
            tenant_id,
            adjustment_id.0,
            ADJUSTMENT_AGGREGATE_TYPE,
            AdjustmentCommand::ReviseAdjustment(ReviseAdjustment {
                tenant_id,
                adjustment_id,
                draft,
                occurred_at: Utc::now(),
            }),
            |_, id| Adjustment::empty(AdjustmentId::new(id)),
        )?;

        if committed.is_empty() {
            return Ok(SaveOutcome::NothingToSave);
        }

        let mut changes = Vec::new();
        for stored in &committed {
            let ev: AdjustmentEvent = serde_json::from_value(stored.payload.clone())
                .map_err(|e| ServiceError::Infrastructure(format!("deserialize: {e}")))?;
            if let AdjustmentEvent::AdjustmentRevised(e) = ev {
                changes.extend(e.changes);
            }
        }
        Ok(SaveOutcome::Saved { changes })
    }

    /// Commit a pending adjustment into the stockroom ledger.
    ///
    /// All-or-nothing across its lines; entry lines on parts get their fresh
    /// lot ids here. Returns the recomputed per-line figures for display.
    pub fn apply_adjustment(
        &self,
        tenant_id: TenantId,
        stockroom_id: StockroomId,
        adjustment_id: AdjustmentId,
    ) -> Result<Vec<AppliedLine>, ServiceError> {
        let adjustment: Adjustment = self.dispatcher.load(tenant_id, adjustment_id.0, |_, id| {
            Adjustment::empty(AdjustmentId::new(id))
        })?;

        let draft = adjustment
            .current_draft()
            .ok_or(ServiceError::Domain(DomainError::NotFound))?;
        if adjustment.status() == AdjustmentStatus::Applied {
            return Err(ServiceError::Domain(DomainError::already_applied(format!(
                "adjustment {adjustment_id} is already applied"
            ))));
        }

        let adjustment_type = draft.header.adjustment_type;
        let lines = draft
            .lines
            .iter()
            .map(|line| StockAdjustmentLine {
                line_id: line.line_id,
                item_id: line.target.item_id(),
                lot_id: resolve_lot(adjustment_type, &line.target),
                quantity: line.quantity,
                unit_cost: line.unit_cost,
            })
            .collect();

        let committed = self.dispatcher.dispatch(
            tenant_id,
            stockroom_id.0,
            STOCKROOM_AGGREGATE_TYPE,
            StockroomCommand::ApplyAdjustment(ApplyAdjustment {
                tenant_id,
                stockroom_id,
                adjustment_id,
                adjustment_type,
                lines,
                occurred_at: Utc::now(),
            }),
            |_, id| Stockroom::empty(StockroomId::new(id)),
        )?;

        // Flip the adjustment record to applied. The stockroom's per-id
        // guard keeps a crash between the two steps from double-applying.
        self.dispatcher.dispatch(
            tenant_id,
            adjustment_id.0,
            ADJUSTMENT_AGGREGATE_TYPE,
            AdjustmentCommand::MarkAdjustmentApplied(MarkAdjustmentApplied {
                tenant_id,
                adjustment_id,
                occurred_at: Utc::now(),
            }),
            |_, id| Adjustment::empty(AdjustmentId::new(id)),
        )?;

        info!(%adjustment_id, %stockroom_id, "adjustment applied");
        collect_applied_lines(&committed)
    }

    /// Record a count line, capturing the current system quantity and the
    /// default cost from the registry.
    pub fn capture_count_line(
        &self,
        tenant_id: TenantId,
        request: &CountLineRequest,
    ) -> Result<CountLine, ServiceError> {
        let record = self
            .registry
            .get(tenant_id, &request.supply_id)
            .ok_or_else(|| {
                ServiceError::Domain(DomainError::stale_reference(format!(
                    "supply {} is not in the catalog",
                    request.supply_id
                )))
            })?;
        if record.kind != StockItemKind::Supply {
            return Err(ServiceError::Domain(DomainError::validation(format!(
                "item {} is lot-tracked; counts cover supplies",
                request.supply_id
            ))));
        }

        Ok(CountLine {
            line_id: LineId::new(),
            supply_id: request.supply_id,
            counted_qty: request.counted_qty,
            unit_cost: request.unit_cost.unwrap_or(record.average_cost),
            system_qty: record.on_hand,
        })
    }

    /// Open a count session over the requested supplies.
    pub fn open_count(
        &self,
        tenant_id: TenantId,
        count_id: CountSessionId,
        header: CountHeader,
        requests: Vec<CountLineRequest>,
    ) -> Result<(), ServiceError> {
        let mut lines = Vec::with_capacity(requests.len());
        for request in &requests {
            lines.push(self.capture_count_line(tenant_id, request)?);
        }
        let draft = CountDraft { header, lines };
        rules::validate_count(&draft).map_err(ServiceError::Validation)?;

        self.dispatcher.dispatch(
            tenant_id,
            count_id.0,
            COUNT_AGGREGATE_TYPE,
            CountCommand::OpenCount(OpenCount {
                tenant_id,
                count_id,
                draft,
                occurred_at: Utc::now(),
            }),
            |_, id| CountSession::empty(CountSessionId::new(id)),
        )?;
        Ok(())
    }

    /// Re-save an edited count session (diff-guarded like adjustments).
    pub fn revise_count(
        &self,
        tenant_id: TenantId,
        count_id: CountSessionId,
        draft: CountDraft,
    ) -> Result<SaveOutcome, ServiceError> {
        rules::validate_count(&draft).map_err(ServiceError::Validation)?;

        let committed = self.dispatcher.dispatch(
            tenant_id,
            count_id.0,
            COUNT_AGGREGATE_TYPE,
            CountCommand::ReviseCount(ReviseCount {
                tenant_id,
                count_id,
                draft,
                occurred_at: Utc::now(),
            }),
            |_, id| CountSession::empty(CountSessionId::new(id)),
        )?;

        if committed.is_empty() {
            return Ok(SaveOutcome::NothingToSave);
        }

        let mut changes = Vec::new();
        for stored in &committed {
            let ev: CountEvent = serde_json::from_value(stored.payload.clone())
                .map_err(|e| ServiceError::Infrastructure(format!("deserialize: {e}")))?;
            if let CountEvent::CountRevised(e) = ev {
                changes.extend(e.changes);
            }
        }
        Ok(SaveOutcome::Saved { changes })
    }

    pub fn cancel_count(
        &self,
        tenant_id: TenantId,
        count_id: CountSessionId,
    ) -> Result<(), ServiceError> {
        self.dispatcher.dispatch(
            tenant_id,
            count_id.0,
            COUNT_AGGREGATE_TYPE,
            CountCommand::CancelCount(CancelCount {
                tenant_id,
                count_id,
                occurred_at: Utc::now(),
            }),
            |_, id| CountSession::empty(CountSessionId::new(id)),
        )?;
        Ok(())
    }

    /// Apply a count session: full overwrite of every counted supply, then
    /// the session turns terminal. A second apply fails.
    pub fn apply_count(
        &self,
        tenant_id: TenantId,
        stockroom_id: StockroomId,
        count_id: CountSessionId,
    ) -> Result<Vec<AppliedLine>, ServiceError> {
        let session: CountSession = self.dispatcher.load(tenant_id, count_id.0, |_, id| {
            CountSession::empty(CountSessionId::new(id))
        })?;

        if session.header().is_none() {
            return Err(ServiceError::Domain(DomainError::NotFound));
        }
        match session.status() {
            CountStatus::Completed => {
                return Err(ServiceError::Domain(DomainError::already_applied(format!(
                    "count {count_id} is already applied"
                ))));
            }
            CountStatus::Cancelled => {
                return Err(ServiceError::Domain(DomainError::invariant(
                    "cancelled counts cannot be applied",
                )));
            }
            CountStatus::Pending | CountStatus::InProgress => {}
        }

        // Stockroom first: its per-id guard makes the mutation idempotent if
        // the session transition below never runs.
        let committed = self.dispatcher.dispatch(
            tenant_id,
            stockroom_id.0,
            STOCKROOM_AGGREGATE_TYPE,
            StockroomCommand::ApplyCount(ApplyCount {
                tenant_id,
                stockroom_id,
                count_id,
                lines: session.lines().to_vec(),
                occurred_at: Utc::now(),
            }),
            |_, id| Stockroom::empty(StockroomId::new(id)),
        )?;

        self.dispatcher.dispatch(
            tenant_id,
            count_id.0,
            COUNT_AGGREGATE_TYPE,
            CountCommand::MarkCountApplied(MarkCountApplied {
                tenant_id,
                count_id,
                occurred_at: Utc::now(),
            }),
            |_, id| CountSession::empty(CountSessionId::new(id)),
        )?;

        info!(%count_id, %stockroom_id, "count applied");
        collect_applied_lines(&committed)
    }
}

fn resolve_lot(adjustment_type: AdjustmentType, target: &LineTarget) -> Option<LotId> {
    match target {
        // Entries create a batch; the id is chosen here because aggregate
        // decision logic cannot generate ids.
        LineTarget::Part { .. } if adjustment_type == AdjustmentType::Entry => Some(LotId::new()),
        LineTarget::Part { lot, .. } => *lot,
        LineTarget::Supply { .. } => None,
    }
}

fn collect_applied_lines(
    committed: &[crate::event_store::StoredEvent],
) -> Result<Vec<AppliedLine>, ServiceError> {
    let mut lines = Vec::new();
    for stored in committed {
        let ev: StockroomEvent = serde_json::from_value(stored.payload.clone())
            .map_err(|e| ServiceError::Infrastructure(format!("deserialize: {e}")))?;
        match ev {
            StockroomEvent::AdjustmentApplied(e) => {
                lines.extend(e.effects.iter().map(AppliedLine::from));
            }
            StockroomEvent::CountReconciled(e) => {
                lines.extend(e.effects.iter().map(AppliedLine::from));
            }
            _ => {}
        }
    }
    Ok(lines)
}
