//! `fleetdepot-inventory` — inventory reconciliation and lot-costing core.
//!
//! Three state machines and two pure rule surfaces:
//!
//! - [`stockroom`]: the ledger aggregate owning stock quantities, weighted
//!   average costs and the lot ledger; the only place stock is mutated.
//! - [`adjustment`]: typed manual adjustment drafts (entry / exit /
//!   revaluation) and their edit lifecycle.
//! - [`count`]: physical count sessions reconciling counted vs. system stock.
//! - [`rules`]: the shared validation rule set (tagged failures).
//! - [`diff`]: the change-detection guard for edit flows.

pub mod adjustment;
pub mod count;
pub mod diff;
pub mod lot;
pub mod rules;
pub mod stockroom;

pub use adjustment::{
    Adjustment, AdjustmentCommand, AdjustmentDraft, AdjustmentEvent, AdjustmentHeader,
    AdjustmentId, AdjustmentLine, AdjustmentStatus, AdjustmentType, DraftAdjustment, LineId,
    LineTarget, MarkAdjustmentApplied, ReviseAdjustment,
};
pub use count::{
    CancelCount, CountCommand, CountDraft, CountEvent, CountHeader, CountLine, CountSession,
    CountSessionId, CountStatus, MarkCountApplied, OpenCount, ReviseCount,
};
pub use diff::{ChangeSet, FieldChange, diff_adjustment, diff_count};
pub use lot::{Lot, LotId, LotLedger};
pub use rules::{Rule, RuleViolation};
pub use stockroom::{
    ApplyAdjustment, ApplyCount, EstablishStockroom, LineEffect, RegisterItem, StockAdjustmentLine,
    StockLevel, Stockroom, StockroomCommand, StockroomEvent, StockroomId,
};
