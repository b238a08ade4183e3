//! Manual stock adjustments: typed drafts and their edit lifecycle.
//!
//! An adjustment is drafted from the edit surface, stays pending (editable)
//! until the stockroom applies it, and is terminal afterwards. Re-saving an
//! unchanged draft emits no events, so nothing is written.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fleetdepot_catalog::StockItemId;
use fleetdepot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, EmployeeId, TenantId};
use fleetdepot_events::Event;

use crate::diff;
use crate::lot::LotId;
use crate::rules;

/// Adjustment identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdjustmentId(pub AggregateId);

impl AdjustmentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AdjustmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Stable per-line identity; the change-detection guard matches lines on it,
/// never on position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(pub Uuid);

impl LineId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LineId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for LineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What a manual adjustment does to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentType {
    /// Stock in: positive quantity, creates a new lot for parts.
    Entry,
    /// Stock out: negative quantity, depletes a named lot for parts.
    Exit,
    /// Cost rewrite: quantity exactly zero.
    Revaluation,
}

impl core::fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            AdjustmentType::Entry => "entry",
            AdjustmentType::Exit => "exit",
            AdjustmentType::Revaluation => "revaluation",
        };
        f.write_str(s)
    }
}

/// Line target: a lot-tracked part (optionally bound to a batch) or a bulk
/// supply. Exactly one, structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LineTarget {
    Part {
        part_id: StockItemId,
        lot: Option<LotId>,
    },
    Supply {
        supply_id: StockItemId,
    },
}

impl LineTarget {
    pub fn item_id(&self) -> StockItemId {
        match self {
            LineTarget::Part { part_id, .. } => *part_id,
            LineTarget::Supply { supply_id } => *supply_id,
        }
    }

    pub fn lot(&self) -> Option<LotId> {
        match self {
            LineTarget::Part { lot, .. } => *lot,
            LineTarget::Supply { .. } => None,
        }
    }

    /// Short human-readable reference used by change descriptions.
    pub fn describe(&self) -> String {
        match self {
            LineTarget::Part {
                part_id,
                lot: Some(lot),
            } => format!("part {part_id} (lot {lot})"),
            LineTarget::Part { part_id, lot: None } => format!("part {part_id}"),
            LineTarget::Supply { supply_id } => format!("supply {supply_id}"),
        }
    }
}

/// One draft line as captured from the edit surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentLine {
    pub line_id: LineId,
    pub target: LineTarget,
    /// Signed quantity delta: positive for entries, negative for exits,
    /// zero for revaluations.
    pub quantity: Decimal,
    /// Unit cost for entries and revaluations; ignored on exits.
    pub unit_cost: Decimal,
}

/// Adjustment header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentHeader {
    pub employee_id: EmployeeId,
    pub adjustment_type: AdjustmentType,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// The plain structured shape the edit surface submits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentDraft {
    pub header: AdjustmentHeader,
    pub lines: Vec<AdjustmentLine>,
}

/// Adjustment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentStatus {
    /// Persisted, still editable; the ledger has not been touched.
    Pending,
    /// Committed into the stockroom; terminal.
    Applied,
}

/// Aggregate root: Adjustment (the edit lifecycle, not the ledger mutation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    id: AdjustmentId,
    tenant_id: Option<TenantId>,
    header: Option<AdjustmentHeader>,
    lines: Vec<AdjustmentLine>,
    status: AdjustmentStatus,
    version: u64,
    created: bool,
}

impl Adjustment {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: AdjustmentId) -> Self {
        Self {
            id,
            tenant_id: None,
            header: None,
            lines: Vec::new(),
            status: AdjustmentStatus::Pending,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> AdjustmentId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn header(&self) -> Option<&AdjustmentHeader> {
        self.header.as_ref()
    }

    pub fn lines(&self) -> &[AdjustmentLine] {
        &self.lines
    }

    pub fn status(&self) -> AdjustmentStatus {
        self.status
    }

    /// The currently persisted draft (the diff baseline for edits).
    pub fn current_draft(&self) -> Option<AdjustmentDraft> {
        self.header.as_ref().map(|header| AdjustmentDraft {
            header: header.clone(),
            lines: self.lines.clone(),
        })
    }
}

impl AggregateRoot for Adjustment {
    type Id = AdjustmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: DraftAdjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftAdjustment {
    pub tenant_id: TenantId,
    pub adjustment_id: AdjustmentId,
    pub draft: AdjustmentDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviseAdjustment (only while pending).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseAdjustment {
    pub tenant_id: TenantId,
    pub adjustment_id: AdjustmentId,
    pub draft: AdjustmentDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkAdjustmentApplied (issued after the stockroom committed it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkAdjustmentApplied {
    pub tenant_id: TenantId,
    pub adjustment_id: AdjustmentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentCommand {
    DraftAdjustment(DraftAdjustment),
    ReviseAdjustment(ReviseAdjustment),
    MarkAdjustmentApplied(MarkAdjustmentApplied),
}

/// Event: AdjustmentDrafted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentDrafted {
    pub tenant_id: TenantId,
    pub adjustment_id: AdjustmentId,
    pub draft: AdjustmentDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AdjustmentRevised.
///
/// Carries the rendered change descriptions so the audit trail shows what the
/// operator confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentRevised {
    pub tenant_id: TenantId,
    pub adjustment_id: AdjustmentId,
    pub draft: AdjustmentDraft,
    pub changes: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AdjustmentMarkedApplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentMarkedApplied {
    pub tenant_id: TenantId,
    pub adjustment_id: AdjustmentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentEvent {
    AdjustmentDrafted(AdjustmentDrafted),
    AdjustmentRevised(AdjustmentRevised),
    AdjustmentMarkedApplied(AdjustmentMarkedApplied),
}

impl Event for AdjustmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AdjustmentEvent::AdjustmentDrafted(_) => "inventory.adjustment.drafted",
            AdjustmentEvent::AdjustmentRevised(_) => "inventory.adjustment.revised",
            AdjustmentEvent::AdjustmentMarkedApplied(_) => "inventory.adjustment.marked_applied",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AdjustmentEvent::AdjustmentDrafted(e) => e.occurred_at,
            AdjustmentEvent::AdjustmentRevised(e) => e.occurred_at,
            AdjustmentEvent::AdjustmentMarkedApplied(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Adjustment {
    type Command = AdjustmentCommand;
    type Event = AdjustmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AdjustmentEvent::AdjustmentDrafted(e) => {
                self.id = e.adjustment_id;
                self.tenant_id = Some(e.tenant_id);
                self.header = Some(e.draft.header.clone());
                self.lines = e.draft.lines.clone();
                self.status = AdjustmentStatus::Pending;
                self.created = true;
            }
            AdjustmentEvent::AdjustmentRevised(e) => {
                self.header = Some(e.draft.header.clone());
                self.lines = e.draft.lines.clone();
            }
            AdjustmentEvent::AdjustmentMarkedApplied(_) => {
                self.status = AdjustmentStatus::Applied;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AdjustmentCommand::DraftAdjustment(cmd) => self.handle_draft(cmd),
            AdjustmentCommand::ReviseAdjustment(cmd) => self.handle_revise(cmd),
            AdjustmentCommand::MarkAdjustmentApplied(cmd) => self.handle_mark_applied(cmd),
        }
    }
}

impl Adjustment {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_adjustment_id(&self, adjustment_id: AdjustmentId) -> Result<(), DomainError> {
        if self.id != adjustment_id {
            return Err(DomainError::invariant("adjustment_id mismatch"));
        }
        Ok(())
    }

    fn handle_draft(&self, cmd: &DraftAdjustment) -> Result<Vec<AdjustmentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("adjustment already exists"));
        }
        rules::validate_adjustment(&cmd.draft)?;

        Ok(vec![AdjustmentEvent::AdjustmentDrafted(AdjustmentDrafted {
            tenant_id: cmd.tenant_id,
            adjustment_id: cmd.adjustment_id,
            draft: cmd.draft.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseAdjustment) -> Result<Vec<AdjustmentEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_adjustment_id(cmd.adjustment_id)?;

        if self.status == AdjustmentStatus::Applied {
            return Err(DomainError::already_applied(
                "applied adjustments cannot be edited",
            ));
        }

        rules::validate_adjustment(&cmd.draft)?;

        let original = self
            .current_draft()
            .ok_or_else(|| DomainError::invariant("created adjustment without a draft"))?;
        rules::validate_adjustment_revision(&original, &cmd.draft)?;

        // No difference against the persisted draft means nothing to save:
        // zero events, so the dispatcher performs no write.
        let changes = diff::diff_adjustment(&original, &cmd.draft);
        if changes.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![AdjustmentEvent::AdjustmentRevised(AdjustmentRevised {
            tenant_id: cmd.tenant_id,
            adjustment_id: cmd.adjustment_id,
            draft: cmd.draft.clone(),
            changes: changes.descriptions(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_applied(
        &self,
        cmd: &MarkAdjustmentApplied,
    ) -> Result<Vec<AdjustmentEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_adjustment_id(cmd.adjustment_id)?;

        if self.status == AdjustmentStatus::Applied {
            return Err(DomainError::already_applied(format!(
                "adjustment {} is already applied",
                self.id
            )));
        }

        Ok(vec![AdjustmentEvent::AdjustmentMarkedApplied(
            AdjustmentMarkedApplied {
                tenant_id: cmd.tenant_id,
                adjustment_id: cmd.adjustment_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetdepot_core::AggregateId;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_adjustment_id() -> AdjustmentId {
        AdjustmentId::new(AggregateId::new())
    }

    fn test_part_id() -> StockItemId {
        StockItemId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn entry_draft() -> AdjustmentDraft {
        AdjustmentDraft {
            header: AdjustmentHeader {
                employee_id: EmployeeId::new(),
                adjustment_type: AdjustmentType::Entry,
                reason: "cycle receipt".to_string(),
                occurred_at: test_time(),
            },
            lines: vec![AdjustmentLine {
                line_id: LineId::new(),
                target: LineTarget::Part {
                    part_id: test_part_id(),
                    lot: None,
                },
                quantity: Decimal::from(5),
                unit_cost: Decimal::from(4),
            }],
        }
    }

    fn drafted(draft: AdjustmentDraft) -> (Adjustment, TenantId, AdjustmentId) {
        let tenant_id = test_tenant_id();
        let adjustment_id = test_adjustment_id();
        let mut adjustment = Adjustment::empty(adjustment_id);
        let events = adjustment
            .handle(&AdjustmentCommand::DraftAdjustment(DraftAdjustment {
                tenant_id,
                adjustment_id,
                draft,
                occurred_at: test_time(),
            }))
            .unwrap();
        for e in &events {
            adjustment.apply(e);
        }
        (adjustment, tenant_id, adjustment_id)
    }

    #[test]
    fn draft_emits_drafted_event_and_becomes_pending() {
        let draft = entry_draft();
        let (adjustment, _, _) = drafted(draft.clone());
        assert_eq!(adjustment.status(), AdjustmentStatus::Pending);
        assert_eq!(adjustment.lines(), draft.lines.as_slice());
        assert_eq!(adjustment.version(), 1);
    }

    #[test]
    fn draft_with_empty_reason_is_rejected() {
        let mut draft = entry_draft();
        draft.header.reason = "  ".to_string();
        let adjustment = Adjustment::empty(test_adjustment_id());
        let err = adjustment
            .handle(&AdjustmentCommand::DraftAdjustment(DraftAdjustment {
                tenant_id: test_tenant_id(),
                adjustment_id: test_adjustment_id(),
                draft,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn unchanged_revision_emits_no_events() {
        let draft = entry_draft();
        let (adjustment, tenant_id, adjustment_id) = drafted(draft.clone());

        let events = adjustment
            .handle(&AdjustmentCommand::ReviseAdjustment(ReviseAdjustment {
                tenant_id,
                adjustment_id,
                draft,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn changed_revision_records_change_descriptions() {
        let draft = entry_draft();
        let (mut adjustment, tenant_id, adjustment_id) = drafted(draft.clone());

        let mut revised = draft.clone();
        revised.lines[0].quantity = Decimal::from(6);

        let events = adjustment
            .handle(&AdjustmentCommand::ReviseAdjustment(ReviseAdjustment {
                tenant_id,
                adjustment_id,
                draft: revised.clone(),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            AdjustmentEvent::AdjustmentRevised(e) => {
                assert_eq!(e.draft, revised);
                assert_eq!(e.changes.len(), 1);
                assert!(e.changes[0].contains("5 -> 6"));
            }
            other => panic!("expected AdjustmentRevised, got {other:?}"),
        }

        for e in &events {
            adjustment.apply(e);
        }
        assert_eq!(adjustment.lines()[0].quantity, Decimal::from(6));
    }

    #[test]
    fn applied_adjustment_rejects_revision_and_reapply() {
        let draft = entry_draft();
        let (mut adjustment, tenant_id, adjustment_id) = drafted(draft.clone());

        let events = adjustment
            .handle(&AdjustmentCommand::MarkAdjustmentApplied(
                MarkAdjustmentApplied {
                    tenant_id,
                    adjustment_id,
                    occurred_at: test_time(),
                },
            ))
            .unwrap();
        for e in &events {
            adjustment.apply(e);
        }
        assert_eq!(adjustment.status(), AdjustmentStatus::Applied);

        let err = adjustment
            .handle(&AdjustmentCommand::MarkAdjustmentApplied(
                MarkAdjustmentApplied {
                    tenant_id,
                    adjustment_id,
                    occurred_at: test_time(),
                },
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::AlreadyApplied(_)));

        let mut revised = draft;
        revised.header.reason = "late edit".to_string();
        let err = adjustment
            .handle(&AdjustmentCommand::ReviseAdjustment(ReviseAdjustment {
                tenant_id,
                adjustment_id,
                draft: revised,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::AlreadyApplied(_)));
    }
}
