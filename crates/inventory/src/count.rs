//! Physical count sessions: counted vs. system stock, applied as a full
//! overwrite exactly once.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use fleetdepot_catalog::StockItemId;
use fleetdepot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, EmployeeId, TenantId};
use fleetdepot_events::Event;

use crate::adjustment::LineId;
use crate::diff;
use crate::rules;

/// Count session identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountSessionId(pub AggregateId);

impl CountSessionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CountSessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Count session lifecycle. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl CountStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CountStatus::Completed | CountStatus::Cancelled)
    }
}

/// One counted supply.
///
/// `system_qty` is captured when the line is recorded and deliberately never
/// recomputed; the difference stays meaningful even if stock moves while the
/// count is underway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountLine {
    pub line_id: LineId,
    pub supply_id: StockItemId,
    pub counted_qty: Decimal,
    /// Cost assigned at apply time; defaults to the item's current average.
    pub unit_cost: Decimal,
    pub system_qty: Decimal,
}

impl CountLine {
    /// counted − system. Informational until the session is applied.
    pub fn difference(&self) -> Decimal {
        self.counted_qty - self.system_qty
    }
}

/// Count session header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountHeader {
    pub employee_id: EmployeeId,
    pub count_date: DateTime<Utc>,
    pub observations: String,
}

/// The plain structured shape the edit surface submits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDraft {
    pub header: CountHeader,
    pub lines: Vec<CountLine>,
}

/// Aggregate root: CountSession (lifecycle only; the stockroom owns the
/// resulting stock overwrite).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountSession {
    id: CountSessionId,
    tenant_id: Option<TenantId>,
    header: Option<CountHeader>,
    lines: Vec<CountLine>,
    status: CountStatus,
    version: u64,
    created: bool,
}

impl CountSession {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CountSessionId) -> Self {
        Self {
            id,
            tenant_id: None,
            header: None,
            lines: Vec::new(),
            status: CountStatus::Pending,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CountSessionId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn header(&self) -> Option<&CountHeader> {
        self.header.as_ref()
    }

    pub fn lines(&self) -> &[CountLine] {
        &self.lines
    }

    pub fn status(&self) -> CountStatus {
        self.status
    }

    /// The currently persisted draft (the diff baseline for edits).
    pub fn current_draft(&self) -> Option<CountDraft> {
        self.header.as_ref().map(|header| CountDraft {
            header: header.clone(),
            lines: self.lines.clone(),
        })
    }
}

impl AggregateRoot for CountSession {
    type Id = CountSessionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenCount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenCount {
    pub tenant_id: TenantId,
    pub count_id: CountSessionId,
    pub draft: CountDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviseCount (add/remove lines, change counted figures).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseCount {
    pub tenant_id: TenantId,
    pub count_id: CountSessionId,
    pub draft: CountDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelCount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelCount {
    pub tenant_id: TenantId,
    pub count_id: CountSessionId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkCountApplied (issued after the stockroom reconciled it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkCountApplied {
    pub tenant_id: TenantId,
    pub count_id: CountSessionId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountCommand {
    OpenCount(OpenCount),
    ReviseCount(ReviseCount),
    CancelCount(CancelCount),
    MarkCountApplied(MarkCountApplied),
}

/// Event: CountOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountOpened {
    pub tenant_id: TenantId,
    pub count_id: CountSessionId,
    pub draft: CountDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CountRevised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRevised {
    pub tenant_id: TenantId,
    pub count_id: CountSessionId,
    pub draft: CountDraft,
    pub changes: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CountCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountCancelled {
    pub tenant_id: TenantId,
    pub count_id: CountSessionId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CountMarkedApplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMarkedApplied {
    pub tenant_id: TenantId,
    pub count_id: CountSessionId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountEvent {
    CountOpened(CountOpened),
    CountRevised(CountRevised),
    CountCancelled(CountCancelled),
    CountMarkedApplied(CountMarkedApplied),
}

impl Event for CountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CountEvent::CountOpened(_) => "inventory.count.opened",
            CountEvent::CountRevised(_) => "inventory.count.revised",
            CountEvent::CountCancelled(_) => "inventory.count.cancelled",
            CountEvent::CountMarkedApplied(_) => "inventory.count.marked_applied",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CountEvent::CountOpened(e) => e.occurred_at,
            CountEvent::CountRevised(e) => e.occurred_at,
            CountEvent::CountCancelled(e) => e.occurred_at,
            CountEvent::CountMarkedApplied(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CountSession {
    type Command = CountCommand;
    type Event = CountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CountEvent::CountOpened(e) => {
                self.id = e.count_id;
                self.tenant_id = Some(e.tenant_id);
                self.header = Some(e.draft.header.clone());
                self.lines = e.draft.lines.clone();
                self.status = CountStatus::Pending;
                self.created = true;
            }
            CountEvent::CountRevised(e) => {
                self.header = Some(e.draft.header.clone());
                self.lines = e.draft.lines.clone();
                self.status = CountStatus::InProgress;
            }
            CountEvent::CountCancelled(_) => {
                self.status = CountStatus::Cancelled;
            }
            CountEvent::CountMarkedApplied(_) => {
                self.status = CountStatus::Completed;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CountCommand::OpenCount(cmd) => self.handle_open(cmd),
            CountCommand::ReviseCount(cmd) => self.handle_revise(cmd),
            CountCommand::CancelCount(cmd) => self.handle_cancel(cmd),
            CountCommand::MarkCountApplied(cmd) => self.handle_mark_applied(cmd),
        }
    }
}

impl CountSession {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_count_id(&self, count_id: CountSessionId) -> Result<(), DomainError> {
        if self.id != count_id {
            return Err(DomainError::invariant("count_id mismatch"));
        }
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), DomainError> {
        match self.status {
            CountStatus::Completed => Err(DomainError::already_applied(
                "applied counts cannot be edited",
            )),
            CountStatus::Cancelled => Err(DomainError::invariant(
                "cancelled counts cannot be edited",
            )),
            CountStatus::Pending | CountStatus::InProgress => Ok(()),
        }
    }

    fn handle_open(&self, cmd: &OpenCount) -> Result<Vec<CountEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("count session already exists"));
        }
        rules::validate_count(&cmd.draft)?;

        Ok(vec![CountEvent::CountOpened(CountOpened {
            tenant_id: cmd.tenant_id,
            count_id: cmd.count_id,
            draft: cmd.draft.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseCount) -> Result<Vec<CountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_count_id(cmd.count_id)?;
        self.ensure_editable()?;

        rules::validate_count(&cmd.draft)?;

        let original = self
            .current_draft()
            .ok_or_else(|| DomainError::invariant("created count session without a draft"))?;

        // No difference against the persisted draft means nothing to save:
        // zero events, so the dispatcher performs no write.
        let changes = diff::diff_count(&original, &cmd.draft);
        if changes.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![CountEvent::CountRevised(CountRevised {
            tenant_id: cmd.tenant_id,
            count_id: cmd.count_id,
            draft: cmd.draft.clone(),
            changes: changes.descriptions(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelCount) -> Result<Vec<CountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_count_id(cmd.count_id)?;

        match self.status {
            CountStatus::Completed => Err(DomainError::invariant(
                "applied counts cannot be cancelled",
            )),
            CountStatus::Cancelled => Err(DomainError::conflict("count is already cancelled")),
            CountStatus::Pending | CountStatus::InProgress => {
                Ok(vec![CountEvent::CountCancelled(CountCancelled {
                    tenant_id: cmd.tenant_id,
                    count_id: cmd.count_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }

    fn handle_mark_applied(&self, cmd: &MarkCountApplied) -> Result<Vec<CountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_count_id(cmd.count_id)?;

        match self.status {
            CountStatus::Completed => Err(DomainError::already_applied(format!(
                "count {} is already applied",
                self.id
            ))),
            CountStatus::Cancelled => Err(DomainError::invariant(
                "cancelled counts cannot be applied",
            )),
            CountStatus::Pending | CountStatus::InProgress => {
                Ok(vec![CountEvent::CountMarkedApplied(CountMarkedApplied {
                    tenant_id: cmd.tenant_id,
                    count_id: cmd.count_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_count_id() -> CountSessionId {
        CountSessionId::new(AggregateId::new())
    }

    fn test_supply_id() -> StockItemId {
        StockItemId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn count_draft() -> CountDraft {
        CountDraft {
            header: CountHeader {
                employee_id: EmployeeId::new(),
                count_date: test_time(),
                observations: "monthly tank check".to_string(),
            },
            lines: vec![CountLine {
                line_id: LineId::new(),
                supply_id: test_supply_id(),
                counted_qty: Decimal::from(17),
                unit_cost: Decimal::new(150, 2),
                system_qty: Decimal::from(20),
            }],
        }
    }

    fn opened(draft: CountDraft) -> (CountSession, TenantId, CountSessionId) {
        let tenant_id = test_tenant_id();
        let count_id = test_count_id();
        let mut session = CountSession::empty(count_id);
        let events = session
            .handle(&CountCommand::OpenCount(OpenCount {
                tenant_id,
                count_id,
                draft,
                occurred_at: test_time(),
            }))
            .unwrap();
        for e in &events {
            session.apply(e);
        }
        (session, tenant_id, count_id)
    }

    #[test]
    fn difference_is_counted_minus_system() {
        let draft = count_draft();
        assert_eq!(draft.lines[0].difference(), Decimal::from(-3));
    }

    #[test]
    fn open_starts_pending_and_captures_system_qty() {
        let draft = count_draft();
        let (session, _, _) = opened(draft.clone());
        assert_eq!(session.status(), CountStatus::Pending);
        assert_eq!(session.lines()[0].system_qty, Decimal::from(20));
    }

    #[test]
    fn revise_moves_to_in_progress_and_recomputes_difference() {
        let draft = count_draft();
        let (mut session, tenant_id, count_id) = opened(draft.clone());

        let mut revised = draft;
        revised.lines[0].counted_qty = Decimal::from(22);
        let events = session
            .handle(&CountCommand::ReviseCount(ReviseCount {
                tenant_id,
                count_id,
                draft: revised,
                occurred_at: test_time(),
            }))
            .unwrap();
        for e in &events {
            session.apply(e);
        }

        assert_eq!(session.status(), CountStatus::InProgress);
        assert_eq!(session.lines()[0].difference(), Decimal::from(2));
    }

    #[test]
    fn unchanged_revision_emits_no_events() {
        let draft = count_draft();
        let (session, tenant_id, count_id) = opened(draft.clone());

        let events = session
            .handle(&CountCommand::ReviseCount(ReviseCount {
                tenant_id,
                count_id,
                draft,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn second_apply_fails_with_already_applied() {
        let (mut session, tenant_id, count_id) = opened(count_draft());

        let events = session
            .handle(&CountCommand::MarkCountApplied(MarkCountApplied {
                tenant_id,
                count_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        for e in &events {
            session.apply(e);
        }
        assert_eq!(session.status(), CountStatus::Completed);

        let err = session
            .handle(&CountCommand::MarkCountApplied(MarkCountApplied {
                tenant_id,
                count_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::AlreadyApplied(_)));
    }

    #[test]
    fn cancelled_count_rejects_edits_and_apply() {
        let draft = count_draft();
        let (mut session, tenant_id, count_id) = opened(draft.clone());

        let events = session
            .handle(&CountCommand::CancelCount(CancelCount {
                tenant_id,
                count_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        for e in &events {
            session.apply(e);
        }
        assert_eq!(session.status(), CountStatus::Cancelled);
        assert!(session.status().is_terminal());

        let err = session
            .handle(&CountCommand::MarkCountApplied(MarkCountApplied {
                tenant_id,
                count_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let mut revised = draft;
        revised.lines[0].counted_qty = Decimal::from(1);
        let err = session
            .handle(&CountCommand::ReviseCount(ReviseCount {
                tenant_id,
                count_id,
                draft: revised,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn negative_counted_quantity_is_rejected_at_open() {
        let mut draft = count_draft();
        draft.lines[0].counted_qty = Decimal::from(-1);
        let session = CountSession::empty(test_count_id());
        let err = session
            .handle(&CountCommand::OpenCount(OpenCount {
                tenant_id: test_tenant_id(),
                count_id: test_count_id(),
                draft,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
