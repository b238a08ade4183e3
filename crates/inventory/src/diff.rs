//! Change-detection guard for edit flows.
//!
//! An explicit field/line diff, not serialize-and-compare: key ordering and
//! formatting can never produce a false positive. Lines are matched by their
//! stable [`LineId`], so reordering alone is not a change. Pure and
//! deterministic for a given snapshot/draft pair.

use crate::adjustment::AdjustmentDraft;
use crate::count::CountDraft;

/// One detected difference, rendered as "field: before -> after".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: String,
    pub before: String,
    pub after: String,
}

impl core::fmt::Display for FieldChange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {} -> {}", self.field, self.before, self.after)
    }
}

/// The structured result the edit surface shows for confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<FieldChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[FieldChange] {
        &self.changes
    }

    /// One line per change, "old -> new" style, for user confirmation.
    pub fn descriptions(&self) -> Vec<String> {
        self.changes.iter().map(FieldChange::to_string).collect()
    }

    fn record(
        &mut self,
        field: impl Into<String>,
        before: impl core::fmt::Display,
        after: impl core::fmt::Display,
    ) {
        self.changes.push(FieldChange {
            field: field.into(),
            before: before.to_string(),
            after: after.to_string(),
        });
    }

    fn record_if_changed<T: PartialEq + core::fmt::Display>(
        &mut self,
        field: impl Into<String>,
        before: &T,
        after: &T,
    ) {
        if before != after {
            self.record(field, before, after);
        }
    }
}

/// Diff an adjustment draft against its loaded snapshot.
pub fn diff_adjustment(original: &AdjustmentDraft, draft: &AdjustmentDraft) -> ChangeSet {
    let mut set = ChangeSet::default();

    set.record_if_changed(
        "employee",
        &original.header.employee_id,
        &draft.header.employee_id,
    );
    set.record_if_changed(
        "type",
        &original.header.adjustment_type,
        &draft.header.adjustment_type,
    );
    if original.header.reason != draft.header.reason {
        set.record(
            "reason",
            format!("\"{}\"", original.header.reason),
            format!("\"{}\"", draft.header.reason),
        );
    }
    set.record_if_changed(
        "date",
        &original.header.occurred_at,
        &draft.header.occurred_at,
    );

    // Draft lines first (changed/added, in draft order), then removals in
    // original order; the ordering is stable for a given input pair.
    for (idx, line) in draft.lines.iter().enumerate() {
        let label = format!("line {}", idx + 1);
        match original.lines.iter().find(|l| l.line_id == line.line_id) {
            Some(before) => {
                if before.target != line.target {
                    set.record(
                        format!("{label} target"),
                        before.target.describe(),
                        line.target.describe(),
                    );
                }
                set.record_if_changed(
                    format!("{label} quantity"),
                    &before.quantity,
                    &line.quantity,
                );
                set.record_if_changed(
                    format!("{label} unit cost"),
                    &before.unit_cost,
                    &line.unit_cost,
                );
            }
            None => {
                set.record(label, "(none)", format!("added {}", line.target.describe()));
            }
        }
    }
    for (idx, line) in original.lines.iter().enumerate() {
        if !draft.lines.iter().any(|l| l.line_id == line.line_id) {
            set.record(format!("line {}", idx + 1), line.target.describe(), "(removed)");
        }
    }

    set
}

/// Diff a count draft against its loaded snapshot.
///
/// `system_qty` is a captured snapshot, not an operator edit, so it is not
/// part of the comparison.
pub fn diff_count(original: &CountDraft, draft: &CountDraft) -> ChangeSet {
    let mut set = ChangeSet::default();

    set.record_if_changed(
        "employee",
        &original.header.employee_id,
        &draft.header.employee_id,
    );
    set.record_if_changed(
        "count date",
        &original.header.count_date,
        &draft.header.count_date,
    );
    if original.header.observations != draft.header.observations {
        set.record(
            "observations",
            format!("\"{}\"", original.header.observations),
            format!("\"{}\"", draft.header.observations),
        );
    }

    for (idx, line) in draft.lines.iter().enumerate() {
        let label = format!("line {}", idx + 1);
        match original.lines.iter().find(|l| l.line_id == line.line_id) {
            Some(before) => {
                set.record_if_changed(format!("{label} supply"), &before.supply_id, &line.supply_id);
                set.record_if_changed(
                    format!("{label} counted"),
                    &before.counted_qty,
                    &line.counted_qty,
                );
                set.record_if_changed(
                    format!("{label} unit cost"),
                    &before.unit_cost,
                    &line.unit_cost,
                );
            }
            None => {
                set.record(label, "(none)", format!("added supply {}", line.supply_id));
            }
        }
    }
    for (idx, line) in original.lines.iter().enumerate() {
        if !draft.lines.iter().any(|l| l.line_id == line.line_id) {
            set.record(
                format!("line {}", idx + 1),
                format!("supply {}", line.supply_id),
                "(removed)",
            );
        }
    }

    set
}
