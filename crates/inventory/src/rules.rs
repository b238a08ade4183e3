//! Shared validation rule set for adjustment and count paths.
//!
//! Both the draft aggregates and the stockroom apply path consume the same
//! rules, so creation and edit flows cannot drift apart. Every failure is a
//! tagged [`RuleViolation`], never a bare boolean, so callers can render a
//! specific message for the offending line.

use rust_decimal::Decimal;

use fleetdepot_core::DomainError;

use crate::adjustment::{AdjustmentDraft, AdjustmentType, LineTarget};
use crate::count::CountDraft;

/// The individual rules a draft can violate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    ReasonRequired,
    LinesRequired,
    EntryQuantityNotPositive,
    ExitQuantityNotNegative,
    RevaluationQuantityNotZero,
    UnitCostNegative,
    LotRequiredForPartIssue,
    LotNotAllowedOnEntry,
    StaleLotSelection,
    CountedQuantityNegative,
}

impl Rule {
    pub fn message(self) -> &'static str {
        match self {
            Rule::ReasonRequired => "a reason is required",
            Rule::LinesRequired => "at least one line is required",
            Rule::EntryQuantityNotPositive => "entry quantity must be positive",
            Rule::ExitQuantityNotNegative => "exit quantity must be negative",
            Rule::RevaluationQuantityNotZero => "revaluation quantity must be zero",
            Rule::UnitCostNegative => "unit cost cannot be negative",
            Rule::LotRequiredForPartIssue => {
                "a lot must be named when issuing or revaluing a part"
            }
            Rule::LotNotAllowedOnEntry => "entries create a new lot, none can be named",
            Rule::StaleLotSelection => {
                "the part changed but the lot selection was kept; pick a lot again"
            }
            Rule::CountedQuantityNegative => "counted quantity cannot be negative",
        }
    }
}

/// A violated rule, with the offending line where one applies (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleViolation {
    pub rule: Rule,
    pub line: Option<usize>,
}

impl RuleViolation {
    pub fn header(rule: Rule) -> Self {
        Self { rule, line: None }
    }

    pub fn at_line(rule: Rule, line: usize) -> Self {
        Self {
            rule,
            line: Some(line),
        }
    }
}

impl core::fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.line {
            Some(idx) => write!(f, "line {}: {}", idx + 1, self.rule.message()),
            None => f.write_str(self.rule.message()),
        }
    }
}

impl From<RuleViolation> for DomainError {
    fn from(value: RuleViolation) -> Self {
        DomainError::validation(value.to_string())
    }
}

/// Sign/magnitude rule for a line quantity, indexed by adjustment type.
pub fn quantity_rule(adjustment_type: AdjustmentType, quantity: Decimal) -> Option<Rule> {
    match adjustment_type {
        AdjustmentType::Entry if quantity <= Decimal::ZERO => {
            Some(Rule::EntryQuantityNotPositive)
        }
        AdjustmentType::Exit if quantity >= Decimal::ZERO => Some(Rule::ExitQuantityNotNegative),
        AdjustmentType::Revaluation if !quantity.is_zero() => {
            Some(Rule::RevaluationQuantityNotZero)
        }
        _ => None,
    }
}

/// Validate a draft adjustment (creation and re-save share this).
///
/// The employee and the type are structurally present on the typed header;
/// the rules here cover what the types cannot express.
pub fn validate_adjustment(draft: &AdjustmentDraft) -> Result<(), RuleViolation> {
    if draft.header.reason.trim().is_empty() {
        return Err(RuleViolation::header(Rule::ReasonRequired));
    }
    if draft.lines.is_empty() {
        return Err(RuleViolation::header(Rule::LinesRequired));
    }

    let adjustment_type = draft.header.adjustment_type;
    for (idx, line) in draft.lines.iter().enumerate() {
        if let Some(rule) = quantity_rule(adjustment_type, line.quantity) {
            return Err(RuleViolation::at_line(rule, idx));
        }

        match adjustment_type {
            AdjustmentType::Entry => {
                if line.unit_cost < Decimal::ZERO {
                    return Err(RuleViolation::at_line(Rule::UnitCostNegative, idx));
                }
                if matches!(line.target, LineTarget::Part { lot: Some(_), .. }) {
                    return Err(RuleViolation::at_line(Rule::LotNotAllowedOnEntry, idx));
                }
            }
            AdjustmentType::Exit => {
                if matches!(line.target, LineTarget::Part { lot: None, .. }) {
                    return Err(RuleViolation::at_line(Rule::LotRequiredForPartIssue, idx));
                }
            }
            AdjustmentType::Revaluation => {
                if line.unit_cost < Decimal::ZERO {
                    return Err(RuleViolation::at_line(Rule::UnitCostNegative, idx));
                }
                if matches!(line.target, LineTarget::Part { lot: None, .. }) {
                    return Err(RuleViolation::at_line(Rule::LotRequiredForPartIssue, idx));
                }
            }
        }
    }

    Ok(())
}

/// Revision-only rules, checked against the persisted draft.
///
/// A lot selection is only meaningful for the part it was picked under; a
/// line whose part changed while its lot survived is stale and rejected.
pub fn validate_adjustment_revision(
    original: &AdjustmentDraft,
    draft: &AdjustmentDraft,
) -> Result<(), RuleViolation> {
    for (idx, line) in draft.lines.iter().enumerate() {
        let Some(before) = original.lines.iter().find(|l| l.line_id == line.line_id) else {
            continue;
        };

        if let (
            LineTarget::Part {
                part_id: old_part,
                lot: old_lot,
            },
            LineTarget::Part {
                part_id: new_part,
                lot: new_lot,
            },
        ) = (&before.target, &line.target)
        {
            if old_part != new_part && new_lot.is_some() && new_lot == old_lot {
                return Err(RuleViolation::at_line(Rule::StaleLotSelection, idx));
            }
        }
    }

    Ok(())
}

/// Validate a count session draft.
pub fn validate_count(draft: &CountDraft) -> Result<(), RuleViolation> {
    if draft.lines.is_empty() {
        return Err(RuleViolation::header(Rule::LinesRequired));
    }

    for (idx, line) in draft.lines.iter().enumerate() {
        if line.counted_qty < Decimal::ZERO {
            return Err(RuleViolation::at_line(Rule::CountedQuantityNegative, idx));
        }
        if line.unit_cost < Decimal::ZERO {
            return Err(RuleViolation::at_line(Rule::UnitCostNegative, idx));
        }
    }

    Ok(())
}
