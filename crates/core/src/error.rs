//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
///
/// Everything here is recoverable: errors are surfaced verbatim to the edit
/// surface for user-facing messaging, never auto-retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, rule violation).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A depletion asked for more than the named lot still holds.
    #[error("insufficient lot quantity: requested {requested}, remaining {remaining}")]
    InsufficientLotQuantity {
        requested: Decimal,
        remaining: Decimal,
    },

    /// A referenced item/lot/session no longer exists or was re-keyed since
    /// the draft was loaded.
    #[error("stale reference: {0}")]
    StaleReference(String),

    /// An apply-once operation was attempted a second time.
    #[error("already applied: {0}")]
    AlreadyApplied(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn insufficient_lot(requested: Decimal, remaining: Decimal) -> Self {
        Self::InsufficientLotQuantity {
            requested,
            remaining,
        }
    }

    pub fn stale_reference(msg: impl Into<String>) -> Self {
        Self::StaleReference(msg.into())
    }

    pub fn already_applied(msg: impl Into<String>) -> Self {
        Self::AlreadyApplied(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
