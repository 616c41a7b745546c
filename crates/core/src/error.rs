//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic business failure raised synchronously at the
/// point of violation. Nothing here is retried internally: only the caller knows
/// whether a failure reflects stale local state or a genuine rule violation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (items, amounts, identifiers, vendor codes).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A credit was requested for more than the outstanding balance.
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u64, available: u64 },

    /// The target is not in the state the operation requires.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn insufficient_balance(requested: u64, available: u64) -> Self {
        Self::InsufficientBalance {
            requested,
            available,
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Whether refreshing local state from the vendor could make a retry succeed.
    pub fn is_stale_state(&self) -> bool {
        matches!(
            self,
            Self::InsufficientBalance { .. } | Self::InvalidState(_) | Self::Conflict(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_message_names_both_amounts() {
        let err = DomainError::insufficient_balance(70, 60);
        assert_eq!(
            err.to_string(),
            "insufficient balance: requested 70, available 60"
        );
    }

    #[test]
    fn validation_failures_are_not_stale_state() {
        assert!(!DomainError::validation("empty items").is_stale_state());
        assert!(DomainError::invalid_state("void").is_stale_state());
        assert!(DomainError::conflict("version").is_stale_state());
    }
}
