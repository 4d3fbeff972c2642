//! Domain error taxonomy.

use thiserror::Error;

/// The specific conflict detected by a store or by the assignment engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The equipment unit is already assigned somewhere, or is not in an
    /// assignable status.
    AlreadyAssigned,
    /// The site already has an open roster entry for this unit.
    AlreadyOpenHere,
    /// The roster entry has already been closed.
    AlreadyClosed,
    /// The record cannot be deleted while the unit is in use.
    InUse,
    /// An equipment identifier is already taken.
    DuplicateIdentifier,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::AlreadyAssigned => "equipment is already assigned or unavailable",
            ConflictKind::AlreadyOpenHere => "equipment already has an open entry at this site",
            ConflictKind::AlreadyClosed => "roster entry is already closed",
            ConflictKind::InUse => "equipment is in use",
            ConflictKind::DuplicateIdentifier => "identifier is already in use",
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors surfaced by the domain core.
///
/// `Forbidden`, `NotFound` and `Conflict` are deterministic and safe to
/// show to callers as-is. `PartialFailure` means a cross-aggregate write
/// sequence was interrupted and rolled back after a bounded retry; the
/// whole operation is safe to re-attempt because every underlying step is
/// idempotent for a given target state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("operation forbidden for this principal")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(ConflictKind),

    #[error("partial failure during {operation}: {completed} write committed, {failed} write failed")]
    PartialFailure {
        operation: &'static str,
        completed: &'static str,
        failed: &'static str,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_messages_are_stable() {
        assert_eq!(
            DomainError::Conflict(ConflictKind::AlreadyClosed).to_string(),
            "conflict: roster entry is already closed"
        );
        assert_eq!(
            DomainError::NotFound("site").to_string(),
            "site not found"
        );
    }

    #[test]
    fn partial_failure_names_both_sides() {
        let err = DomainError::PartialFailure {
            operation: "assign",
            completed: "equipment",
            failed: "site roster",
        };
        let msg = err.to_string();
        assert!(msg.contains("equipment"));
        assert!(msg.contains("site roster"));
    }
}
