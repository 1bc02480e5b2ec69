//! Error types for `ShareCore`.
//!
//! The error design distinguishes the failure taxonomies the engine
//! exposes to callers:
//!
//! - **Validation**: malformed input or a failed transition guard. Rejected
//!   synchronously with the failing guard named; no state change.
//! - **Conflict**: the transition is incompatible with current state, or
//!   the inventory cannot cover the request. No partial mutation.
//! - **Expired**: the approval window lapsed before payment.
//! - **Unauthorized**: the caller's role does not permit the operation.
//! - **Ledger**: persistence-layer failure; the triggering transition is
//!   rolled back, never half-applied.
//!
//! Every rejected transition carries a specific reason so the surrounding
//! surface can render an accurate message, never a generic failure.

use crate::investment::InvestmentStatus;
use crate::project::ProjectStatus;
use crate::types::{InvestmentId, ProjectId, ReservationId};
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A transition guard or input validation failed.
    #[error("Validation failed on '{field}': {reason}")]
    Validation {
        /// The field or guard that failed.
        field: &'static str,
        /// Why it failed.
        reason: String,
    },

    /// The requested shares exceed what remains available.
    #[error("Insufficient shares: requested {requested}, remaining {remaining}")]
    InsufficientShares {
        /// Shares requested.
        requested: u64,
        /// Shares still available (total minus sold minus open reservations).
        remaining: u64,
    },

    /// The entity is not in a state that permits the attempted transition.
    #[error("Invalid transition: {entity} is {current}, cannot {attempted}")]
    InvalidTransition {
        /// Which entity kind was involved.
        entity: &'static str,
        /// The entity's current status.
        current: String,
        /// The attempted operation.
        attempted: &'static str,
    },

    /// A domain conflict that is not a state-machine violation, e.g. a
    /// second pending edit request for the same project.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The approval window lapsed before payment was attempted.
    #[error("Investment {0} approval has expired")]
    Expired(InvestmentId),

    /// The caller's role does not permit this operation.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The requested project does not exist.
    #[error("Project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// The requested investment does not exist.
    #[error("Investment not found: {0}")]
    InvestmentNotFound(InvestmentId),

    /// An error occurred in the ledger store.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// An unexpected internal error occurred. Indicates a bug.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Convenience constructor for validation failures.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_project_transition(
        current: ProjectStatus,
        attempted: &'static str,
    ) -> Self {
        Self::InvalidTransition {
            entity: "project",
            current: current.to_string(),
            attempted,
        }
    }

    pub(crate) fn invalid_investment_transition(
        current: InvestmentStatus,
        attempted: &'static str,
    ) -> Self {
        Self::InvalidTransition {
            entity: "investment",
            current: current.to_string(),
            attempted,
        }
    }
}

/// Errors that can occur when interacting with the ledger store.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// An entry could not be appended.
    #[error("Append failed: {0}")]
    AppendFailed(String),

    /// A sequence conflict occurred while appending.
    #[error("Sequence conflict: expected {expected}, current {current}")]
    SequenceConflict {
        /// The sequence that was expected.
        expected: u64,
        /// The actual current head sequence.
        current: u64,
    },

    /// Serialization of an entry failed.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// The ledger store is unavailable.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by the share inventory manager.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InventoryError {
    /// The reservation would overdraw the project's share pool. A
    /// legitimate business rejection, not a race artifact.
    #[error("Insufficient shares for project {project_id}: requested {requested}, remaining {remaining}")]
    InsufficientShares {
        /// The project whose pool was overdrawn.
        project_id: ProjectId,
        /// Shares requested.
        requested: u64,
        /// Shares still available.
        remaining: u64,
    },

    /// Commit or release named an unknown reservation. A programmer
    /// error; never retried.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The project has not been registered with the inventory.
    #[error("Project not registered in inventory: {0}")]
    UnknownProject(ProjectId),

    /// Resizing the pool below committed and reserved shares.
    #[error("Cannot shrink project {project_id} to {requested_total} shares: {allocated} already sold or reserved")]
    ShrinkBelowAllocation {
        /// The project being resized.
        project_id: ProjectId,
        /// The requested new total.
        requested_total: u64,
        /// Shares already sold plus open reservations.
        allocated: u64,
    },
}

impl From<InventoryError> for EngineError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InsufficientShares {
                requested,
                remaining,
                ..
            } => Self::InsufficientShares {
                requested,
                remaining,
            },
            InventoryError::ShrinkBelowAllocation { .. } => Self::Conflict(err.to_string()),
            InventoryError::ReservationNotFound(_) | InventoryError::UnknownProject(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

/// Type alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;

/// Type alias for ledger store results.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Type alias for inventory results.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// The reason an actor was denied, used by engine guards.
pub(crate) fn unauthorized(required: &str) -> EngineError {
    EngineError::Unauthorized(format!("requires {required}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_messages_are_descriptive() {
        let err = EngineError::validation("description", "must be at least 50 characters");
        assert_eq!(
            err.to_string(),
            "Validation failed on 'description': must be at least 50 characters"
        );

        let err = EngineError::InsufficientShares {
            requested: 700,
            remaining: 300,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient shares: requested 700, remaining 300"
        );
    }

    #[test]
    fn inventory_insufficient_maps_to_engine_variant() {
        let project_id = ProjectId::try_new("PRJ-1").unwrap();
        let err: EngineError = InventoryError::InsufficientShares {
            project_id,
            requested: 10,
            remaining: 3,
        }
        .into();
        assert!(matches!(
            err,
            EngineError::InsufficientShares {
                requested: 10,
                remaining: 3
            }
        ));
    }

    #[test]
    fn reservation_not_found_is_internal() {
        let err: EngineError =
            InventoryError::ReservationNotFound(crate::types::ReservationId::new()).into();
        assert!(matches!(err, EngineError::Internal(_)));
    }

    #[test]
    fn ledger_error_converts_to_engine_error() {
        let err: EngineError = LedgerError::Unavailable("connection reset".to_string()).into();
        match err {
            EngineError::Ledger(LedgerError::Unavailable(msg)) => {
                assert_eq!(msg, "connection reset");
            }
            other => panic!("expected ledger variant, got {other:?}"),
        }
    }
}
