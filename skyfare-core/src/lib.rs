pub mod identity;
pub mod payment;

use std::fmt::Display;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Seat {0} is not available")]
    SeatUnavailable(String),
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("State conflict: {0}")]
    StateConflict(String),
    #[error("Booking {0} has already been paid")]
    AlreadyPaid(String),
    #[error("Payment failed: {0}")]
    PaymentFailed(String),
    #[error("Booking reference {0} is already in use")]
    DuplicateReference(String),
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Display) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(from: impl Display, to: impl Display) -> Self {
        CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Stable machine-readable code, reported to callers alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ValidationError(_) => "validation_error",
            CoreError::NotFound { .. } => "not_found",
            CoreError::SeatUnavailable(_) => "seat_unavailable",
            CoreError::InvalidTransition { .. } => "invalid_transition",
            CoreError::StateConflict(_) => "state_conflict",
            CoreError::AlreadyPaid(_) => "already_paid",
            CoreError::PaymentFailed(_) => "payment_failed",
            CoreError::DuplicateReference(_) => "duplicate_reference",
            CoreError::ConstraintViolation(_) => "constraint_violation",
            CoreError::StorageError(_) => "storage_error",
            CoreError::InternalError(_) => "internal_error",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
