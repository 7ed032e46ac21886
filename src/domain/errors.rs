use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Insufficient capacity for ticket type {ticket_type_id}")]
    InsufficientCapacity { ticket_type_id: Uuid },
    #[error("Not found")]
    NotFound,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Payment gateway rejected the request: {0}")]
    PaymentRejected(String),
    #[error("Transient storage error: {0}")]
    TransientStore(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Only transient infrastructure errors are eligible for automatic retry.
    /// Invariant violations (capacity, redemption, state conflicts) never are.
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::TransientStore(_))
    }
}
