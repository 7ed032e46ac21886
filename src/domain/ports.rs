use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::DomainError;
use super::order::{BuyerContact, OrderStatus, OrderView};
use super::redemption::{IssuedTicket, OperatorCredentials, VerifyOutcome};
use super::ticket_pool::{ReservationLine, TicketTypeSnapshot};

/// Atomic capacity accounting for ticket pools.
///
/// `reserve` and `release` must be linearizable per ticket type: the bound
/// check and the counter mutation happen as one indivisible step against the
/// backing store. `availability` is an eventually-consistent snapshot for
/// display and must never drive a reservation decision.
pub trait TicketPoolStore: Send + Sync {
    fn reserve(&self, ticket_type_id: Uuid, quantity: i32) -> Result<(), DomainError>;
    fn release(&self, ticket_type_id: Uuid, quantity: i32) -> Result<(), DomainError>;
    fn availability(&self, event_id: Uuid) -> Result<Vec<TicketTypeSnapshot>, DomainError>;
}

#[derive(Debug, Clone)]
pub struct NewCheckout {
    pub event_id: Uuid,
    pub buyer: BuyerContact,
    pub lines: Vec<ReservationLine>,
    pub currency: String,
}

/// Result of an idempotent finalize: either this call issued the ticket, or a
/// previous one already had and the existing ticket is returned unchanged.
#[derive(Debug, Clone)]
pub enum FinalizeOutcome {
    Issued(IssuedTicket),
    AlreadyFinalized(IssuedTicket),
}

impl FinalizeOutcome {
    pub fn ticket(&self) -> &IssuedTicket {
        match self {
            FinalizeOutcome::Issued(t) | FinalizeOutcome::AlreadyFinalized(t) => t,
        }
    }
}

pub trait OrderRepository: Send + Sync {
    /// Server-side total for the given lines at current prices, without
    /// reserving anything. Used to validate a cart before capacity is taken.
    fn quote_total(&self, lines: &[ReservationLine]) -> Result<i64, DomainError>;

    /// Reserve every line and create the pending order in one transaction.
    /// All-or-nothing: if any line lacks capacity, no counter moves and no
    /// order row exists afterwards.
    fn create_pending(&self, checkout: NewCheckout) -> Result<OrderView, DomainError>;

    fn record_payment_ref(&self, order_id: Uuid, payment_ref: &str) -> Result<(), DomainError>;

    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError>;

    fn find_id_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Uuid>, DomainError>;

    /// Transition pending → paid exactly once and issue the redemption
    /// ticket in the same transaction. A duplicate call observes the order
    /// already paid and returns the previously issued ticket.
    fn mark_paid_and_issue(&self, order_id: Uuid) -> Result<FinalizeOutcome, DomainError>;

    /// Transition a pending order to `Failed` or `Cancelled` and release its
    /// reservations in the same transaction. Returns `false` (a no-op) when
    /// the order is no longer pending.
    fn cancel_pending(&self, order_id: Uuid, to: OrderStatus) -> Result<bool, DomainError>;

    /// Cancel pending orders created before `cutoff`, releasing their
    /// reservations. Returns how many orders were reclaimed.
    fn expire_pending_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DomainError>;

    fn issued_ticket(&self, order_id: Uuid) -> Result<Option<IssuedTicket>, DomainError>;
}

/// Race-free redemption bookkeeping: the capacity check and scan-count
/// increment execute as a single conditional statement per code.
pub trait RedemptionStore: Send + Sync {
    fn verify(&self, code: &str) -> Result<VerifyOutcome, DomainError>;
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub order_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub reference: String,
    pub authorization_url: String,
}

/// Asynchronous notification from the payment collaborator, delivered via
/// webhook and keyed by the session reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Succeeded { reference: String },
    Failed { reference: String },
    Closed { reference: String },
}

/// The only two things the checkout flow needs from the payment provider:
/// open a charge session for an exact amount, and report its minimum
/// chargeable amount up front.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn minimum_charge_minor(&self) -> i64;

    async fn create_session(&self, request: &ChargeRequest)
        -> Result<PaymentSession, DomainError>;
}

/// Transport used by the scanning client to reach the redemption verifier.
/// The decoded code is forwarded verbatim; credentials are request-scoped.
#[async_trait]
pub trait VerifyTransport: Send + Sync {
    async fn verify(
        &self,
        credentials: &OperatorCredentials,
        code: &str,
    ) -> Result<VerifyOutcome, DomainError>;
}
