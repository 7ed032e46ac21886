use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::order::{BuyerContact, OrderStatus, OrderView};
use crate::domain::ports::{
    ChargeRequest, NewCheckout, OrderRepository, PaymentEvent, PaymentGateway, PaymentSession,
};
use crate::domain::redemption::IssuedTicket;
use crate::domain::ticket_pool::ReservationLine;

use super::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub currency: String,
    /// Pending orders older than this are reclaimed by the abandonment sweep.
    pub pending_ttl: Duration,
}

/// Successful checkout: either the order awaits payment at the gateway, or it
/// was free and is already finalized with its admission ticket.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    AwaitingPayment {
        order: OrderView,
        session: PaymentSession,
    },
    Completed {
        order: OrderView,
        ticket: IssuedTicket,
    },
}

/// What a payment notification resolved to.
#[derive(Debug, Clone)]
pub enum PaymentResolution {
    Finalized {
        order_id: Uuid,
        ticket: IssuedTicket,
    },
    Cancelled {
        order_id: Uuid,
        status: OrderStatus,
    },
    /// The order had already left `pending`; the notification was a no-op.
    Ignored {
        order_id: Uuid,
    },
}

/// Drives an order through
/// `Idle → OrderPending → AwaitingPayment → Finalizing → {Succeeded | Failed}`.
///
/// The durable projection of the machine is the order's status column:
/// `pending` covers OrderPending/AwaitingPayment (payment_ref set once a
/// gateway session exists), `paid` is Succeeded, `failed`/`cancelled` are the
/// Failed arm. Reservation happens atomically with order creation; every
/// path out of `pending` other than `paid` releases the reserved capacity.
pub struct CheckoutOrchestrator<O> {
    orders: O,
    gateway: Arc<dyn PaymentGateway>,
    retry: RetryPolicy,
    config: CheckoutConfig,
}

impl<O: Clone> Clone for CheckoutOrchestrator<O> {
    fn clone(&self) -> Self {
        CheckoutOrchestrator {
            orders: self.orders.clone(),
            gateway: Arc::clone(&self.gateway),
            retry: self.retry,
            config: self.config.clone(),
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, DomainError>
where
    F: FnOnce() -> Result<T, DomainError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DomainError::Internal(format!("blocking task failed: {e}")))?
}

impl<O> CheckoutOrchestrator<O>
where
    O: OrderRepository + Clone + Send + 'static,
{
    pub fn new(
        orders: O,
        gateway: Arc<dyn PaymentGateway>,
        retry: RetryPolicy,
        config: CheckoutConfig,
    ) -> Self {
        CheckoutOrchestrator {
            orders,
            gateway,
            retry,
            config,
        }
    }

    /// Begin a checkout: validate the cart, reserve capacity and create the
    /// pending order (all-or-nothing), then either open a payment session or
    /// finalize immediately for free orders.
    pub async fn checkout(
        &self,
        event_id: Uuid,
        buyer: BuyerContact,
        lines: Vec<ReservationLine>,
    ) -> Result<CheckoutOutcome, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::InvalidInput("cart is empty".to_string()));
        }
        if lines.iter().any(|l| l.quantity <= 0) {
            return Err(DomainError::InvalidInput(
                "quantities must be positive".to_string(),
            ));
        }
        for (i, line) in lines.iter().enumerate() {
            if lines[..i]
                .iter()
                .any(|prev| prev.ticket_type_id == line.ticket_type_id)
            {
                return Err(DomainError::InvalidInput(
                    "duplicate ticket type in cart".to_string(),
                ));
            }
        }

        // Validate the total before any capacity is taken. Prices are
        // resolved server-side; the quote and the reservation read the same
        // rows, so a mismatch here only occurs on a concurrent price edit.
        let retry = self.retry;
        let repo = self.orders.clone();
        let quote_lines = lines.clone();
        let quoted = blocking(move || retry.run(|| repo.quote_total(&quote_lines))).await?;
        let minimum = self.gateway.minimum_charge_minor();
        if quoted > 0 && quoted < minimum {
            return Err(DomainError::InvalidInput(format!(
                "order total {quoted} is below the minimum chargeable amount {minimum}"
            )));
        }

        let repo = self.orders.clone();
        let new_checkout = NewCheckout {
            event_id,
            buyer,
            lines,
            currency: self.config.currency.clone(),
        };
        let order =
            blocking(move || retry.run(|| repo.create_pending(new_checkout.clone()))).await?;

        if order.total_minor == 0 {
            // Free order: no payment leg, finalize straight away.
            let repo = self.orders.clone();
            let order_id = order.id;
            let outcome =
                blocking(move || retry.run(|| repo.mark_paid_and_issue(order_id))).await?;
            let ticket = outcome.ticket().clone();
            let mut order = order;
            order.status = OrderStatus::Paid;
            return Ok(CheckoutOutcome::Completed { order, ticket });
        }

        let request = ChargeRequest {
            order_id: order.id,
            amount_minor: order.total_minor,
            currency: order.currency.clone(),
            email: order.buyer.email.clone(),
        };
        match self.gateway.create_session(&request).await {
            Ok(session) => {
                let repo = self.orders.clone();
                let order_id = order.id;
                let reference = session.reference.clone();
                blocking(move || retry.run(|| repo.record_payment_ref(order_id, &reference)))
                    .await?;
                Ok(CheckoutOutcome::AwaitingPayment { order, session })
            }
            Err(gateway_err) => {
                // No session means nothing to await: release the capacity now
                // so other buyers are not starved. If the release itself
                // fails the abandonment sweep reclaims it later.
                let repo = self.orders.clone();
                let order_id = order.id;
                if let Err(release_err) = blocking(move || {
                    retry.run(|| repo.cancel_pending(order_id, OrderStatus::Cancelled))
                })
                .await
                {
                    log::error!(
                        "order {order_id}: failed to release reservation after gateway error: {release_err}"
                    );
                }
                Err(gateway_err)
            }
        }
    }

    /// Apply an asynchronous payment notification. Success finalizes the
    /// order (idempotently); failure or a closed payment modal cancels it and
    /// releases its reservations.
    pub async fn handle_payment_event(
        &self,
        event: PaymentEvent,
    ) -> Result<PaymentResolution, DomainError> {
        let reference = match &event {
            PaymentEvent::Succeeded { reference }
            | PaymentEvent::Failed { reference }
            | PaymentEvent::Closed { reference } => reference.clone(),
        };
        let retry = self.retry;
        let repo = self.orders.clone();
        let order_id = blocking(move || retry.run(|| repo.find_id_by_payment_ref(&reference)))
            .await?
            .ok_or(DomainError::NotFound)?;

        match event {
            PaymentEvent::Succeeded { .. } => {
                let repo = self.orders.clone();
                let outcome =
                    blocking(move || retry.run(|| repo.mark_paid_and_issue(order_id))).await?;
                Ok(PaymentResolution::Finalized {
                    order_id,
                    ticket: outcome.ticket().clone(),
                })
            }
            PaymentEvent::Failed { .. } => self.cancel(order_id, OrderStatus::Failed).await,
            PaymentEvent::Closed { .. } => self.cancel(order_id, OrderStatus::Cancelled).await,
        }
    }

    async fn cancel(
        &self,
        order_id: Uuid,
        to: OrderStatus,
    ) -> Result<PaymentResolution, DomainError> {
        let retry = self.retry;
        let repo = self.orders.clone();
        let transitioned =
            blocking(move || retry.run(|| repo.cancel_pending(order_id, to))).await?;
        if transitioned {
            Ok(PaymentResolution::Cancelled {
                order_id,
                status: to,
            })
        } else {
            Ok(PaymentResolution::Ignored { order_id })
        }
    }

    /// Reclaim capacity from pending orders whose buyer never completed
    /// payment. Invoked periodically; each reclaimed order follows the same
    /// cancel/release path as an explicit cancellation.
    pub async fn expire_abandoned(&self) -> Result<usize, DomainError> {
        let ttl = chrono::Duration::from_std(self.config.pending_ttl)
            .map_err(|e| DomainError::Internal(format!("invalid pending TTL: {e}")))?;
        let cutoff = Utc::now() - ttl;
        let retry = self.retry;
        let repo = self.orders.clone();
        blocking(move || retry.run(|| repo.expire_pending_before(cutoff))).await
    }

    /// Order lookup together with its issued ticket, if any.
    pub async fn order_with_ticket(
        &self,
        order_id: Uuid,
    ) -> Result<Option<(OrderView, Option<IssuedTicket>)>, DomainError> {
        let retry = self.retry;
        let repo = self.orders.clone();
        blocking(move || {
            let Some(order) = retry.run(|| repo.find_by_id(order_id))? else {
                return Ok(None);
            };
            let ticket = retry.run(|| repo.issued_ticket(order_id))?;
            Ok(Some((order, ticket)))
        })
        .await
    }
}
