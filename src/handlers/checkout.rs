use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::checkout::CheckoutOutcome;
use crate::domain::order::{BuyerContact, OrderView};
use crate::domain::redemption::IssuedTicket;
use crate::domain::ticket_pool::ReservationLine;
use crate::errors::AppError;
use crate::AppCheckout;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutItemRequest {
    pub ticket_type_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub event_id: Uuid,
    pub items: Vec<CheckoutItemRequest>,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentSessionResponse {
    pub reference: String,
    pub authorization_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TicketResponse {
    pub code: String,
    pub total_quantity: i32,
    pub scan_count: i32,
    pub fully_used: bool,
}

impl From<IssuedTicket> for TicketResponse {
    fn from(ticket: IssuedTicket) -> Self {
        TicketResponse {
            fully_used: ticket.fully_used(),
            code: ticket.code,
            total_quantity: ticket.total_quantity,
            scan_count: ticket.scan_count,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub status: String,
    pub total_minor: i64,
    pub currency: String,
    /// Present unless the order was free and finalized immediately.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentSessionResponse>,
    /// Present only for free orders, which skip the payment leg.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<TicketResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub ticket_type_id: Uuid,
    pub quantity: i32,
    pub unit_price_minor: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub event_id: Uuid,
    pub status: String,
    pub total_minor: i64,
    pub currency: String,
    pub full_name: String,
    pub email: String,
    pub items: Vec<OrderItemResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<TicketResponse>,
    pub created_at: String,
}

fn order_response(order: OrderView, ticket: Option<IssuedTicket>) -> OrderResponse {
    OrderResponse {
        id: order.id,
        event_id: order.event_id,
        status: order.status.as_str().to_string(),
        total_minor: order.total_minor,
        currency: order.currency,
        full_name: order.buyer.full_name,
        email: order.buyer.email,
        items: order
            .items
            .into_iter()
            .map(|i| OrderItemResponse {
                ticket_type_id: i.ticket_type_id,
                quantity: i.quantity,
                unit_price_minor: i.unit_price_minor,
            })
            .collect(),
        ticket: ticket.map(TicketResponse::from),
        created_at: order.created_at.to_rfc3339(),
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /checkout
///
/// Reserves capacity for every line item and creates the pending order
/// atomically. Paid orders come back with a payment session to redirect the
/// buyer to; free orders are finalized on the spot and come back with their
/// admission ticket.
#[utoipa::path(
    post,
    path = "/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created", body = CheckoutResponse),
        (status = 400, description = "Invalid cart"),
        (status = 409, description = "Insufficient capacity"),
        (status = 502, description = "Payment gateway error"),
    ),
    tag = "checkout"
)]
pub async fn create_checkout(
    svc: web::Data<AppCheckout>,
    body: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let buyer = BuyerContact {
        full_name: body.full_name,
        email: body.email,
        phone: body.phone,
        address: body.address,
    };
    let lines: Vec<ReservationLine> = body
        .items
        .iter()
        .map(|i| ReservationLine {
            ticket_type_id: i.ticket_type_id,
            quantity: i.quantity,
        })
        .collect();

    let outcome = svc.checkout(body.event_id, buyer, lines).await?;
    let response = match outcome {
        CheckoutOutcome::AwaitingPayment { order, session } => CheckoutResponse {
            order_id: order.id,
            status: order.status.as_str().to_string(),
            total_minor: order.total_minor,
            currency: order.currency,
            payment: Some(PaymentSessionResponse {
                reference: session.reference,
                authorization_url: session.authorization_url,
            }),
            ticket: None,
        },
        CheckoutOutcome::Completed { order, ticket } => CheckoutResponse {
            order_id: order.id,
            status: order.status.as_str().to_string(),
            total_minor: order.total_minor,
            currency: order.currency,
            payment: None,
            ticket: Some(TicketResponse::from(ticket)),
        },
    };
    Ok(HttpResponse::Created().json(response))
}

/// GET /orders/{id}
///
/// The order with its items, plus the admission ticket once paid (the code is
/// what buyers render as their QR).
#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found"),
    ),
    tag = "checkout"
)]
pub async fn get_order(
    svc: web::Data<AppCheckout>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    match svc.order_with_ticket(order_id).await? {
        Some((order, ticket)) => Ok(HttpResponse::Ok().json(order_response(order, ticket))),
        None => Err(AppError::NotFound),
    }
}
