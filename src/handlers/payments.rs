use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::checkout::PaymentResolution;
use crate::domain::ports::PaymentEvent;
use crate::errors::AppError;
use crate::AppCheckout;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentWebhookRequest {
    pub reference: String,
    /// Provider status: "success", "failed", or "closed".
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentWebhookResponse {
    pub order_id: Uuid,
    pub result: String,
}

/// POST /payments/webhook
///
/// Asynchronous notification from the payment collaborator. Success
/// finalizes the order idempotently; failure or an abandoned payment modal
/// cancels it and releases its reservations.
#[utoipa::path(
    post,
    path = "/payments/webhook",
    request_body = PaymentWebhookRequest,
    responses(
        (status = 200, description = "Notification applied", body = PaymentWebhookResponse),
        (status = 400, description = "Unknown payment status"),
        (status = 404, description = "Unknown payment reference"),
    ),
    tag = "payments"
)]
pub async fn payment_webhook(
    svc: web::Data<AppCheckout>,
    body: web::Json<PaymentWebhookRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let event = match body.status.as_str() {
        "success" => PaymentEvent::Succeeded {
            reference: body.reference,
        },
        "failed" => PaymentEvent::Failed {
            reference: body.reference,
        },
        "closed" | "cancelled" => PaymentEvent::Closed {
            reference: body.reference,
        },
        other => {
            return Err(AppError::Validation(format!(
                "unknown payment status '{other}'"
            )))
        }
    };

    let response = match svc.handle_payment_event(event).await? {
        PaymentResolution::Finalized { order_id, .. } => PaymentWebhookResponse {
            order_id,
            result: "finalized".to_string(),
        },
        PaymentResolution::Cancelled { order_id, status } => PaymentWebhookResponse {
            order_id,
            result: status.as_str().to_string(),
        },
        PaymentResolution::Ignored { order_id } => PaymentWebhookResponse {
            order_id,
            result: "ignored".to_string(),
        },
    };
    Ok(HttpResponse::Ok().json(response))
}
