pub mod availability;
pub mod checkout;
pub mod payments;
pub mod verify;

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        availability::event_availability,
        checkout::create_checkout,
        checkout::get_order,
        payments::payment_webhook,
        verify::verify_ticket,
    ),
    components(schemas(
        availability::AvailabilityResponse,
        availability::TicketTypeResponse,
        checkout::CheckoutRequest,
        checkout::CheckoutItemRequest,
        checkout::CheckoutResponse,
        checkout::PaymentSessionResponse,
        checkout::TicketResponse,
        checkout::OrderResponse,
        checkout::OrderItemResponse,
        payments::PaymentWebhookRequest,
        payments::PaymentWebhookResponse,
        verify::VerifyRequest,
        verify::VerifyResponse,
    )),
    tags(
        (name = "events", description = "Availability snapshots"),
        (name = "checkout", description = "Cart checkout and order lookup"),
        (name = "payments", description = "Payment collaborator notifications"),
        (name = "admin", description = "Gate-side ticket verification"),
    )
)]
pub struct ApiDoc;
