use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::ports::TicketPoolStore;
use crate::errors::AppError;
use crate::infrastructure::pool_store::DieselTicketPoolStore;

#[derive(Debug, Serialize, ToSchema)]
pub struct TicketTypeResponse {
    pub id: Uuid,
    pub name: String,
    pub price_minor: i64,
    pub capacity: i32,
    pub sold: i32,
    pub remaining: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AvailabilityResponse {
    pub event_id: Uuid,
    pub ticket_types: Vec<TicketTypeResponse>,
}

/// GET /events/{id}/availability
///
/// Eventually-consistent counters for display. Quantity selectors clamp to
/// `remaining`; the authoritative check still happens at checkout.
#[utoipa::path(
    get,
    path = "/events/{id}/availability",
    params(
        ("id" = Uuid, Path, description = "Event UUID"),
    ),
    responses(
        (status = 200, description = "Ticket availability snapshot", body = AvailabilityResponse),
        (status = 500, description = "Internal server error"),
    ),
    tag = "events"
)]
pub async fn event_availability(
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let event_id = path.into_inner();

    let snapshots = web::block(move || {
        let store = DieselTicketPoolStore::new(pool.get_ref().clone());
        store.availability(event_id)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(AvailabilityResponse {
        event_id,
        ticket_types: snapshots
            .into_iter()
            .map(|s| {
                let remaining = s.remaining();
                TicketTypeResponse {
                    id: s.id,
                    name: s.name,
                    price_minor: s.price_minor,
                    capacity: s.capacity,
                    sold: s.sold,
                    remaining,
                }
            })
            .collect(),
    }))
}
