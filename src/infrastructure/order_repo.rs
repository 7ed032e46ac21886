use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::{BuyerContact, OrderItemView, OrderStatus, OrderView};
use crate::domain::ports::{FinalizeOutcome, NewCheckout, OrderRepository};
use crate::domain::redemption::{generate_code, IssuedTicket};
use crate::domain::ticket_pool::ReservationLine;
use crate::schema::{order_items, orders, redemption_tickets, ticket_types};

use super::models::{
    NewOrderItemRow, NewOrderRow, NewRedemptionTicketRow, OrderItemRow, OrderRow,
    RedemptionTicketRow,
};
use super::pool_store::{release_units, reserve_units};

/// Attempts to allocate a unique redemption code before giving up.
const CODE_ALLOCATION_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct DieselOrderRepository {
    pool: DbPool,
}

impl DieselOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_view(order: OrderRow, items: Vec<OrderItemRow>) -> Result<OrderView, DomainError> {
    Ok(OrderView {
        id: order.id,
        event_id: order.event_id,
        status: OrderStatus::parse(&order.status)?,
        total_minor: order.total_minor,
        currency: order.currency,
        buyer: BuyerContact {
            full_name: order.full_name,
            email: order.email,
            phone: order.phone,
            address: order.address,
        },
        items: items
            .into_iter()
            .map(|i| OrderItemView {
                id: i.id,
                ticket_type_id: i.ticket_type_id,
                quantity: i.quantity,
                unit_price_minor: i.unit_price_minor,
            })
            .collect(),
        created_at: order.created_at,
    })
}

fn ticket_view(row: RedemptionTicketRow) -> IssuedTicket {
    IssuedTicket {
        id: row.id,
        order_id: row.order_id,
        code: row.code,
        total_quantity: row.total_quantity,
        scan_count: row.scan_count,
        issued_at: row.issued_at,
    }
}

fn load_view(conn: &mut PgConnection, order_id: Uuid) -> Result<Option<OrderView>, DomainError> {
    let order = orders::table
        .find(order_id)
        .select(OrderRow::as_select())
        .first(conn)
        .optional()?;
    let Some(order) = order else {
        return Ok(None);
    };
    let items = order_items::table
        .filter(order_items::order_id.eq(order.id))
        .select(OrderItemRow::as_select())
        .load(conn)?;
    to_view(order, items).map(Some)
}

/// Issue the redemption ticket for a freshly paid order. Runs inside the
/// finalize transaction; each insert attempt uses a savepoint so a code
/// collision rolls back only the attempt, not the finalize itself.
fn issue_ticket(
    conn: &mut PgConnection,
    order_id: Uuid,
    total_quantity: i32,
) -> Result<RedemptionTicketRow, DomainError> {
    use diesel::result::{DatabaseErrorKind, Error};

    for _ in 0..CODE_ALLOCATION_ATTEMPTS {
        let code = generate_code(&mut rand::thread_rng());
        let attempt = conn.transaction::<_, Error, _>(|conn| {
            diesel::insert_into(redemption_tickets::table)
                .values(&NewRedemptionTicketRow {
                    id: Uuid::new_v4(),
                    order_id,
                    code,
                    total_quantity,
                    scan_count: 0,
                })
                .returning(RedemptionTicketRow::as_returning())
                .get_result(conn)
        });
        match attempt {
            Ok(row) => return Ok(row),
            Err(Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info))
                if info.constraint_name() == Some("redemption_tickets_code_key") =>
            {
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(DomainError::Internal(format!(
        "could not allocate a unique redemption code for order {order_id}"
    )))
}

impl OrderRepository for DieselOrderRepository {
    fn quote_total(&self, lines: &[ReservationLine]) -> Result<i64, DomainError> {
        let mut conn = self.pool.get()?;
        let mut total = 0i64;
        for line in lines {
            let price: i64 = ticket_types::table
                .find(line.ticket_type_id)
                .select(ticket_types::price_minor)
                .first(&mut conn)
                .optional()?
                .ok_or(DomainError::NotFound)?;
            total += price * i64::from(line.quantity);
        }
        Ok(total)
    }

    fn create_pending(&self, checkout: NewCheckout) -> Result<OrderView, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            // Reserve every line first; any failure rolls back the whole
            // transaction, so a multi-item cart is never partially reserved.
            let mut priced_lines = Vec::with_capacity(checkout.lines.len());
            for line in &checkout.lines {
                let (price, tt_event): (i64, Uuid) = ticket_types::table
                    .find(line.ticket_type_id)
                    .select((ticket_types::price_minor, ticket_types::event_id))
                    .first(conn)
                    .optional()?
                    .ok_or(DomainError::NotFound)?;
                if tt_event != checkout.event_id {
                    return Err(DomainError::InvalidInput(
                        "ticket type does not belong to the event".to_string(),
                    ));
                }
                reserve_units(conn, line.ticket_type_id, line.quantity)?;
                priced_lines.push((line.clone(), price));
            }

            let order_id = Uuid::new_v4();
            let total_minor: i64 = priced_lines
                .iter()
                .map(|(line, price)| i64::from(line.quantity) * price)
                .sum();
            diesel::insert_into(orders::table)
                .values(&NewOrderRow {
                    id: order_id,
                    event_id: checkout.event_id,
                    status: OrderStatus::Pending.as_str().to_string(),
                    total_minor,
                    currency: checkout.currency.clone(),
                    full_name: checkout.buyer.full_name.clone(),
                    email: checkout.buyer.email.clone(),
                    phone: checkout.buyer.phone.clone(),
                    address: checkout.buyer.address.clone(),
                })
                .execute(conn)?;

            let item_rows: Vec<NewOrderItemRow> = priced_lines
                .iter()
                .map(|(line, price)| NewOrderItemRow {
                    id: Uuid::new_v4(),
                    order_id,
                    ticket_type_id: line.ticket_type_id,
                    quantity: line.quantity,
                    unit_price_minor: *price,
                })
                .collect();
            diesel::insert_into(order_items::table)
                .values(&item_rows)
                .execute(conn)?;

            load_view(conn, order_id)?.ok_or_else(|| {
                DomainError::Internal("order vanished within its own transaction".to_string())
            })
        })
    }

    fn record_payment_ref(&self, order_id: Uuid, payment_ref: &str) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        let updated = diesel::update(orders::table.find(order_id))
            .set((
                orders::payment_ref.eq(payment_ref),
                orders::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
        if updated == 1 {
            Ok(())
        } else {
            Err(DomainError::NotFound)
        }
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError> {
        let mut conn = self.pool.get()?;
        load_view(&mut conn, id)
    }

    fn find_id_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Uuid>, DomainError> {
        let mut conn = self.pool.get()?;
        Ok(orders::table
            .filter(orders::payment_ref.eq(payment_ref))
            .select(orders::id)
            .first(&mut conn)
            .optional()?)
    }

    fn mark_paid_and_issue(&self, order_id: Uuid) -> Result<FinalizeOutcome, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            // pending → paid exactly once; the affected-row count tells us
            // whether this call won the transition.
            let transitioned = diesel::update(
                orders::table
                    .find(order_id)
                    .filter(orders::status.eq(OrderStatus::Pending.as_str())),
            )
            .set((
                orders::status.eq(OrderStatus::Paid.as_str()),
                orders::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;

            if transitioned == 1 {
                let total_quantity: Option<i64> = order_items::table
                    .filter(order_items::order_id.eq(order_id))
                    .select(diesel::dsl::sum(order_items::quantity))
                    .first(conn)?;
                let total_quantity = i32::try_from(total_quantity.unwrap_or(0))
                    .map_err(|e| DomainError::Internal(e.to_string()))?;
                let row = issue_ticket(conn, order_id, total_quantity)?;
                return Ok(FinalizeOutcome::Issued(ticket_view(row)));
            }

            let status: String = orders::table
                .find(order_id)
                .select(orders::status)
                .first(conn)
                .optional()?
                .ok_or(DomainError::NotFound)?;
            match OrderStatus::parse(&status)? {
                OrderStatus::Paid => {
                    let row = redemption_tickets::table
                        .filter(redemption_tickets::order_id.eq(order_id))
                        .select(RedemptionTicketRow::as_select())
                        .first(conn)
                        .optional()?
                        .ok_or_else(|| {
                            DomainError::Internal(format!(
                                "paid order {order_id} has no redemption ticket"
                            ))
                        })?;
                    Ok(FinalizeOutcome::AlreadyFinalized(ticket_view(row)))
                }
                other => Err(DomainError::Conflict(format!(
                    "cannot finalize order in status {}",
                    other.as_str()
                ))),
            }
        })
    }

    fn cancel_pending(&self, order_id: Uuid, to: OrderStatus) -> Result<bool, DomainError> {
        if !matches!(to, OrderStatus::Failed | OrderStatus::Cancelled) {
            return Err(DomainError::InvalidInput(format!(
                "cannot cancel into status {}",
                to.as_str()
            )));
        }
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let transitioned = diesel::update(
                orders::table
                    .find(order_id)
                    .filter(orders::status.eq(OrderStatus::Pending.as_str())),
            )
            .set((
                orders::status.eq(to.as_str()),
                orders::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;
            if transitioned == 0 {
                return Ok(false);
            }

            let items: Vec<(Uuid, i32)> = order_items::table
                .filter(order_items::order_id.eq(order_id))
                .select((order_items::ticket_type_id, order_items::quantity))
                .load(conn)?;
            for (ticket_type_id, quantity) in items {
                release_units(conn, ticket_type_id, quantity)?;
            }
            Ok(true)
        })
    }

    fn expire_pending_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DomainError> {
        let stale: Vec<Uuid> = {
            let mut conn = self.pool.get()?;
            orders::table
                .filter(orders::status.eq(OrderStatus::Pending.as_str()))
                .filter(orders::created_at.lt(cutoff))
                .select(orders::id)
                .load(&mut conn)?
        };

        // Each order is reclaimed in its own transaction so one failure does
        // not hold back the rest of the sweep.
        let mut reclaimed = 0;
        for order_id in stale {
            match self.cancel_pending(order_id, OrderStatus::Cancelled) {
                Ok(true) => reclaimed += 1,
                Ok(false) => {}
                Err(e) => {
                    log::error!("sweep: failed to reclaim pending order {order_id}: {e}");
                }
            }
        }
        Ok(reclaimed)
    }

    fn issued_ticket(&self, order_id: Uuid) -> Result<Option<IssuedTicket>, DomainError> {
        let mut conn = self.pool.get()?;
        Ok(redemption_tickets::table
            .filter(redemption_tickets::order_id.eq(order_id))
            .select(RedemptionTicketRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(ticket_view))
    }
}
