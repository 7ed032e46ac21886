use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::ports::TicketPoolStore;
use crate::domain::ticket_pool::TicketTypeSnapshot;
use crate::schema::ticket_types;

use super::models::TicketTypeRow;

/// Conditional increment of the sold counter. The capacity check and the
/// update are one statement, so concurrent callers serialize on the row lock
/// and the lost-update anomaly cannot occur.
pub(crate) fn reserve_units(
    conn: &mut PgConnection,
    ticket_type_id: Uuid,
    quantity: i32,
) -> Result<(), DomainError> {
    if quantity <= 0 {
        return Err(DomainError::InvalidInput(
            "reserve quantity must be positive".to_string(),
        ));
    }
    let updated = diesel::update(
        ticket_types::table
            .filter(ticket_types::id.eq(ticket_type_id))
            .filter(ticket_types::sold.le(ticket_types::capacity - quantity)),
    )
    .set((
        ticket_types::sold.eq(ticket_types::sold + quantity),
        ticket_types::updated_at.eq(Utc::now()),
    ))
    .execute(conn)?;
    if updated == 1 {
        return Ok(());
    }
    let exists: bool = diesel::select(diesel::dsl::exists(
        ticket_types::table.filter(ticket_types::id.eq(ticket_type_id)),
    ))
    .get_result(conn)?;
    if exists {
        Err(DomainError::InsufficientCapacity { ticket_type_id })
    } else {
        Err(DomainError::NotFound)
    }
}

/// Conditional decrement, the exact inverse of a successful reservation.
/// The `sold >= quantity` guard keeps the counter from going below zero; a
/// release that exceeds the sold count indicates a double release and is
/// surfaced, not clamped.
pub(crate) fn release_units(
    conn: &mut PgConnection,
    ticket_type_id: Uuid,
    quantity: i32,
) -> Result<(), DomainError> {
    if quantity <= 0 {
        return Err(DomainError::InvalidInput(
            "release quantity must be positive".to_string(),
        ));
    }
    let updated = diesel::update(
        ticket_types::table
            .filter(ticket_types::id.eq(ticket_type_id))
            .filter(ticket_types::sold.ge(quantity)),
    )
    .set((
        ticket_types::sold.eq(ticket_types::sold - quantity),
        ticket_types::updated_at.eq(Utc::now()),
    ))
    .execute(conn)?;
    if updated == 1 {
        return Ok(());
    }
    let exists: bool = diesel::select(diesel::dsl::exists(
        ticket_types::table.filter(ticket_types::id.eq(ticket_type_id)),
    ))
    .get_result(conn)?;
    if exists {
        Err(DomainError::Internal(format!(
            "release of {quantity} units would drive ticket type {ticket_type_id} below zero"
        )))
    } else {
        Err(DomainError::NotFound)
    }
}

#[derive(Clone)]
pub struct DieselTicketPoolStore {
    pool: DbPool,
}

impl DieselTicketPoolStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl TicketPoolStore for DieselTicketPoolStore {
    fn reserve(&self, ticket_type_id: Uuid, quantity: i32) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        reserve_units(&mut conn, ticket_type_id, quantity)
    }

    fn release(&self, ticket_type_id: Uuid, quantity: i32) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        release_units(&mut conn, ticket_type_id, quantity)
    }

    fn availability(&self, event_id: Uuid) -> Result<Vec<TicketTypeSnapshot>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows = ticket_types::table
            .filter(ticket_types::event_id.eq(event_id))
            .order(ticket_types::created_at.asc())
            .select(TicketTypeRow::as_select())
            .load(&mut conn)?;
        Ok(rows
            .into_iter()
            .map(|r| TicketTypeSnapshot {
                id: r.id,
                event_id: r.event_id,
                name: r.name,
                price_minor: r.price_minor,
                capacity: r.capacity,
                sold: r.sold,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::testutil::{seed_event, seed_ticket_type, setup_db, sold_count};

    #[tokio::test]
    async fn reserve_succeeds_until_capacity_is_exhausted() {
        let (_container, pool) = setup_db().await;
        let event_id = seed_event(&pool, "Comedy Special");
        let tt = seed_ticket_type(&pool, event_id, "Regular", 500_000, 3);
        let store = DieselTicketPoolStore::new(pool.clone());

        store.reserve(tt, 2).expect("first reserve failed");
        store.reserve(tt, 1).expect("second reserve failed");
        let result = store.reserve(tt, 1);
        assert!(matches!(
            result,
            Err(DomainError::InsufficientCapacity { ticket_type_id }) if ticket_type_id == tt
        ));
        assert_eq!(sold_count(&pool, tt), 3);
    }

    #[tokio::test]
    async fn oversized_reserve_is_rejected_whole() {
        let (_container, pool) = setup_db().await;
        let event_id = seed_event(&pool, "Comedy Special");
        let tt = seed_ticket_type(&pool, event_id, "Regular", 500_000, 5);
        let store = DieselTicketPoolStore::new(pool.clone());

        let result = store.reserve(tt, 6);
        assert!(matches!(
            result,
            Err(DomainError::InsufficientCapacity { .. })
        ));
        assert_eq!(sold_count(&pool, tt), 0);
    }

    #[tokio::test]
    async fn reserve_unknown_ticket_type_is_not_found() {
        let (_container, pool) = setup_db().await;
        let store = DieselTicketPoolStore::new(pool);
        assert!(matches!(
            store.reserve(Uuid::new_v4(), 1),
            Err(DomainError::NotFound)
        ));
    }

    #[tokio::test]
    async fn release_is_the_exact_inverse_of_reserve() {
        let (_container, pool) = setup_db().await;
        let event_id = seed_event(&pool, "Comedy Special");
        let tt = seed_ticket_type(&pool, event_id, "Regular", 500_000, 10);
        let store = DieselTicketPoolStore::new(pool.clone());

        store.reserve(tt, 4).expect("reserve failed");
        store.release(tt, 4).expect("release failed");
        assert_eq!(sold_count(&pool, tt), 0);
    }

    #[tokio::test]
    async fn release_never_drives_sold_below_zero() {
        let (_container, pool) = setup_db().await;
        let event_id = seed_event(&pool, "Comedy Special");
        let tt = seed_ticket_type(&pool, event_id, "Regular", 500_000, 10);
        let store = DieselTicketPoolStore::new(pool.clone());

        store.reserve(tt, 1).expect("reserve failed");
        let result = store.release(tt, 2);
        assert!(matches!(result, Err(DomainError::Internal(_))));
        assert_eq!(sold_count(&pool, tt), 1);
    }

    #[tokio::test]
    async fn concurrent_single_unit_reserves_never_oversell() {
        let (_container, pool) = setup_db().await;
        let event_id = seed_event(&pool, "Comedy Special");
        let capacity = 5;
        let tt = seed_ticket_type(&pool, event_id, "Regular", 500_000, capacity);

        let contenders = 8;
        let handles: Vec<_> = (0..contenders)
            .map(|_| {
                let store = DieselTicketPoolStore::new(pool.clone());
                std::thread::spawn(move || store.reserve(tt, 1))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(DomainError::InsufficientCapacity { .. })))
            .count();
        assert_eq!(succeeded, capacity as usize);
        assert_eq!(rejected, contenders - capacity as usize);
        assert_eq!(sold_count(&pool, tt), capacity);
    }

    #[tokio::test]
    async fn availability_reports_current_counters() {
        let (_container, pool) = setup_db().await;
        let event_id = seed_event(&pool, "Comedy Special");
        let regular = seed_ticket_type(&pool, event_id, "Regular", 500_000, 10);
        let _vip = seed_ticket_type(&pool, event_id, "VIP", 2_500_000, 5);
        let store = DieselTicketPoolStore::new(pool.clone());

        store.reserve(regular, 3).expect("reserve failed");
        let snapshots = store.availability(event_id).expect("availability failed");
        assert_eq!(snapshots.len(), 2);
        let regular_snapshot = snapshots.iter().find(|s| s.id == regular).unwrap();
        assert_eq!(regular_snapshot.sold, 3);
        assert_eq!(regular_snapshot.remaining(), 7);
    }
}
