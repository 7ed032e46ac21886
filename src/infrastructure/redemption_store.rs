use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::ports::RedemptionStore;
use crate::domain::redemption::{ScanRecord, VerifyOutcome};
use crate::schema::{events, orders, redemption_tickets};

use super::models::RedemptionTicketRow;

#[derive(Clone)]
pub struct DieselRedemptionStore {
    pool: DbPool,
}

impl DieselRedemptionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Holder name and event title for operator display, shown on accepted and
/// rejected scans alike.
fn scan_context(conn: &mut PgConnection, order_id: Uuid) -> Result<(String, String), DomainError> {
    let (holder_name, event_title) = orders::table
        .inner_join(events::table)
        .filter(orders::id.eq(order_id))
        .select((orders::full_name, events::title))
        .first(conn)?;
    Ok((holder_name, event_title))
}

impl RedemptionStore for DieselRedemptionStore {
    /// The capacity check and the increment are a single conditional UPDATE;
    /// Postgres row locking serializes concurrent scanners on the same code,
    /// so two racing scans cannot both consume the last admit. A zero-row
    /// result is then split into "unknown code" and "already exhausted",
    /// neither of which mutates anything.
    fn verify(&self, code: &str) -> Result<VerifyOutcome, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let counted: Option<RedemptionTicketRow> = diesel::update(
                redemption_tickets::table
                    .filter(redemption_tickets::code.eq(code))
                    .filter(
                        redemption_tickets::scan_count.lt(redemption_tickets::total_quantity),
                    ),
            )
            .set((
                redemption_tickets::scan_count.eq(redemption_tickets::scan_count + 1),
                redemption_tickets::last_scanned_at.eq(Utc::now()),
            ))
            .returning(RedemptionTicketRow::as_returning())
            .get_result(conn)
            .optional()?;

            if let Some(row) = counted {
                let (holder_name, event_title) = scan_context(conn, row.order_id)?;
                return Ok(VerifyOutcome::Valid(ScanRecord {
                    scan_count: row.scan_count,
                    total_quantity: row.total_quantity,
                    holder_name,
                    event_title,
                }));
            }

            let existing: Option<RedemptionTicketRow> = redemption_tickets::table
                .filter(redemption_tickets::code.eq(code))
                .select(RedemptionTicketRow::as_select())
                .first(conn)
                .optional()?;
            match existing {
                None => Ok(VerifyOutcome::UnknownCode),
                Some(row) => {
                    let (holder_name, event_title) = scan_context(conn, row.order_id)?;
                    Ok(VerifyOutcome::AlreadyUsed(ScanRecord {
                        scan_count: row.scan_count,
                        total_quantity: row.total_quantity,
                        holder_name,
                        event_title,
                    }))
                }
            }
        })
    }
}
