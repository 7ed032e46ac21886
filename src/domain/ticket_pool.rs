use uuid::Uuid;

/// Point-in-time view of a ticket pool, as read for display purposes.
///
/// Snapshots are eventually consistent and advisory only: the authoritative
/// capacity check happens inside the store's atomic reserve operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketTypeSnapshot {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    /// Price in the smallest currency unit; 0 means free admission.
    pub price_minor: i64,
    pub capacity: i32,
    pub sold: i32,
}

impl TicketTypeSnapshot {
    pub fn remaining(&self) -> i32 {
        (self.capacity - self.sold).max(0)
    }

    pub fn sold_out(&self) -> bool {
        self.remaining() == 0
    }
}

/// One line of a reservation request: a ticket type and how many units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationLine {
    pub ticket_type_id: Uuid,
    pub quantity: i32,
}
