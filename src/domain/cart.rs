use uuid::Uuid;

use super::ticket_pool::{ReservationLine, TicketTypeSnapshot};

struct CartLine {
    snapshot: TicketTypeSnapshot,
    selected: i32,
}

/// Client-side order builder: a selected-quantity map over the latest known
/// availability snapshot.
///
/// The cap (`capacity - sold`) is advisory only. The authoritative check is
/// the store's atomic reserve at checkout, so a cart must tolerate a late
/// `InsufficientCapacity` rejection: callers feed the re-fetched snapshots to
/// [`Cart::refresh`], which clamps stale selections back under the new caps.
/// The optimistic selection and its compensation live together here.
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new(snapshots: Vec<TicketTypeSnapshot>) -> Self {
        Cart {
            lines: snapshots
                .into_iter()
                .map(|snapshot| CartLine {
                    snapshot,
                    selected: 0,
                })
                .collect(),
        }
    }

    fn line_mut(&mut self, ticket_type_id: Uuid) -> Option<&mut CartLine> {
        self.lines
            .iter_mut()
            .find(|l| l.snapshot.id == ticket_type_id)
    }

    /// Increase the selection by one. Returns `false` (and leaves the
    /// selection unchanged) once the advisory cap is hit or the type is
    /// unknown.
    pub fn increment(&mut self, ticket_type_id: Uuid) -> bool {
        match self.line_mut(ticket_type_id) {
            Some(line) if line.selected < line.snapshot.remaining() => {
                line.selected += 1;
                true
            }
            _ => false,
        }
    }

    /// Decrease the selection by one, flooring at zero.
    pub fn decrement(&mut self, ticket_type_id: Uuid) -> bool {
        match self.line_mut(ticket_type_id) {
            Some(line) if line.selected > 0 => {
                line.selected -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn quantity(&self, ticket_type_id: Uuid) -> i32 {
        self.lines
            .iter()
            .find(|l| l.snapshot.id == ticket_type_id)
            .map_or(0, |l| l.selected)
    }

    pub fn total_quantity(&self) -> i32 {
        self.lines.iter().map(|l| l.selected).sum()
    }

    pub fn total_minor(&self) -> i64 {
        self.lines
            .iter()
            .map(|l| i64::from(l.selected) * l.snapshot.price_minor)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_quantity() == 0
    }

    /// Non-zero selections as reservation input for checkout.
    pub fn lines(&self) -> Vec<ReservationLine> {
        self.lines
            .iter()
            .filter(|l| l.selected > 0)
            .map(|l| ReservationLine {
                ticket_type_id: l.snapshot.id,
                quantity: l.selected,
            })
            .collect()
    }

    /// Replace the availability snapshots and clamp selections under the new
    /// caps. Called after a rejected checkout so the buyer can adjust and
    /// retry; ticket types missing from the new snapshot are dropped.
    pub fn refresh(&mut self, snapshots: Vec<TicketTypeSnapshot>) {
        let previous: Vec<(Uuid, i32)> = self
            .lines
            .iter()
            .map(|l| (l.snapshot.id, l.selected))
            .collect();
        self.lines = snapshots
            .into_iter()
            .map(|snapshot| {
                let kept = previous
                    .iter()
                    .find(|(id, _)| *id == snapshot.id)
                    .map_or(0, |(_, selected)| *selected);
                let selected = kept.min(snapshot.remaining());
                CartLine { snapshot, selected }
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: Uuid, price_minor: i64, capacity: i32, sold: i32) -> TicketTypeSnapshot {
        TicketTypeSnapshot {
            id,
            event_id: Uuid::new_v4(),
            name: "Regular".to_string(),
            price_minor,
            capacity,
            sold,
        }
    }

    #[test]
    fn increment_caps_at_remaining_capacity() {
        let id = Uuid::new_v4();
        let mut cart = Cart::new(vec![snapshot(id, 500_000, 5, 3)]);
        assert!(cart.increment(id));
        assert!(cart.increment(id));
        // remaining = 2, third increment is a no-op
        assert!(!cart.increment(id));
        assert_eq!(cart.quantity(id), 2);
    }

    #[test]
    fn sold_out_type_is_locked_at_zero() {
        let id = Uuid::new_v4();
        let mut cart = Cart::new(vec![snapshot(id, 500_000, 5, 5)]);
        assert!(!cart.increment(id));
        assert_eq!(cart.quantity(id), 0);
    }

    #[test]
    fn decrement_floors_at_zero() {
        let id = Uuid::new_v4();
        let mut cart = Cart::new(vec![snapshot(id, 500_000, 5, 0)]);
        assert!(!cart.decrement(id));
        assert!(cart.increment(id));
        assert!(cart.decrement(id));
        assert!(!cart.decrement(id));
        assert_eq!(cart.quantity(id), 0);
    }

    #[test]
    fn unknown_ticket_type_is_rejected() {
        let mut cart = Cart::new(vec![]);
        assert!(!cart.increment(Uuid::new_v4()));
        assert!(!cart.decrement(Uuid::new_v4()));
    }

    #[test]
    fn totals_follow_selections() {
        let regular = Uuid::new_v4();
        let vip = Uuid::new_v4();
        let mut cart = Cart::new(vec![
            snapshot(regular, 500_000, 10, 0),
            snapshot(vip, 2_500_000, 10, 0),
        ]);
        cart.increment(regular);
        cart.increment(regular);
        cart.increment(vip);
        assert_eq!(cart.total_quantity(), 3);
        assert_eq!(cart.total_minor(), 3_500_000);
        assert_eq!(cart.lines().len(), 2);
    }

    #[test]
    fn empty_cart_produces_no_lines() {
        let cart = Cart::new(vec![snapshot(Uuid::new_v4(), 500_000, 5, 0)]);
        assert!(cart.is_empty());
        assert!(cart.lines().is_empty());
    }

    #[test]
    fn refresh_clamps_selection_to_new_remaining() {
        let id = Uuid::new_v4();
        let mut cart = Cart::new(vec![snapshot(id, 500_000, 5, 0)]);
        for _ in 0..4 {
            cart.increment(id);
        }
        // Another buyer took most of the pool between snapshot and checkout.
        cart.refresh(vec![snapshot(id, 500_000, 5, 4)]);
        assert_eq!(cart.quantity(id), 1);
    }

    #[test]
    fn refresh_drops_vanished_ticket_types() {
        let id = Uuid::new_v4();
        let mut cart = Cart::new(vec![snapshot(id, 500_000, 5, 0)]);
        cart.increment(id);
        cart.refresh(vec![]);
        assert_eq!(cart.quantity(id), 0);
        assert!(cart.is_empty());
    }
}
