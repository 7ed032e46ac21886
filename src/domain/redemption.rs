use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

/// Length of a redemption code, e.g. "A1B2C3D4E5F6".
pub const CODE_LEN: usize = 12;

/// Unambiguous alphabet: no 0/O or 1/I, so codes survive being read aloud
/// or typed from a printed ticket.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate an opaque, unguessable redemption code.
///
/// Uniqueness is enforced by the database unique index; callers retry with a
/// fresh code on collision.
pub fn generate_code<R: Rng>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Credentials authorizing gate-side redemption calls. Passed explicitly into
/// every verify call rather than looked up from ambient storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorCredentials {
    pub token: String,
}

/// The admission token issued when an order is paid. One code per order;
/// `total_quantity` is the number of admits the code authorizes.
#[derive(Debug, Clone)]
pub struct IssuedTicket {
    pub id: Uuid,
    pub order_id: Uuid,
    pub code: String,
    pub total_quantity: i32,
    pub scan_count: i32,
    pub issued_at: DateTime<Utc>,
}

impl IssuedTicket {
    pub fn fully_used(&self) -> bool {
        self.scan_count >= self.total_quantity
    }
}

/// Context returned with every resolved scan so gate staff can see who and
/// what they are admitting, whether or not the scan was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub scan_count: i32,
    pub total_quantity: i32,
    pub holder_name: String,
    pub event_title: String,
}

impl ScanRecord {
    pub fn fully_used(&self) -> bool {
        self.scan_count >= self.total_quantity
    }
}

/// Outcome of a verification attempt. These are resolved results, never
/// errors: an exhausted or unknown code is a terminal answer for that scan,
/// not a fault to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The scan was counted; the record reflects the post-increment state.
    Valid(ScanRecord),
    /// All admits already consumed. No mutation was performed.
    AlreadyUsed(ScanRecord),
    /// No ticket carries this code. No mutation was performed.
    UnknownCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_has_expected_length() {
        let code = generate_code(&mut rand::thread_rng());
        assert_eq!(code.len(), CODE_LEN);
    }

    #[test]
    fn code_only_uses_unambiguous_alphabet() {
        let code = generate_code(&mut rand::thread_rng());
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        assert!(!code.contains('0'));
        assert!(!code.contains('O'));
        assert!(!code.contains('1'));
        assert!(!code.contains('I'));
    }

    #[test]
    fn consecutive_codes_differ() {
        let mut rng = rand::thread_rng();
        let a = generate_code(&mut rng);
        let b = generate_code(&mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn ticket_fully_used_when_scans_reach_quantity() {
        let record = ScanRecord {
            scan_count: 3,
            total_quantity: 3,
            holder_name: "Alex Johnson".to_string(),
            event_title: "Comedy Special".to_string(),
        };
        assert!(record.fully_used());
        let partial = ScanRecord {
            scan_count: 2,
            ..record
        };
        assert!(!partial.fully_used());
    }
}
