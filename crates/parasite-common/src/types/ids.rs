//! Time-ordered identifiers
//!
//! Proposals and mutations use UUIDv7 ids so that sorting by id equals sorting
//! by creation time. Ids minted within the same millisecond are forced to be
//! strictly increasing within the process.

use lazy_static::lazy_static;
use parking_lot::Mutex;
use uuid::Uuid;

lazy_static! {
    static ref LAST_ID: Mutex<u128> = Mutex::new(0);
}

/// Mint a new UUIDv7 that is strictly greater than every id minted before it
pub fn next_time_ordered_id() -> Uuid {
    let candidate = Uuid::now_v7().as_u128();
    let mut last = LAST_ID.lock();
    let next = if candidate > *last { candidate } else { *last + 1 };
    *last = next;
    Uuid::from_u128(next)
}
