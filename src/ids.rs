use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use uuid::Uuid;

/// Length of every generated id, in hex characters
#[cfg(test)]
pub const ID_LEN: usize = 32;

static FALLBACK_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generate a new todo id: 128 random bits as lowercase hex.
///
/// Never fails. When the OS entropy source is unavailable the id is derived
/// from the clock instead, which is only unique within this process.
pub fn new_id() -> String {
    let mut bytes = [0u8; 16];
    match getrandom::fill(&mut bytes) {
        Ok(()) => Uuid::from_bytes(bytes).simple().to_string(),
        Err(err) => {
            tracing::warn!(
                "Entropy source unavailable ({}), using timestamp id without global uniqueness",
                err
            );
            fallback_id()
        }
    }
}

/// Nanosecond timestamp in the high bits, a process-wide counter in the low 32
fn fallback_id() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
    let counter = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);
    let value = (u128::from(nanos) << 32) | u128::from(counter);
    Uuid::from_u128(value).simple().to_string()
}
