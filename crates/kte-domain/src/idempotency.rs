//! Idempotency key derivation (spec §3).
//!
//! `idempotency_key = SHA-256(mode|side|symbol|requested_qty|signal_id)`,
//! where `signal_id` encodes `symbol:side:price:YYYYMMDDHHMM`. Two calls
//! within the same minute with identical intent collide by design — this is
//! what makes the order synchronizer at-most-once per key (property 4).

use crate::order_state::{Mode, Side};
use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Builds the `signal_id` string: `symbol:side:price:YYYYMMDDHHMM`.
/// `price_minor` is the Money minor-unit value (already quantized).
pub fn signal_id(symbol: &Symbol, side: Side, price_minor: i64, at: DateTime<Utc>) -> String {
    format!(
        "{}:{}:{}:{}",
        symbol.as_str(),
        side.as_str(),
        price_minor,
        at.format("%Y%m%d%H%M")
    )
}

pub fn idempotency_key(
    mode: Mode,
    side: Side,
    symbol: &Symbol,
    requested_qty: i64,
    signal_id: &str,
) -> String {
    let mut hasher = Sha256::new();
    let joined = format!(
        "{}|{}|{}|{}|{}",
        mode.as_str(),
        side.as_str(),
        symbol.as_str(),
        requested_qty,
        signal_id
    );
    hasher.update(joined.as_bytes());
    hex::encode(hasher.finalize())
}
