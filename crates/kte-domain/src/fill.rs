//! `Fill` — an executed portion of an order (spec §3, §4.7).

use crate::money::Money;
use crate::order_state::Side;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fill {
    pub order_no: String,
    pub exec_id: Option<String>,
    pub executed_at: DateTime<Utc>,
    pub price: Money,
    pub qty: i64,
    pub side: Side,
}

impl Fill {
    /// Dedup key per spec §3: `exec_id` when present, else
    /// `(order_no, executed_at, price, qty)`.
    pub fn dedup_key(&self, mode: &str, symbol: &str) -> String {
        let mut hasher = Sha256::new();
        match &self.exec_id {
            Some(exec_id) => {
                hasher.update(mode.as_bytes());
                hasher.update(b"|");
                hasher.update(symbol.as_bytes());
                hasher.update(b"|");
                hasher.update(self.side.as_str().as_bytes());
                hasher.update(b"|");
                hasher.update(self.order_no.as_bytes());
                hasher.update(b"|exec:");
                hasher.update(exec_id.as_bytes());
            }
            None => {
                hasher.update(mode.as_bytes());
                hasher.update(b"|");
                hasher.update(symbol.as_bytes());
                hasher.update(b"|");
                hasher.update(self.side.as_str().as_bytes());
                hasher.update(b"|");
                hasher.update(self.order_no.as_bytes());
                hasher.update(b"|tuple:");
                hasher.update(self.executed_at.timestamp_millis().to_string().as_bytes());
                hasher.update(b",");
                hasher.update(self.price.minor().to_string().as_bytes());
                hasher.update(b",");
                hasher.update(self.qty.to_string().as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(exec_id: Option<&str>) -> Fill {
        Fill {
            order_no: "ord-1".into(),
            exec_id: exec_id.map(|s| s.to_string()),
            executed_at: Utc::now(),
            price: Money::from_major(70_000),
            qty: 6,
            side: Side::Buy,
        }
    }

    #[test]
    fn same_exec_id_dedupes_identically() {
        let f1 = fill(Some("e1"));
        let f2 = fill(Some("e1"));
        assert_eq!(f1.dedup_key("PAPER", "005930"), f2.dedup_key("PAPER", "005930"));
    }

    #[test]
    fn missing_exec_id_falls_back_to_tuple() {
        let f1 = fill(None);
        let mut f2 = fill(None);
        f2.executed_at = f1.executed_at;
        assert_eq!(f1.dedup_key("PAPER", "005930"), f2.dedup_key("PAPER", "005930"));
    }

    #[test]
    fn different_qty_without_exec_id_differs() {
        let f1 = fill(None);
        let mut f2 = fill(None);
        f2.executed_at = f1.executed_at;
        f2.qty = 4;
        assert_ne!(f1.dedup_key("PAPER", "005930"), f2.dedup_key("PAPER", "005930"));
    }
}
