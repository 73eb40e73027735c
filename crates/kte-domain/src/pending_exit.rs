//! `PendingExit` — a sticky retry record for exits blocked by market closure
//! (spec §3, §4.9, scenario S6).

use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExitReason {
    AtrStop,
    AtrTakeProfit,
    GapProtection,
    TrailingStop,
    TrendReversal,
    KillSwitch,
}

impl ExitReason {
    pub fn code(&self) -> &'static str {
        match self {
            ExitReason::AtrStop => "ATR_STOP_LOSS",
            ExitReason::AtrTakeProfit => "ATR_TAKE_PROFIT",
            ExitReason::GapProtection => "GAP_PROTECTION",
            ExitReason::TrailingStop => "TRAILING_STOP",
            ExitReason::TrendReversal => "TREND_REVERSAL",
            ExitReason::KillSwitch => "KILL_SWITCH",
        }
    }

    /// Exit reasons treated as emergency (may attempt during CLOSE_AUCTION,
    /// get a 3x timeout) per spec §4.7/§4.9.
    pub fn is_emergency(&self) -> bool {
        matches!(
            self,
            ExitReason::AtrStop | ExitReason::GapProtection | ExitReason::KillSwitch
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PendingExit {
    pub symbol: Symbol,
    pub exit_reason: ExitReason,
    pub reason_code: String,
    pub retry_key: String,
    pub next_retry_at: DateTime<Utc>,
    pub last_error: String,
    pub updated_at: DateTime<Utc>,
}

impl PendingExit {
    pub fn new(
        symbol: Symbol,
        exit_reason: ExitReason,
        reason_code: impl Into<String>,
        next_retry_at: DateTime<Utc>,
        last_error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let reason_code = reason_code.into();
        let retry_key = compute_retry_key(&symbol, exit_reason, &reason_code);
        PendingExit {
            symbol,
            exit_reason,
            reason_code,
            retry_key,
            next_retry_at,
            last_error: last_error.into(),
            updated_at: now,
        }
    }

    /// A pending exit is stale (must be dropped on load) once it is older
    /// than `max_age`, per spec §3.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now.signed_duration_since(self.updated_at) > max_age
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_retry_at
    }
}

fn compute_retry_key(symbol: &Symbol, reason: ExitReason, reason_code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(symbol.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(reason.code().as_bytes());
    hasher.update(b"|");
    hasher.update(reason_code.as_bytes());
    hex::encode(hasher.finalize())
}
