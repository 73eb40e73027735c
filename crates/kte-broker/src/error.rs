//! The broker-facing error taxonomy (spec §7). Hand-rolled `Display` + `Error`
//! impls, matching the teacher's `mqk-execution::gateway::GateRefusal`
//! pattern rather than pulling in a derive-macro error crate.

use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum BrokerError {
    /// Retryable at the client (§4.2 backoff): connection reset, timeout,
    /// 5xx, DNS failure.
    Transport(String),
    /// Token expired or rejected; the client retries once with a forced
    /// refresh before surfacing this.
    Auth(String),
    /// The broker rejected an order outright; not retryable.
    Reject(String),
    /// The broker refused because the market is closed.
    MarketClosed,
    /// The requested resource does not exist (order_no, symbol).
    NotFound(String),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::Transport(msg) => write!(f, "transport error: {msg}"),
            BrokerError::Auth(msg) => write!(f, "auth error: {msg}"),
            BrokerError::Reject(msg) => write!(f, "order rejected: {msg}"),
            BrokerError::MarketClosed => write!(f, "market closed"),
            BrokerError::NotFound(msg) => write!(f, "not found: {msg}"),
        }
    }
}

impl std::error::Error for BrokerError {}

impl BrokerError {
    /// HTTP 4xx responses are never retried (spec §4.2); 5xx and transport-
    /// level failures are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrokerError::Transport(_))
    }
}
