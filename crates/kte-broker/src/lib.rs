//! Typed broker client (C2, spec §4.2, §6): the HTTP/WS boundary between the
//! engine and the KIS API. Token cache, rate limiting, and retry are handled
//! once here so every caller gets them for free.

pub mod error;
pub mod kis;
pub mod network_health;
pub mod paper_stub;
pub mod quote_stream;
pub mod rate_limiter;
pub mod retry;
pub mod token;
pub mod types;

use async_trait::async_trait;
use kte_domain::{Bar, Symbol};

pub use error::BrokerError;
pub use types::*;

/// Abstract broker operations the core requires (spec §4.2), independent of
/// KIS wire format. Implementations: [`kis::KisBrokerClient`] for PAPER/REAL,
/// [`paper_stub::PaperStubBroker`] for offline simulation and tests.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn get_access_token(&self) -> Result<AccessToken, BrokerError>;

    async fn get_daily_ohlcv(
        &self,
        symbol: &Symbol,
        from: Option<chrono::NaiveDate>,
        to: Option<chrono::NaiveDate>,
    ) -> Result<Vec<Bar>, BrokerError>;

    async fn get_current_price(&self, symbol: &Symbol) -> Result<CurrentPrice, BrokerError>;

    async fn place_order(&self, req: PlaceOrderRequest) -> Result<PlaceOrderResponse, BrokerError>;

    async fn cancel_order(&self, order_no: &str) -> Result<(), BrokerError>;

    async fn get_order_status(&self, order_no: Option<&str>) -> Result<Vec<ExecutedOrder>, BrokerError>;

    async fn wait_for_execution(
        &self,
        order_no: &str,
        expected_qty: u64,
        timeout: std::time::Duration,
        poll_interval: std::time::Duration,
    ) -> Result<WaitForExecutionResult, BrokerError>;

    async fn get_account_balance(&self) -> Result<AccountBalance, BrokerError>;

    fn mode(&self) -> Mode;

    /// Whether transport failures have been continuous for ≥60s right now
    /// (spec §4.9 step 6). Adapters with no transport to fail over — the
    /// paper stub — report `false` unconditionally.
    fn network_unavailable(&self) -> bool {
        false
    }
}

/// Shared `waitForExecution` polling loop (spec §4.2): polls
/// `get_order_status` until `remaining_qty == 0`, or issues `cancel_order` on
/// timeout and reports PARTIAL/CANCELLED accordingly. Implemented once here
/// so every [`BrokerClient`] gets identical semantics; adapters call this
/// from their `wait_for_execution` method.
pub async fn poll_until_filled_or_timeout(
    client: &dyn BrokerClient,
    order_no: &str,
    _expected_qty: u64,
    timeout: std::time::Duration,
    poll_interval: std::time::Duration,
) -> Result<WaitForExecutionResult, BrokerError> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let statuses = client.get_order_status(Some(order_no)).await?;
        let status = statuses.into_iter().find(|s| s.order_no == order_no);

        if let Some(status) = &status {
            if status.remaining_qty == 0 && status.filled_qty > 0 {
                return Ok(WaitForExecutionResult {
                    status: WaitOutcome::Filled,
                    exec_qty: status.filled_qty,
                    exec_price: status.avg_price,
                    fills: vec![status.clone()],
                });
            }
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            return match status {
                Some(status) if status.filled_qty > 0 => {
                    client.cancel_order(order_no).await?;
                    Ok(WaitForExecutionResult {
                        status: WaitOutcome::Partial,
                        exec_qty: status.filled_qty,
                        exec_price: status.avg_price,
                        fills: vec![status],
                    })
                }
                _ => {
                    client.cancel_order(order_no).await?;
                    Ok(WaitForExecutionResult {
                        status: WaitOutcome::Cancelled,
                        exec_qty: 0,
                        exec_price: kte_domain::Money::ZERO,
                        fills: status.into_iter().collect(),
                    })
                }
            };
        }

        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}
