//! REAL-mode pre-trade countdown warning (spec §4.11): the last chance for
//! an operator watching the console to Ctrl-C before the first REAL order
//! can be placed.

use std::time::Duration;

pub const REAL_MODE_COUNTDOWN_SECS: u64 = 10;

/// Warns once per second, counting down from `seconds`.
pub async fn countdown_before_real_trading(seconds: u64) {
    for remaining in (1..=seconds).rev() {
        tracing::warn!(remaining, "REAL trading starts in {remaining}s — Ctrl-C to abort");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn counts_down_the_full_duration() {
        let start = tokio::time::Instant::now();
        countdown_before_real_trading(10).await;
        assert_eq!(tokio::time::Instant::now() - start, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_seconds_returns_immediately() {
        let start = tokio::time::Instant::now();
        countdown_before_real_trading(0).await;
        assert_eq!(tokio::time::Instant::now() - start, Duration::from_secs(0));
    }
}
