//! Performance/trade reporting (SPEC_FULL §C.3): accumulates win-rate,
//! average R-multiple, and turnover from `PositionClosed`/`OrderFilled`
//! events. Read-only — never feeds back into trading decisions.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::event::Event;
use crate::sinks::Notifier;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerformanceStats {
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub realized_pnl_minor: i64,
    pub r_multiple_sum: f64,
    pub turnover_qty: i64,
}

impl PerformanceStats {
    pub fn win_rate_pct(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.trades as f64 * 100.0
        }
    }

    pub fn average_r_multiple(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.r_multiple_sum / self.trades as f64
        }
    }
}

/// Subscribes to the event bus and folds closed positions / fills into a
/// running [`PerformanceStats`]. Holds its own mutex rather than requiring
/// `&mut self` so it can be shared behind an `Arc` with the driver task.
pub struct PerformanceSink {
    stats: Mutex<PerformanceStats>,
}

impl PerformanceSink {
    pub fn new() -> Self {
        PerformanceSink {
            stats: Mutex::new(PerformanceStats::default()),
        }
    }

    pub fn snapshot(&self) -> PerformanceStats {
        *self.stats.lock().unwrap()
    }
}

impl Default for PerformanceSink {
    fn default() -> Self {
        PerformanceSink::new()
    }
}

#[async_trait]
impl Notifier for PerformanceSink {
    async fn notify(&self, event: &Event) {
        match event {
            Event::PositionClosed {
                entry_price,
                initial_stop,
                exit_price,
                realized_pnl,
                ..
            } => {
                let mut stats = self.stats.lock().unwrap();
                stats.trades += 1;
                if realized_pnl.is_positive() {
                    stats.wins += 1;
                } else {
                    stats.losses += 1;
                }
                stats.realized_pnl_minor += realized_pnl.minor();

                let initial_risk = (entry_price.as_f64() - initial_stop.as_f64()).abs();
                if initial_risk > 0.0 {
                    let r = (exit_price.as_f64() - entry_price.as_f64()) / initial_risk;
                    stats.r_multiple_sum += r;
                }
            }
            Event::OrderFilled { qty, .. } => {
                self.stats.lock().unwrap().turnover_qty += *qty;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kte_domain::{ExitReason, Money, Symbol};

    fn closed(entry: i64, stop: i64, exit: i64, pnl: i64) -> Event {
        Event::PositionClosed {
            symbol: Symbol::new("005930"),
            entry_price: Money::from_major(entry),
            initial_stop: Money::from_major(stop),
            exit_price: Money::from_major(exit),
            quantity: 10,
            realized_pnl: Money::from_major(pnl),
            reason: ExitReason::AtrTakeProfit,
        }
    }

    #[tokio::test]
    async fn winning_trade_is_tallied_with_positive_r_multiple() {
        let sink = PerformanceSink::new();
        sink.notify(&closed(70_000, 67_000, 76_000, 60_000)).await;
        let stats = sink.snapshot();
        assert_eq!(stats.trades, 1);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 0);
        assert!(stats.average_r_multiple() > 1.9 && stats.average_r_multiple() < 2.1);
    }

    #[tokio::test]
    async fn losing_trade_counts_toward_loss_rate() {
        let sink = PerformanceSink::new();
        sink.notify(&closed(70_000, 67_000, 67_000, -30_000)).await;
        let stats = sink.snapshot();
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.win_rate_pct(), 0.0);
    }

    #[tokio::test]
    async fn order_filled_accumulates_turnover() {
        let sink = PerformanceSink::new();
        sink.notify(&Event::OrderFilled {
            symbol: Symbol::new("005930"),
            order_no: "o1".to_string(),
            qty: 10,
            price: Money::from_major(70_000),
        })
        .await;
        sink.notify(&Event::OrderFilled {
            symbol: Symbol::new("005930"),
            order_no: "o2".to_string(),
            qty: 10,
            price: Money::from_major(76_000),
        })
        .await;
        assert_eq!(sink.snapshot().turnover_qty, 20);
    }
}
