//! The typed event vocabulary (spec §4.12) and the broadcast bus that
//! carries it. Every producer call is `publish`, which is synchronous and
//! infallible from the caller's point of view — the core never awaits a
//! sink, only a best-effort fan-out into the channel.

use chrono::{DateTime, Utc};
use kte_domain::{ExitReason, Money, Side, Symbol};
use kte_reconcile::ReconcileOutcome;
use kte_risk::CheckResult;
use kte_strategy::Signal;
use tokio::sync::broadcast;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Event {
    SignalComputed { symbol: Symbol, signal: Signal },
    OrderRequested { symbol: Symbol, side: Side, qty: i64, signal_id: String },
    OrderSubmitted { symbol: Symbol, order_no: String },
    OrderFilled { symbol: Symbol, order_no: String, qty: i64, price: Money },
    OrderPartial { symbol: Symbol, order_no: String, filled_qty: i64, remaining_qty: i64 },
    OrderCancelled { symbol: Symbol, order_no: String, filled_qty: i64 },
    PositionOpened { symbol: Symbol, entry_price: Money, quantity: i64 },
    PositionClosed {
        symbol: Symbol,
        entry_price: Money,
        initial_stop: Money,
        exit_price: Money,
        quantity: i64,
        realized_pnl: Money,
        reason: ExitReason,
    },
    RiskCheckFailed { symbol: Option<Symbol>, check: CheckResult },
    KillSwitchTripped { reason: String, at: DateTime<Utc> },
    ReconcileOutcome(ReconcileOutcome),
    NetworkUnavailable { since: DateTime<Utc>, outage_secs: i64 },
}

impl Event {
    /// Stable tag for logging/audit filtering; one per spec §4.12 variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::SignalComputed { .. } => "SignalComputed",
            Event::OrderRequested { .. } => "OrderRequested",
            Event::OrderSubmitted { .. } => "OrderSubmitted",
            Event::OrderFilled { .. } => "OrderFilled",
            Event::OrderPartial { .. } => "OrderPartial",
            Event::OrderCancelled { .. } => "OrderCancelled",
            Event::PositionOpened { .. } => "PositionOpened",
            Event::PositionClosed { .. } => "PositionClosed",
            Event::RiskCheckFailed { .. } => "RiskCheckFailed",
            Event::KillSwitchTripped { .. } => "KillSwitchTripped",
            Event::ReconcileOutcome(_) => "ReconcileOutcome",
            Event::NetworkUnavailable { .. } => "NetworkUnavailable",
        }
    }
}

/// Default backlog before a lagging subscriber starts missing events. Audit
/// and notifier sinks are expected to drain promptly; a lagged subscriber
/// logs and resumes rather than blocking the bus.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Typed in-process event bus (C12): a `tokio::sync::broadcast` channel, one
/// publisher (the executor/risk/reconcile call sites), many subscribers
/// (notifier, audit log, performance tracker).
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        EventBus { tx }
    }

    /// Best-effort publish. Returns the number of live subscribers, or 0 if
    /// there were none to receive it — never an error the caller must
    /// handle, since no subscriber is a valid (if unusual) configuration.
    pub fn publish(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(DEFAULT_CAPACITY)
    }
}
