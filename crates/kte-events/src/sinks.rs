//! Sink contracts and the driver loops that feed them. Each sink owns its
//! own subscription and its own task; a slow or failing sink never slows
//! down order submission, matching spec §4.12's "core never awaits a sink".

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::event::Event;

/// Delivers events to an operator-facing channel (Telegram, etc.). Only the
/// trait contract lives here — wiring an actual transport is out of scope
/// (spec Non-goals).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &Event);
}

/// Durably records every event, independent of notification delivery.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &Event) -> anyhow::Result<()>;
}

/// Drains `rx` into `sink.notify`, forever. Lag (the sink fell behind the
/// bus's capacity) is logged and skipped rather than treated as fatal.
pub async fn drive_notifier<N: Notifier>(mut rx: broadcast::Receiver<Event>, sink: &N) {
    loop {
        match rx.recv().await {
            Ok(event) => sink.notify(&event).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "notifier sink lagged behind event bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Drains `rx` into `sink.record`, forever. A write failure is logged but
/// does not stop the loop — audit durability issues are an operational
/// concern, not a reason to abandon future events.
pub async fn drive_audit<A: AuditSink>(mut rx: broadcast::Receiver<Event>, sink: &A) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Err(e) = sink.record(&event).await {
                    tracing::error!(error = %e, kind = event.kind(), "audit sink write failed");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "audit sink lagged behind event bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;
    use kte_domain::Symbol;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingNotifier(Arc<AtomicUsize>);

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn notifier_drains_published_events() {
        let bus = EventBus::default();
        let rx = bus.subscribe();
        let count = Arc::new(AtomicUsize::new(0));
        let sink = CountingNotifier(count.clone());

        let handle = tokio::spawn(async move {
            drive_notifier(rx, &sink).await;
        });

        bus.publish(Event::OrderSubmitted {
            symbol: Symbol::new("005930"),
            order_no: "o1".to_string(),
        });
        bus.publish(Event::OrderCancelled {
            symbol: Symbol::new("005930"),
            order_no: "o1".to_string(),
            filled_qty: 0,
        });

        // Dropping the bus closes the channel so the driver task exits.
        drop(bus);
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), handle).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
