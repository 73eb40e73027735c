//! Typed in-process event bus (C12, spec §4.12): every state change the
//! executor/risk/reconcile layers produce is a typed [`Event`] published to
//! a broadcast channel. Sinks (notifier, audit log, performance tracker)
//! each own a subscription and run in their own task — the core never
//! awaits a sink.

pub mod audit;
pub mod event;
pub mod performance;
pub mod sinks;

pub use audit::{AuditWriter, ChainVerification};
pub use event::{Event, EventBus, DEFAULT_CAPACITY};
pub use performance::{PerformanceSink, PerformanceStats};
pub use sinks::{drive_audit, drive_notifier, AuditSink, Notifier};
