//! Per-symbol executor (C9, spec §4.9): ties together the clock, strategy,
//! order synchronizer, risk manager, and stores into the single-symbol tick
//! loop the scheduler drives. One instance per run-symbol; the risk manager
//! and event bus are account-wide and shared across every executor.

mod tick;

pub use tick::{next_tick_interval, SymbolExecutor, TickOutcome};
