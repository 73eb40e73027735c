//! Single-instance scheduler (C11, spec §4.11): OS-level instance lock,
//! REAL-mode countdown, and the per-tick fan-out loop across `run_symbols`
//! that drives every [`kte_executor::SymbolExecutor`].

pub mod countdown;
pub mod lock;
pub mod run;

pub use countdown::{countdown_before_real_trading, REAL_MODE_COUNTDOWN_SECS};
pub use lock::{InstanceLock, LockError};
pub use run::{run_forever, Scheduler, TickReport};
