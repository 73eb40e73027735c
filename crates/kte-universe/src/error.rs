//! Universe-selection error taxonomy, matching the teacher's hand-rolled
//! `Display`/`Error` enum pattern (see `kte_broker::BrokerError`).

use std::fmt;

use kte_broker::BrokerError;

#[derive(Clone, Debug, PartialEq)]
pub enum UniverseError {
    /// The broker call needed to screen or rank a candidate failed.
    Broker(BrokerError),
    /// The configured selection method produced zero symbols and there was
    /// no cached selection to fall back to.
    Empty,
}

impl fmt::Display for UniverseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniverseError::Broker(e) => write!(f, "universe selection broker error: {e}"),
            UniverseError::Empty => write!(f, "universe selection produced zero symbols"),
        }
    }
}

impl std::error::Error for UniverseError {}

impl From<BrokerError> for UniverseError {
    fn from(e: BrokerError) -> Self {
        UniverseError::Broker(e)
    }
}
