//! Tracks continuous transport-failure duration so the client can signal
//! `NetworkUnavailable` once failures exceed 60s continuously (spec §4.2).

use std::sync::Mutex;
use std::time::{Duration, Instant};

const UNAVAILABLE_THRESHOLD: Duration = Duration::from_secs(60);

pub struct NetworkHealth {
    state: Mutex<HealthState>,
}

struct HealthState {
    failing_since: Option<Instant>,
    reported_unavailable: bool,
}

/// A transition the caller should act on: emit `NetworkUnavailable` once
/// failures cross the threshold, and emit a recovery once they stop.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HealthTransition {
    None,
    BecameUnavailable,
    Recovered,
}

impl Default for NetworkHealth {
    fn default() -> Self {
        NetworkHealth {
            state: Mutex::new(HealthState {
                failing_since: None,
                reported_unavailable: false,
            }),
        }
    }
}

impl NetworkHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&self) -> HealthTransition {
        let mut state = self.state.lock().expect("network health mutex poisoned");
        let now = Instant::now();
        let since = *state.failing_since.get_or_insert(now);
        if !state.reported_unavailable && now.duration_since(since) >= UNAVAILABLE_THRESHOLD {
            state.reported_unavailable = true;
            return HealthTransition::BecameUnavailable;
        }
        HealthTransition::None
    }

    /// Whether failures have been continuous for at least 60s right now —
    /// what C9 step 6 consults before attempting any order this tick.
    pub fn is_unavailable(&self) -> bool {
        let state = self.state.lock().expect("network health mutex poisoned");
        state.reported_unavailable
    }

    pub fn record_success(&self) -> HealthTransition {
        let mut state = self.state.lock().expect("network health mutex poisoned");
        let was_unavailable = state.reported_unavailable;
        state.failing_since = None;
        state.reported_unavailable = false;
        if was_unavailable {
            HealthTransition::Recovered
        } else {
            HealthTransition::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_failure_does_not_trip() {
        let health = NetworkHealth::new();
        assert_eq!(health.record_failure(), HealthTransition::None);
    }

    #[test]
    fn success_resets_failure_window() {
        let health = NetworkHealth::new();
        health.record_failure();
        assert_eq!(health.record_success(), HealthTransition::None);
    }

    #[test]
    fn recovery_fires_only_after_unavailable_was_reported() {
        let health = NetworkHealth::new();
        health.record_failure();
        // Not yet past the threshold, so no unavailable event and thus no
        // recovery event either.
        assert_eq!(health.record_success(), HealthTransition::None);
    }
}
