//! A single global token-bucket rate limiter (spec §4.2: ≤20 req/s), hand-
//! rolled as explicit mutex-guarded state rather than pulling in a crate for
//! something this small (SPEC_FULL.md §B).

use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let min_interval = Duration::from_secs_f64(1.0 / requests_per_second);
        RateLimiter {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Blocks asynchronously until at least `min_interval` has elapsed since
    /// the previous permitted request.
    pub async fn acquire(&self) {
        let wait = {
            let mut guard = self.last_request.lock().expect("rate limiter mutex poisoned");
            let now = Instant::now();
            let wait = match *guard {
                Some(last) => {
                    let elapsed = now.duration_since(last);
                    self.min_interval.saturating_sub(elapsed)
                }
                None => Duration::ZERO,
            };
            *guard = Some(now + wait);
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}
