//! Access-token cache: renews when `now >= expires_at - 10min` (spec §4.2).

use tokio::sync::Mutex;

use crate::error::BrokerError;
use crate::types::AccessToken;

pub struct TokenCache {
    current: Mutex<Option<AccessToken>>,
}

impl Default for TokenCache {
    fn default() -> Self {
        TokenCache {
            current: Mutex::new(None),
        }
    }
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a cached token if still fresh, otherwise calls `fetch` to
    /// obtain and cache a new one.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<AccessToken, BrokerError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<AccessToken, BrokerError>>,
    {
        let mut guard = self.current.lock().await;
        let now = chrono::Utc::now();
        if let Some(token) = guard.as_ref() {
            if !token.needs_renewal(now) {
                return Ok(token.clone());
            }
        }
        let fresh = fetch().await?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }
}
