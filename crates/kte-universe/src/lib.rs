//! Daily universe service (C10, spec §4.10): decides which symbols the
//! scheduler feeds to per-symbol executors today, then gates new entries by
//! `max_positions`. Grounded on
//! `original_source/kis_trend_atr_trading/universe/{universe_selector,universe_service}.py`.

pub mod candidate;
pub mod error;
pub mod selection;

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use kte_broker::BrokerClient;
use kte_config::EngineConfig;
use kte_domain::{SelectionMethod, Symbol, UniverseSelection};
use kte_store::UniverseCache;

pub use error::UniverseError;

/// Why a cached selection from earlier today should be discarded and
/// recomputed, mirroring the original's `_cache_refresh_reason`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshReason {
    Restart,
    MarketOpen,
    Interval,
}

impl RefreshReason {
    fn as_str(self) -> &'static str {
        match self {
            RefreshReason::Restart => "restart",
            RefreshReason::MarketOpen => "market_open",
            RefreshReason::Interval => "interval",
        }
    }
}

/// Decides whether a same-day cached selection must be discarded. `fixed`
/// never refreshes intraday: a fixed list is stable by construction.
fn refresh_reason(
    cfg: &EngineConfig,
    cached: &UniverseSelection,
    now: DateTime<Utc>,
    is_restart: bool,
    is_market_open_tick: bool,
) -> Option<RefreshReason> {
    if !cfg.universe_cache_refresh_enabled || cfg.universe_selection_method == SelectionMethod::Fixed {
        return None;
    }
    if cfg.universe_cache_refresh_on_restart && is_restart {
        return Some(RefreshReason::Restart);
    }
    if cfg.universe_cache_refresh_on_market_open && is_market_open_tick && !cached.market_open_refreshed {
        return Some(RefreshReason::MarketOpen);
    }
    if cfg.universe_cache_refresh_interval_minutes > 0 {
        let elapsed = now - cached.saved_at;
        if elapsed >= chrono::Duration::minutes(cfg.universe_cache_refresh_interval_minutes) {
            return Some(RefreshReason::Interval);
        }
    }
    None
}

/// `run_symbols = holdings ∪ entry_candidates`, `allow_new_entries` gated on
/// `max_positions`, plus the selection that produced them (spec §4.10
/// steps 5–6).
#[derive(Clone, Debug, PartialEq)]
pub struct UniverseOutcome {
    pub selection: UniverseSelection,
    pub entry_candidates: Vec<Symbol>,
    pub run_symbols: BTreeSet<Symbol>,
    pub allow_new_entries: bool,
    pub block_reason: Option<String>,
}

pub struct UniverseService<'a> {
    broker: &'a dyn BrokerClient,
    cache: UniverseCache,
}

impl<'a> UniverseService<'a> {
    pub fn new(broker: &'a dyn BrokerClient, cache_path: impl Into<std::path::PathBuf>) -> Self {
        UniverseService {
            broker,
            cache: UniverseCache::new(cache_path),
        }
    }

    /// Full per-trade-date resolution (spec §4.10 steps 1–6).
    ///
    /// `is_restart`/`is_market_open_tick` are supplied by the caller (the
    /// scheduler, which owns the wall clock and process-lifetime state) so
    /// this module stays pure w.r.t. time — matching the "no wall clock in
    /// core logic" rule kte-clock enforces elsewhere.
    pub async fn resolve(
        &self,
        cfg: &EngineConfig,
        holdings: &[Symbol],
        today: NaiveDate,
        now: DateTime<Utc>,
        is_restart: bool,
        is_market_open_tick: bool,
    ) -> Result<UniverseOutcome, UniverseError> {
        let holdings_set: BTreeSet<Symbol> = holdings.iter().cloned().collect();

        let cached = self
            .cache
            .load_for_date(today)
            .unwrap_or(None)
            .filter(|sel| sel.method == cfg.universe_selection_method);

        let selection = match cached {
            Some(sel) => match refresh_reason(cfg, &sel, now, is_restart, is_market_open_tick) {
                None => sel,
                Some(reason) => {
                    tracing::info!(reason = reason.as_str(), "universe: cache invalidated, reselecting");
                    self.reselect_and_cache(cfg, today, now, true).await?
                }
            },
            None => self.reselect_and_cache(cfg, today, now, false).await?,
        };

        let entry_candidates: Vec<Symbol> = selection
            .symbols
            .iter()
            .filter(|s| !holdings_set.contains(s))
            .cloned()
            .collect();

        let run_symbols: BTreeSet<Symbol> = holdings_set.iter().cloned().chain(entry_candidates.iter().cloned()).collect();

        let (allow_new_entries, block_reason) = if entry_candidates.is_empty() {
            (true, None)
        } else if holdings_set.len() < cfg.max_positions {
            (true, None)
        } else {
            (
                false,
                Some(format!(
                    "max_positions reached: {} holdings >= {} max_positions",
                    holdings_set.len(),
                    cfg.max_positions
                )),
            )
        };

        Ok(UniverseOutcome {
            selection,
            entry_candidates,
            run_symbols,
            allow_new_entries,
            block_reason,
        })
    }

    async fn reselect_and_cache(
        &self,
        cfg: &EngineConfig,
        today: NaiveDate,
        now: DateTime<Utc>,
        market_open_refreshed: bool,
    ) -> Result<UniverseSelection, UniverseError> {
        let symbols = self.run_selection(cfg).await?;
        if symbols.is_empty() {
            return Err(UniverseError::Empty);
        }
        let mut selection = UniverseSelection::new(today, cfg.universe_selection_method, symbols, now);
        selection.market_open_refreshed = market_open_refreshed;
        if let Err(e) = self.cache.save(&selection) {
            tracing::error!(error = %e, "universe: failed to persist selection cache");
        }
        Ok(selection)
    }

    async fn run_selection(&self, cfg: &EngineConfig) -> Result<Vec<Symbol>, UniverseError> {
        let symbols = match cfg.universe_selection_method {
            SelectionMethod::Fixed => selection::select_fixed(cfg),
            SelectionMethod::VolumeTop => {
                selection::select_volume_top(self.broker, cfg, cfg.universe_volume_top_n).await?
            }
            SelectionMethod::AtrFilter => selection::select_atr_filter(self.broker, cfg).await?,
            SelectionMethod::CombinedVolumeThenAtr => selection::select_combined(self.broker, cfg).await?,
        };
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kte_broker::{
        AccessToken, AccountBalance, BrokerError, CurrentPrice, ExecutedOrder, Mode, PlaceOrderRequest,
        PlaceOrderResponse, WaitForExecutionResult,
    };
    use kte_domain::Bar;

    struct StubBroker;

    #[async_trait]
    impl BrokerClient for StubBroker {
        async fn get_access_token(&self) -> Result<AccessToken, BrokerError> {
            unimplemented!()
        }
        async fn get_daily_ohlcv(
            &self,
            _symbol: &Symbol,
            _from: Option<NaiveDate>,
            _to: Option<NaiveDate>,
        ) -> Result<Vec<Bar>, BrokerError> {
            Ok(vec![])
        }
        async fn get_current_price(&self, _symbol: &Symbol) -> Result<CurrentPrice, BrokerError> {
            unimplemented!()
        }
        async fn place_order(&self, _req: PlaceOrderRequest) -> Result<PlaceOrderResponse, BrokerError> {
            unimplemented!()
        }
        async fn cancel_order(&self, _order_no: &str) -> Result<(), BrokerError> {
            unimplemented!()
        }
        async fn get_order_status(&self, _order_no: Option<&str>) -> Result<Vec<ExecutedOrder>, BrokerError> {
            unimplemented!()
        }
        async fn wait_for_execution(
            &self,
            _order_no: &str,
            _expected_qty: u64,
            _timeout: std::time::Duration,
            _poll_interval: std::time::Duration,
        ) -> Result<WaitForExecutionResult, BrokerError> {
            unimplemented!()
        }
        async fn get_account_balance(&self) -> Result<AccountBalance, BrokerError> {
            unimplemented!()
        }
        fn mode(&self) -> Mode {
            Mode::Paper
        }
    }

    fn fixed_cfg() -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.universe_selection_method = SelectionMethod::Fixed;
        cfg.universe_fixed_stocks = vec!["005930".to_string(), "000660".to_string(), "005380".to_string()];
        cfg.universe_size = 3;
        cfg.max_positions = 2;
        cfg
    }

    #[tokio::test]
    async fn holdings_are_carried_into_run_symbols_even_off_universe() {
        let broker = StubBroker;
        let dir = tempfile::tempdir().unwrap();
        let service = UniverseService::new(&broker, dir.path().join("universe_cache.json"));
        let cfg = fixed_cfg();
        let today = NaiveDate::from_ymd_opt(2026, 7, 20).unwrap();
        let holdings = vec![Symbol::new("999999")];

        let outcome = service
            .resolve(&cfg, &holdings, today, Utc::now(), false, false)
            .await
            .unwrap();

        assert!(outcome.run_symbols.contains(&Symbol::new("999999")));
        assert!(outcome.run_symbols.contains(&Symbol::new("005930")));
        assert!(!outcome.entry_candidates.contains(&Symbol::new("999999")));
    }

    #[tokio::test]
    async fn max_positions_blocks_new_entries_when_holdings_are_full() {
        let broker = StubBroker;
        let dir = tempfile::tempdir().unwrap();
        let service = UniverseService::new(&broker, dir.path().join("universe_cache.json"));
        let cfg = fixed_cfg();
        let today = NaiveDate::from_ymd_opt(2026, 7, 20).unwrap();
        let holdings = vec![Symbol::new("001"), Symbol::new("002")];

        let outcome = service
            .resolve(&cfg, &holdings, today, Utc::now(), false, false)
            .await
            .unwrap();

        assert!(!outcome.allow_new_entries);
        assert!(outcome.block_reason.is_some());
    }

    #[tokio::test]
    async fn second_resolve_same_day_reuses_the_cached_selection() {
        let broker = StubBroker;
        let dir = tempfile::tempdir().unwrap();
        let service = UniverseService::new(&broker, dir.path().join("universe_cache.json"));
        let cfg = fixed_cfg();
        let today = NaiveDate::from_ymd_opt(2026, 7, 20).unwrap();

        let first = service
            .resolve(&cfg, &[], today, Utc::now(), false, false)
            .await
            .unwrap();
        let second = service
            .resolve(&cfg, &[], today, Utc::now(), false, false)
            .await
            .unwrap();

        assert_eq!(first.selection.saved_at, second.selection.saved_at);
    }

    #[tokio::test]
    async fn empty_fixed_list_is_reported_as_an_error() {
        let broker = StubBroker;
        let dir = tempfile::tempdir().unwrap();
        let service = UniverseService::new(&broker, dir.path().join("universe_cache.json"));
        let mut cfg = fixed_cfg();
        cfg.universe_fixed_stocks = vec![];

        let today = NaiveDate::from_ymd_opt(2026, 7, 20).unwrap();
        let err = service.resolve(&cfg, &[], today, Utc::now(), false, false).await;
        assert_eq!(err.unwrap_err(), UniverseError::Empty);
    }
}
