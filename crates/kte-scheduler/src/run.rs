//! Per-tick fan-out loop across `run_symbols` (C11, spec §4.11).

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Asia::Seoul;
use kte_broker::{AccountBalance, BrokerClient};
use kte_clock::{Clock, HolidayCalendar, MarketHoursClock, MarketStatus};
use kte_config::EngineConfig;
use kte_domain::Symbol;
use kte_events::EventBus;
use kte_executor::{next_tick_interval, SymbolExecutor, TickOutcome};
use kte_reconcile::{reconcile, ReconcileReport};
use kte_risk::RiskManager;
use kte_store::{OrderJournal, PositionStore};
use kte_strategy::EventCalendar;
use kte_universe::UniverseService;
use tokio::sync::Mutex;

use crate::lock::InstanceLock;

/// Result of one fan-out tick, for logging and tests.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    pub run_symbols: Vec<Symbol>,
    pub outcomes: Vec<(Symbol, TickOutcome)>,
    pub reconcile: ReconcileReport,
    pub next_sleep: Duration,
}

/// Owns every per-symbol [`SymbolExecutor`] plus the account-wide
/// collaborators they share, and drives one fan-out tick at a time. The
/// shared account state (risk manager, event bus) is account-wide across
/// every symbol, matching [`SymbolExecutor`]'s own "state held" contract.
pub struct Scheduler<'a, B: BrokerClient, C: Clock, H: HolidayCalendar> {
    broker: &'a B,
    market_clock: &'a MarketHoursClock<C, H>,
    position_store: &'a PositionStore,
    journal: &'a OrderJournal,
    risk: &'a Mutex<RiskManager>,
    events: &'a EventBus,
    calendar: &'a EventCalendar,
    universe: UniverseService<'a>,
    executors: BTreeMap<Symbol, SymbolExecutor<'a, B, C, H>>,
}

impl<'a, B: BrokerClient, C: Clock, H: HolidayCalendar> Scheduler<'a, B, C, H> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        broker: &'a B,
        market_clock: &'a MarketHoursClock<C, H>,
        position_store: &'a PositionStore,
        journal: &'a OrderJournal,
        risk: &'a Mutex<RiskManager>,
        events: &'a EventBus,
        calendar: &'a EventCalendar,
        universe_cache_path: impl Into<std::path::PathBuf>,
    ) -> Self {
        Scheduler {
            broker,
            market_clock,
            position_store,
            journal,
            risk,
            events,
            calendar,
            universe: UniverseService::new(broker, universe_cache_path),
            executors: BTreeMap::new(),
        }
    }

    /// Resolves today's universe, reconciles broker state, ticks every
    /// run-symbol's executor once, and reports the minimum requested sleep
    /// before the next iteration (spec §4.11 steps 2-5).
    pub async fn tick_once(
        &mut self,
        cfg: &EngineConfig,
        now: DateTime<Utc>,
        is_restart: bool,
        is_market_open_tick: bool,
    ) -> anyhow::Result<TickReport> {
        let kst_today: NaiveDate = now.with_timezone(&Seoul).date_naive();
        let holdings: Vec<Symbol> = self
            .executors
            .iter()
            .filter(|(_, e)| e.has_position())
            .map(|(s, _)| s.clone())
            .collect();

        let universe_outcome = self
            .universe
            .resolve(cfg, &holdings, kst_today, now, is_restart, is_market_open_tick)
            .await?;
        let run_symbols: Vec<Symbol> = universe_outcome.run_symbols.iter().cloned().collect();

        let balance: Result<AccountBalance, _> = self.broker.get_account_balance().await;
        let err_detail = balance.as_ref().err().map(|e| e.to_string());
        let balance_arg: Result<&AccountBalance, &str> = match (&balance, &err_detail) {
            (Ok(b), _) => Ok(b),
            (Err(_), Some(msg)) => Err(msg.as_str()),
            (Err(_), None) => unreachable!("err_detail is always Some when balance is Err"),
        };
        let reconcile_report = reconcile(&run_symbols, balance_arg, self.position_store, self.journal, now);

        // A symbol that dropped out of today's run set (position closed,
        // no longer selected) doesn't need its executor held in memory.
        self.executors.retain(|s, _| run_symbols.contains(s));

        let mut outcomes = Vec::with_capacity(run_symbols.len());
        let mut worst_near_stop: Option<f64> = None;

        for symbol in &run_symbols {
            if !self.executors.contains_key(symbol) {
                let executor = SymbolExecutor::new(
                    symbol.clone(),
                    self.broker,
                    self.market_clock,
                    self.position_store,
                    self.journal,
                    self.risk,
                    self.events,
                    self.calendar,
                    now,
                )
                .with_context(|| format!("constructing executor for {symbol}"))?;
                self.executors.insert(symbol.clone(), executor);
            }

            let allow_new_entries = universe_outcome.allow_new_entries && reconcile_report.allow_new_entries(symbol);
            let executor = self.executors.get_mut(symbol).expect("just inserted above");
            let outcome = executor.tick(cfg, allow_new_entries, now).await;
            worst_near_stop = match (worst_near_stop, executor.last_near_stop_pct()) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, None) => a,
                (None, b) => b,
            };
            outcomes.push((symbol.clone(), outcome));
        }

        let status = self.market_clock.status_now();
        let next_sleep = next_tick_interval(status, worst_near_stop, cfg);

        Ok(TickReport {
            run_symbols,
            outcomes,
            reconcile: reconcile_report,
            next_sleep,
        })
    }

    /// Persists every executor's currently-held position (spec §4.11
    /// SIGINT/SIGTERM handling) — a no-op for any symbol already flat, since
    /// every fill already writes through to the store on the hot path.
    pub fn flush_positions(&self, now: DateTime<Utc>) {
        for (symbol, executor) in &self.executors {
            if let Some(position) = executor.position() {
                if let Err(e) = self.position_store.save(symbol, position, now) {
                    tracing::error!(%symbol, error = %e, "failed to flush position on shutdown");
                }
            }
        }
    }

    pub fn market_clock(&self) -> &MarketHoursClock<C, H> {
        self.market_clock
    }
}

/// Drives the scheduler until SIGINT/SIGTERM arrives or `max_runs` ticks are
/// exhausted, sleeping the reported interval between iterations (spec
/// §4.11). REAL-mode callers must run
/// [`crate::countdown::countdown_before_real_trading`] before the first
/// call so the operator's last-chance abort window runs before any order can
/// go live. On SIGINT/SIGTERM: flush every open position, release the
/// instance lock, return `Ok(())` (exit 0 is the caller's responsibility).
pub async fn run_forever<B, C, H>(
    scheduler: &mut Scheduler<'_, B, C, H>,
    cfg: &EngineConfig,
    clock: &C,
    lock: &mut InstanceLock,
    max_runs: Option<u64>,
) -> anyhow::Result<()>
where
    B: BrokerClient,
    C: Clock,
    H: HolidayCalendar,
{
    let mut is_restart = true;
    let mut runs: u64 = 0;

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("installing SIGTERM handler")?;

    loop {
        if let Some(limit) = max_runs {
            if runs >= limit {
                return Ok(());
            }
        }

        let now = clock.now_utc();
        let is_market_open_tick = scheduler.market_clock().status_now() == MarketStatus::Open;

        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("SIGINT received, flushing positions and releasing instance lock");
                scheduler.flush_positions(clock.now_utc());
                lock.release();
                return Ok(());
            }
            #[cfg(unix)]
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received, flushing positions and releasing instance lock");
                scheduler.flush_positions(clock.now_utc());
                lock.release();
                return Ok(());
            }
            report = scheduler.tick_once(cfg, now, is_restart, is_market_open_tick) => {
                let report = report?;
                runs += 1;
                is_restart = false;
                tokio::time::sleep(report.next_sleep).await;
            }
        }
    }
}
