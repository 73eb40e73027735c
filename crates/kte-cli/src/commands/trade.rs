//! `kte trade`: wires every C1-C12 component together and drives
//! [`kte_scheduler::run_forever`] (spec §4.11, §6).

use anyhow::{Context, Result};
use kte_broker::kis::KisBrokerClient;
use kte_clock::{Clock, FixedHolidayCalendar, MarketHoursClock, SystemClock};
use kte_config::resolve_execution_mode;
use kte_config::secrets::resolve_secrets_for_mode;
use kte_domain::{DailyPnl, Mode, Money, RiskState};
use kte_events::audit::AuditWriter;
use kte_events::{drive_audit, drive_notifier, EventBus, PerformanceSink};
use kte_risk::RiskManager;
use kte_scheduler::{countdown_before_real_trading, run_forever, InstanceLock, Scheduler, REAL_MODE_COUNTDOWN_SECS};
use kte_store::{OrderJournal, PositionStore};
use kte_strategy::EventCalendar;
use tokio::sync::Mutex;

use super::load_config;

pub struct TradeArgs {
    pub config_paths: Vec<String>,
    pub symbols: Vec<String>,
    pub interval: Option<u64>,
    pub max_runs: Option<u64>,
    pub confirm_real_trading: bool,
    pub real_first_order_percent: Option<f64>,
    pub real_limit_symbols_first_day: Option<usize>,
    pub lock_path: String,
    pub audit_path: String,
    pub state_dir: String,
    pub journal_path: String,
}

/// `kte_domain::Mode` carries a `DryRun` the broker client never sees;
/// DRY_RUN and PAPER both talk to the PAPER wire endpoint, matching the
/// original's "dry run submits nothing live but still reads real quotes"
/// behavior.
fn broker_mode(mode: Mode) -> kte_broker::types::Mode {
    match mode {
        Mode::Real => kte_broker::types::Mode::Real,
        Mode::Paper | Mode::DryRun => kte_broker::types::Mode::Paper,
    }
}

pub async fn run(args: TradeArgs) -> Result<()> {
    let mut symbols = args.symbols.clone();
    let (mut cfg, secret_refs) = load_config(&args.config_paths, &symbols)?;

    let mode = resolve_execution_mode(&cfg, args.confirm_real_trading);
    if mode != Mode::Real && args.confirm_real_trading {
        tracing::warn!("--confirm-real-trading given but mode did not resolve to REAL (check ENABLE_REAL_TRADING/EXECUTION_MODE)");
    }

    if mode == Mode::Real {
        if let Some(limit) = args.real_limit_symbols_first_day {
            if !symbols.is_empty() && symbols.len() > limit {
                tracing::warn!(limit, total = symbols.len(), "REAL mode: limiting to first N symbols for this invocation");
                symbols.truncate(limit);
                cfg.universe_fixed_stocks = symbols.clone();
            }
        }
        if let Some(pct) = args.real_first_order_percent {
            let scale = (pct / 100.0).clamp(0.0, 1.0);
            cfg.order_quantity = ((cfg.order_quantity as f64) * scale).round().max(1.0) as u64;
            for qty in cfg.symbol_order_quantity.values_mut() {
                *qty = ((*qty as f64) * scale).round().max(1.0) as u64;
            }
        }
    }

    if let Some(interval) = args.interval {
        cfg.default_execution_interval_secs = interval;
        cfg.near_stoploss_execution_interval_secs = interval;
    }

    let secrets = resolve_secrets_for_mode(&secret_refs, mode).context("resolving broker credentials")?;
    let broker = KisBrokerClient::new(
        broker_mode(mode),
        secrets.broker_app_key,
        secrets.broker_app_secret,
        (1.0 / cfg.rate_limit_delay_secs.max(0.001)).min(20.0),
    );

    let clock = SystemClock;
    let calendar = FixedHolidayCalendar::new(Vec::new());
    let market_clock = MarketHoursClock::new(clock, calendar);

    let position_store = PositionStore::new(format!("{}/positions", args.state_dir));
    let journal = OrderJournal::open(&args.journal_path).context("opening order journal")?;
    let today = SystemClock.now_utc().with_timezone(&chrono_tz::Asia::Seoul).date_naive();
    let risk = Mutex::new(RiskManager::new(RiskState::new(Money::ZERO), DailyPnl::new_for_date(today, Money::ZERO)));
    let events = EventBus::default();
    let event_calendar = EventCalendar::new(Vec::new());

    let audit = AuditWriter::new(&args.audit_path).context("opening audit log")?;
    let performance = PerformanceSink::new();
    let audit_rx = events.subscribe();
    let perf_rx = events.subscribe();
    let audit_task = tokio::spawn(async move { drive_audit(audit_rx, &audit).await });
    let perf_task = tokio::spawn(async move { drive_notifier(perf_rx, &performance).await });

    let mut lock = InstanceLock::acquire(&args.lock_path).context("acquiring instance lock")?;

    if mode == Mode::Real {
        countdown_before_real_trading(REAL_MODE_COUNTDOWN_SECS).await;
    }

    let universe_cache_path = format!("{}/universe_cache.json", args.state_dir);
    let mut scheduler = Scheduler::new(
        &broker,
        &market_clock,
        &position_store,
        &journal,
        &risk,
        &events,
        &event_calendar,
        universe_cache_path,
    );

    let run_clock = SystemClock;
    let result = run_forever(&mut scheduler, &cfg, &run_clock, &mut lock, args.max_runs).await;

    drop(scheduler);
    drop(events);
    let _ = audit_task.await;
    let _ = perf_task.await;

    result
}
