//! `kte backtest`: replays historical daily bars through the full
//! strategy/risk/executor stack using [`PaperStubBroker`] as the C2
//! implementation (spec §9: "CBT replay becomes a pluggable broker stub
//! behind C2, not a parallel code path").

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, TimeZone, Weekday};
use chrono_tz::Asia::Seoul;
use kte_broker::kis::KisBrokerClient;
use kte_broker::paper_stub::PaperStubBroker;
use kte_broker::types::{CurrentPrice, Mode as WireMode};
use kte_broker::BrokerClient;
use kte_clock::{FixedHolidayCalendar, FrozenClock, MarketHoursClock};
use kte_config::secrets::resolve_secrets_for_mode;
use kte_domain::{Bar, DailyPnl, Mode, Money, RiskState, Symbol};
use kte_events::{drive_notifier, EventBus, PerformanceSink};
use kte_risk::RiskManager;
use kte_scheduler::Scheduler;
use kte_store::{OrderJournal, PositionStore};
use kte_strategy::EventCalendar;
use tokio::sync::Mutex;

use super::load_config;

/// An approximate intraday trading instant used to evaluate each replayed
/// day — well inside the OPEN window so `MarketHoursClock` never reports
/// CLOSED for a weekday bar.
const REPLAY_HOUR_KST: u32 = 10;

pub async fn run(
    config_paths: Vec<String>,
    symbol_args: Vec<String>,
    from: NaiveDate,
    to: NaiveDate,
    starting_cash_major: i64,
) -> Result<()> {
    anyhow::ensure!(from <= to, "--from must not be after --to");
    let (cfg, secret_refs) = load_config(&config_paths, &symbol_args)?;
    let symbols: Vec<Symbol> = symbol_args.iter().map(|s| Symbol::new(s)).collect();
    anyhow::ensure!(!symbols.is_empty(), "backtest requires at least one --symbol");

    // Historical bars come from the real PAPER-mode wire API; the replay
    // itself never talks to it again once `full_bars` is seeded — only
    // order/balance/price calls go through `PaperStubBroker` from here on,
    // matching spec §9's "pluggable broker stub behind C2" architecture.
    let history_secrets = resolve_secrets_for_mode(&secret_refs, Mode::Paper)
        .context("resolving PAPER credentials for historical bar download")?;
    let history_broker = KisBrokerClient::new(
        WireMode::Paper,
        history_secrets.broker_app_key,
        history_secrets.broker_app_secret,
        (1.0 / cfg.rate_limit_delay_secs.max(0.001)).min(20.0),
    );

    let broker = PaperStubBroker::new(Money::from_major(starting_cash_major));
    let mut full_bars: std::collections::BTreeMap<Symbol, Vec<Bar>> = std::collections::BTreeMap::new();
    for symbol in &symbols {
        let bars = history_broker
            .get_daily_ohlcv(symbol, Some(from), Some(to))
            .await
            .with_context(|| format!("fetching historical bars for {symbol}"))?;
        full_bars.insert(symbol.clone(), bars);
    }

    let tmp_root = std::env::temp_dir().join(format!("kte-backtest-{}", std::process::id()));
    let position_store = PositionStore::new(tmp_root.join("positions"));
    let journal_path = tmp_root.join("journal.json");
    let journal = OrderJournal::open(&journal_path).context("opening scratch order journal")?;
    let risk = Mutex::new(RiskManager::new(
        RiskState::new(Money::from_major(starting_cash_major)),
        DailyPnl::new_for_date(from, Money::from_major(starting_cash_major)),
    ));
    let events = EventBus::default();
    let event_calendar = EventCalendar::new(Vec::new());
    let calendar = FixedHolidayCalendar::new(Vec::new());

    let performance = PerformanceSink::new();
    let perf_rx = events.subscribe();
    let perf_task = tokio::spawn(async move {
        drive_notifier(perf_rx, &performance).await;
        performance
    });

    let universe_cache_path = tmp_root.join("universe_cache.json");
    let mut total_ticks = 0u64;
    let mut day = from;
    while day <= to {
        if is_trading_day(day) {
            for symbol in &symbols {
                let bars_so_far: Vec<Bar> = full_bars[symbol].iter().filter(|b| b.date <= day).cloned().collect();
                if let Some(last) = bars_so_far.last() {
                    broker.set_current_price(
                        symbol.clone(),
                        CurrentPrice {
                            price: last.close,
                            open: last.open,
                            high: last.high,
                            low: last.low,
                            volume: last.volume,
                            change_rate: 0.0,
                        },
                    );
                }
                broker.set_bars(symbol.clone(), bars_so_far);
            }

            let instant = Seoul
                .with_ymd_and_hms(day.year(), day.month(), day.day(), REPLAY_HOUR_KST, 0, 0)
                .single()
                .with_context(|| format!("invalid KST instant for {day}"))?;
            let now = instant.with_timezone(&chrono::Utc);
            let market_clock = MarketHoursClock::new(FrozenClock(now), calendar.clone());

            let mut scheduler = Scheduler::new(
                &broker,
                &market_clock,
                &position_store,
                &journal,
                &risk,
                &events,
                &event_calendar,
                universe_cache_path.clone(),
            );
            let report = scheduler.tick_once(&cfg, now, total_ticks == 0, true).await?;
            total_ticks += 1;
            tracing::info!(date = %day, run_symbols = report.run_symbols.len(), "backtest day replayed");
        }
        day = day.succ_opt().context("date overflow while advancing backtest day")?;
    }

    drop(events);
    let stats = perf_task.await.context("performance sink task panicked")?;
    let stats = stats.snapshot();

    println!("days_replayed={total_ticks}");
    println!("trades={} wins={} losses={} win_rate_pct={:.2}", stats.trades, stats.wins, stats.losses, stats.win_rate_pct());
    println!("realized_pnl_minor={}", stats.realized_pnl_minor);
    println!("average_r_multiple={:.3}", stats.average_r_multiple());
    println!("turnover_qty={}", stats.turnover_qty);

    let _ = std::fs::remove_dir_all(&tmp_root);
    Ok(())
}

fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}
