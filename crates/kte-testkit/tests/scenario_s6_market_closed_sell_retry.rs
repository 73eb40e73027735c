//! S6 — market-closed SELL retry: a trailing-stop exit (not an emergency
//! reason) fires at 15:25 KST (CLOSE_AUCTION), where non-emergency exits are
//! blocked, so the tick defers into a `PendingExit` instead of failing
//! outright. The next OPEN tick retries and closes the position, clearing
//! the pending exit.

use chrono::NaiveDate;
use kte_broker::types::CurrentPrice;
use kte_broker::paper_stub::PaperStubBroker;
use kte_clock::{FixedHolidayCalendar, FrozenClock, MarketHoursClock};
use kte_domain::{DailyPnl, Money, Position, RiskState, Symbol};
use kte_events::EventBus;
use kte_executor::{SymbolExecutor, TickOutcome};
use kte_risk::RiskManager;
use kte_store::{OrderJournal, PositionStore};
use kte_strategy::EventCalendar;
use kte_testkit::{constant_atr_uptrend, kst_close_auction_instant, kst_next_open_instant};
use tokio::sync::Mutex;

#[tokio::test]
async fn deferred_at_close_auction_then_closes_on_next_open() {
    let symbol = Symbol::new("005930");
    let state_dir = tempfile::tempdir().unwrap();
    let position_store = PositionStore::new(state_dir.path().join("positions"));
    let journal = OrderJournal::open(state_dir.path().join("journal.json")).unwrap();
    let events = EventBus::default();
    let calendar = EventCalendar::new(Vec::new());
    let cfg = kte_config::EngineConfig::default();
    assert_eq!(cfg.pending_exit_backoff_minutes, 5);

    let entry_date = NaiveDate::from_ymd_opt(2026, 7, 20).unwrap();
    let position = Position::new(
        symbol.clone(),
        Money::from_major(70_000),
        10,
        entry_date,
        Money::from_major(67_000),
        Some(Money::from_major(74_500)),
        Money::from_major(1_500),
    )
    .unwrap();
    position_store.save(&symbol, &position, kst_close_auction_instant()).unwrap();

    let broker = PaperStubBroker::new(Money::from_major(10_000_000));
    broker.set_bars(symbol.clone(), constant_atr_uptrend(50, 68_260, 10, 1500));
    let risk = Mutex::new(RiskManager::new(
        RiskState::new(Money::from_major(10_000_000)),
        DailyPnl::new_for_date(entry_date, Money::from_major(10_000_000)),
    ));

    // Both close-auction sub-ticks share one executor so the trailing stop
    // it raises on the first tick (from a high of 74000) is still in memory
    // for the second, rather than reloading the un-raised persisted value.
    let close_clock = MarketHoursClock::new(FrozenClock(kst_close_auction_instant()), FixedHolidayCalendar::default());
    let mut close_auction_executor = SymbolExecutor::new(
        symbol.clone(),
        &broker,
        &close_clock,
        &position_store,
        &journal,
        &risk,
        &events,
        &calendar,
        kst_close_auction_instant(),
    )
    .unwrap();

    // Tick 1: trailing stop raised to 71000 by a high of 74000; price stays
    // above it, so this is a hold.
    broker.set_current_price(
        symbol.clone(),
        CurrentPrice {
            price: Money::from_major(74_000),
            open: Money::from_major(73_900),
            high: Money::from_major(74_100),
            low: Money::from_major(73_800),
            volume: 300_000,
            change_rate: 5.7,
        },
    );
    let outcome = close_auction_executor.tick(&cfg, false, kst_close_auction_instant()).await;
    assert_eq!(outcome, TickOutcome::Hold, "raising the trailing stop without crossing it is a hold");

    // Tick 2: price pulls back under the now-71000 trailing stop, above the
    // original stop/entry, so the exit reason is TRAILING_STOP — not an
    // emergency reason, and blocked at close auction.
    broker.set_current_price(
        symbol.clone(),
        CurrentPrice {
            price: Money::from_major(70_900),
            open: Money::from_major(70_800),
            high: Money::from_major(71_000),
            low: Money::from_major(70_700),
            volume: 300_000,
            change_rate: -4.2,
        },
    );
    let deferred_at;
    match close_auction_executor.tick(&cfg, false, kst_close_auction_instant()).await {
        TickOutcome::SellDeferred { next_retry_at } => {
            let expected = kst_close_auction_instant() + chrono::Duration::minutes(cfg.pending_exit_backoff_minutes);
            assert_eq!(next_retry_at, expected);
            deferred_at = next_retry_at;
        }
        other => panic!("expected SellDeferred, got {other:?}"),
    }
    assert!(position_store.load(&symbol).unwrap().is_some(), "position must survive a deferred exit");
    assert!(
        position_store.load_pending_exit(&symbol, kst_close_auction_instant()).unwrap().is_some(),
        "pending exit must persist across the backoff window"
    );
    assert!(deferred_at > kst_close_auction_instant());

    // Tick 3: next trading day's open. Price has dropped through the
    // original stop, so the exit fires again (now ATR_STOP) and, with the
    // market open, executes and clears the pending exit. Open stays within
    // the 2% gap-reference band around entry (70000) so
    // GAP_PROTECTION doesn't preempt ATR_STOP; the intraday low through the
    // 67000 stop is what fires the exit.
    broker.set_current_price(
        symbol.clone(),
        CurrentPrice {
            price: Money::from_major(66_900),
            open: Money::from_major(69_000),
            high: Money::from_major(69_100),
            low: Money::from_major(66_800),
            volume: 300_000,
            change_rate: -4.5,
        },
    );
    let clock = MarketHoursClock::new(FrozenClock(kst_next_open_instant()), FixedHolidayCalendar::default());
    let mut executor = SymbolExecutor::new(
        symbol.clone(),
        &broker,
        &clock,
        &position_store,
        &journal,
        &risk,
        &events,
        &calendar,
        kst_next_open_instant(),
    )
    .unwrap();
    let outcome = executor.tick(&cfg, false, kst_next_open_instant()).await;
    match outcome {
        TickOutcome::SellClosed { .. } => {}
        other => panic!("expected SellClosed on retry, got {other:?}"),
    }
    assert!(position_store.load(&symbol).unwrap().is_none(), "position must be cleared after the retry fills");
    assert!(
        position_store.load_pending_exit(&symbol, kst_next_open_instant()).unwrap().is_none(),
        "pending exit must be cleared once the retry succeeds"
    );
}
