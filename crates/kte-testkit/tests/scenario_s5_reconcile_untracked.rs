//! S5 — reconcile untracked: the position store is empty, the broker
//! reports a `005930 x 7 @ 70500` holding, and the journal has no BUY for
//! it, so the outcome is `UNTRACKED_HOLDING` with new entries blocked and
//! no auto-liquidation attempted.

use kte_broker::types::{AccountBalance, Holding};
use kte_domain::{Money, Symbol};
use kte_reconcile::ReconcileTag;
use kte_store::{OrderJournal, PositionStore};

#[test]
fn untracked_holding_blocks_new_entries_without_liquidating() {
    let state_dir = tempfile::tempdir().unwrap();
    let position_store = PositionStore::new(state_dir.path().join("positions"));
    let journal = OrderJournal::open(state_dir.path().join("journal.json")).unwrap();

    let symbol = Symbol::new("005930");
    let balance = AccountBalance {
        holdings: vec![Holding {
            symbol: symbol.clone(),
            quantity: 7,
            avg_price: Money::from_major(70_500),
            current_price: Money::from_major(70_500),
            pnl: Money::ZERO,
        }],
        cash: Money::from_major(1_000_000),
        total_equity: Money::from_major(1_000_000),
        total_pnl: Money::ZERO,
    };

    let report = kte_reconcile::reconcile(&[symbol.clone()], Ok(&balance), &position_store, &journal, chrono::Utc::now());

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].tag, ReconcileTag::UntrackedHolding);
    assert!(!report.allow_new_entries(&symbol));
    assert!(position_store.load(&symbol).unwrap().is_none(), "reconcile must not fabricate a local position");
}
