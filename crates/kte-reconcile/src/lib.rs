//! Position reconciler (C8, spec §4.8): compares store + journal state
//! against the broker's own account snapshot on startup and after any
//! `NetworkUnavailable` recovery. Nothing in the executor trusts local state
//! as ground truth until this has run clean.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use kte_broker::{AccountBalance, Holding};
use kte_domain::{Money, OrderState, OrderStatus, Position, PositionInvariantError, Side, Symbol};
use kte_store::{OrderJournal, PositionStore};

/// Conservative fallback used only when a holding is recovered from the
/// broker with no stored entry context (spec §4.8 `AUTO_RECOVERED_FROM_API`).
const FALLBACK_STOP_FRACTION: f64 = 0.95;
const FALLBACK_ATR_FRACTION: f64 = 0.01;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReconcileTag {
    NoPosition,
    Matched,
    QtyAdjusted { stored_qty: i64, broker_qty: i64 },
    AutoRecoveredFromApi,
    UntrackedHolding,
    StoredInvalid,
    CriticalMismatch { unexplained_symbol: Symbol },
    ApiFailed,
}

impl ReconcileTag {
    /// spec §4.8: these four outcomes refuse new entries for the symbol
    /// until a subsequent clean reconciliation clears the flag.
    pub fn blocks_new_entries(&self) -> bool {
        matches!(
            self,
            ReconcileTag::UntrackedHolding
                | ReconcileTag::StoredInvalid
                | ReconcileTag::CriticalMismatch { .. }
                | ReconcileTag::ApiFailed
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            ReconcileTag::NoPosition => "NO_POSITION",
            ReconcileTag::Matched => "MATCHED",
            ReconcileTag::QtyAdjusted { .. } => "QTY_ADJUSTED",
            ReconcileTag::AutoRecoveredFromApi => "AUTO_RECOVERED_FROM_API",
            ReconcileTag::UntrackedHolding => "UNTRACKED_HOLDING",
            ReconcileTag::StoredInvalid => "STORED_INVALID",
            ReconcileTag::CriticalMismatch { .. } => "CRITICAL_MISMATCH",
            ReconcileTag::ApiFailed => "API_FAILED",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReconcileOutcome {
    pub symbol: Symbol,
    pub tag: ReconcileTag,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct ReconcileReport {
    pub outcomes: Vec<ReconcileOutcome>,
}

impl ReconcileReport {
    pub fn blocked_symbols(&self) -> BTreeSet<Symbol> {
        self.outcomes
            .iter()
            .filter(|o| o.tag.blocks_new_entries())
            .map(|o| o.symbol.clone())
            .collect()
    }

    pub fn allow_new_entries(&self, symbol: &Symbol) -> bool {
        !self
            .outcomes
            .iter()
            .any(|o| &o.symbol == symbol && o.tag.blocks_new_entries())
    }
}

/// Runs the reconciler over `symbols` against a previously-fetched account
/// balance. `balance = Err(message)` models an `account.holdings` API
/// failure (spec §4.8 `API_FAILED`): every symbol is blocked and the store
/// is left untouched.
pub fn reconcile(
    symbols: &[Symbol],
    balance: Result<&AccountBalance, &str>,
    position_store: &PositionStore,
    journal: &OrderJournal,
    now: DateTime<Utc>,
) -> ReconcileReport {
    let balance = match balance {
        Ok(b) => b,
        Err(err) => {
            let outcomes = symbols
                .iter()
                .map(|s| ReconcileOutcome {
                    symbol: s.clone(),
                    tag: ReconcileTag::ApiFailed,
                    detail: format!("account balance fetch failed: {err}"),
                })
                .collect();
            return ReconcileReport { outcomes };
        }
    };

    let mut claimed: BTreeSet<Symbol> = BTreeSet::new();
    let mut outcomes = Vec::with_capacity(symbols.len());
    let mut stored_invalid_candidates: Vec<Symbol> = Vec::new();

    for symbol in symbols {
        let holding = balance.holdings.iter().find(|h| &h.symbol == symbol);
        let stored = match position_store.load(symbol) {
            Ok(p) => p,
            Err(e) => {
                outcomes.push(ReconcileOutcome {
                    symbol: symbol.clone(),
                    tag: ReconcileTag::ApiFailed,
                    detail: format!("store read failed: {e}"),
                });
                continue;
            }
        };

        match (&stored, holding) {
            (None, None) => outcomes.push(ReconcileOutcome {
                symbol: symbol.clone(),
                tag: ReconcileTag::NoPosition,
                detail: "no stored position, no broker holding".to_string(),
            }),
            (Some(p), Some(h)) => {
                claimed.insert(symbol.clone());
                let broker_qty = h.quantity as i64;
                if p.quantity == broker_qty {
                    outcomes.push(ReconcileOutcome {
                        symbol: symbol.clone(),
                        tag: ReconcileTag::Matched,
                        detail: format!("qty {broker_qty} matches broker"),
                    });
                } else {
                    let mut adjusted = p.clone();
                    adjusted.quantity = broker_qty;
                    if let Err(e) = position_store.save(symbol, &adjusted, now) {
                        tracing::error!(%symbol, error = %e, "failed to persist qty-adjusted position");
                    }
                    outcomes.push(ReconcileOutcome {
                        symbol: symbol.clone(),
                        tag: ReconcileTag::QtyAdjusted {
                            stored_qty: p.quantity,
                            broker_qty,
                        },
                        detail: format!("stored qty {} replaced with broker qty {broker_qty}", p.quantity),
                    });
                }
            }
            (None, Some(h)) => {
                claimed.insert(symbol.clone());
                outcomes.push(recover_untracked_holding(symbol, h, journal, position_store, now));
            }
            (Some(_), None) => stored_invalid_candidates.push(symbol.clone()),
        }
    }

    // Holdings never matched above (on-record but qty-mismatched is still
    // "claimed") are the evidence a CRITICAL_MISMATCH needs: a stored
    // position with no broker-side counterpart, next to a broker holding
    // nobody in `symbols` accounts for.
    let unexplained: Vec<Symbol> = balance
        .holdings
        .iter()
        .map(|h| h.symbol.clone())
        .filter(|s| !claimed.contains(s))
        .collect();

    for symbol in stored_invalid_candidates {
        if let Some(unexplained_symbol) = unexplained.first().cloned() {
            outcomes.push(ReconcileOutcome {
                detail: format!(
                    "stored position for {symbol} has no broker holding, but broker holds unexplained symbol {unexplained_symbol}"
                ),
                tag: ReconcileTag::CriticalMismatch { unexplained_symbol },
                symbol,
            });
        } else {
            if let Err(e) = position_store.clear(&symbol, now) {
                tracing::error!(%symbol, error = %e, "failed to clear stale stored position");
            }
            outcomes.push(ReconcileOutcome {
                symbol: symbol.clone(),
                tag: ReconcileTag::StoredInvalid,
                detail: "stored position had no broker holding; cleared".to_string(),
            });
        }
    }

    ReconcileReport { outcomes }
}

/// Looks for journal evidence of a filled BUY to justify reconstructing a
/// position from a broker holding the store never recorded (spec §4.8
/// `AUTO_RECOVERED_FROM_API`). Absent that evidence, the holding is
/// untracked and trading on it is refused.
fn recover_untracked_holding(
    symbol: &Symbol,
    holding: &Holding,
    journal: &OrderJournal,
    position_store: &PositionStore,
    now: DateTime<Utc>,
) -> ReconcileOutcome {
    let filled_buy = journal
        .rows_for_symbol(symbol)
        .into_iter()
        .filter(|o| o.side == Side::Buy && o.status == OrderStatus::Filled)
        .max_by_key(|o| o.updated_at);

    let Some(order) = filled_buy else {
        return ReconcileOutcome {
            symbol: symbol.clone(),
            tag: ReconcileTag::UntrackedHolding,
            detail: "broker holding with no store record and no journal evidence".to_string(),
        };
    };

    match reconstruct_position(symbol, holding, &order) {
        Ok(position) => {
            if let Err(e) = position_store.save(symbol, &position, now) {
                tracing::error!(%symbol, error = %e, "failed to persist recovered position");
            }
            ReconcileOutcome {
                symbol: symbol.clone(),
                tag: ReconcileTag::AutoRecoveredFromApi,
                detail: format!("reconstructed from journal order {}", order.idempotency_key),
            }
        }
        Err(e) => ReconcileOutcome {
            symbol: symbol.clone(),
            tag: ReconcileTag::UntrackedHolding,
            detail: format!("journal evidence found but reconstruction failed: {e:?}"),
        },
    }
}

fn reconstruct_position(
    symbol: &Symbol,
    holding: &Holding,
    filled_buy: &OrderState,
) -> Result<Position, PositionInvariantError> {
    let entry_price = holding.avg_price;
    let stop = Money::from_f64_quantized(entry_price.as_f64() * FALLBACK_STOP_FRACTION);
    let atr = Money::from_f64_quantized(entry_price.as_f64() * FALLBACK_ATR_FRACTION);
    Position::new(
        symbol.clone(),
        entry_price,
        holding.quantity as i64,
        filled_buy.updated_at.date_naive(),
        stop,
        None,
        atr,
    )
}
