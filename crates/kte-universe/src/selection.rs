//! The four selection methods (spec §4.10), grounded on
//! `original_source/kis_trend_atr_trading/universe/universe_selector.py`.

use kte_broker::BrokerClient;
use kte_config::EngineConfig;
use kte_domain::Symbol;
use kte_indicators::{compute, IndicatorConfig};

use crate::candidate::CandidateSnapshot;
use crate::error::UniverseError;

/// The pool of symbols a `volume_top`/`atr_filter`/`combined` scan draws
/// from: the configured candidate pool, falling back to the fixed list.
fn candidate_pool(cfg: &EngineConfig) -> Vec<Symbol> {
    let raw = if !cfg.universe_candidate_pool.is_empty() {
        &cfg.universe_candidate_pool
    } else {
        &cfg.universe_fixed_stocks
    };
    dedupe(raw.iter().map(|s| Symbol::new(s)))
}

fn dedupe(iter: impl Iterator<Item = Symbol>) -> Vec<Symbol> {
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for s in iter {
        if seen.insert(s.clone()) {
            out.push(s);
        }
    }
    out
}

pub fn select_fixed(cfg: &EngineConfig) -> Vec<Symbol> {
    cfg.universe_fixed_stocks
        .iter()
        .map(|s| Symbol::new(s))
        .take(cfg.universe_size)
        .collect()
}

async fn snapshot_for_symbol(
    broker: &dyn BrokerClient,
    symbol: &Symbol,
) -> Result<CandidateSnapshot, UniverseError> {
    let quote = broker.get_current_price(symbol).await?;
    Ok(CandidateSnapshot::from_quote(symbol.clone(), &quote))
}

/// ATR as a percentage of the latest close, using the same streaming ATR
/// module C6 uses. Returns `None` if there isn't enough daily history yet.
async fn atr_pct_for_symbol(
    broker: &dyn BrokerClient,
    symbol: &Symbol,
    cfg: &EngineConfig,
) -> Result<Option<f64>, UniverseError> {
    let bars = broker.get_daily_ohlcv(symbol, None, None).await?;
    let series = kte_domain::BarSeries::from_unordered(bars);
    let Some(last_close) = series.closes().last().copied() else {
        return Ok(None);
    };
    if last_close <= 0.0 {
        return Ok(None);
    }
    let snapshot = compute(
        &series,
        &IndicatorConfig {
            atr_period: cfg.atr_period,
            ..IndicatorConfig::default()
        },
    );
    Ok(snapshot.latest_atr.map(|atr| atr / last_close * 100.0))
}

pub async fn select_volume_top(
    broker: &dyn BrokerClient,
    cfg: &EngineConfig,
    limit: usize,
) -> Result<Vec<Symbol>, UniverseError> {
    let pool = candidate_pool(cfg);
    let scan_limit = limit.max(cfg.universe_size) * 5;
    let mut ranked: Vec<(Symbol, f64)> = Vec::new();

    for symbol in pool.into_iter().take(scan_limit.max(1)) {
        let snapshot = match snapshot_for_symbol(broker, &symbol).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(%symbol, error = %e, "universe: skipping candidate, quote fetch failed");
                continue;
            }
        };
        if snapshot.passes_safety_filters(cfg) {
            ranked.push((symbol, snapshot.trade_value));
        }
    }

    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(ranked
        .into_iter()
        .map(|(s, _)| s)
        .take(limit.max(cfg.universe_size))
        .collect())
}

pub async fn select_atr_filter(
    broker: &dyn BrokerClient,
    cfg: &EngineConfig,
) -> Result<Vec<Symbol>, UniverseError> {
    let pool = candidate_pool(cfg);
    let mut selected = Vec::new();
    for symbol in pool {
        let Some(ratio) = atr_pct_for_symbol(broker, &symbol, cfg).await? else {
            continue;
        };
        if ratio >= cfg.universe_min_atr_pct && ratio <= cfg.universe_max_atr_pct {
            selected.push(symbol);
        }
    }
    selected.truncate(cfg.universe_size);
    Ok(selected)
}

pub async fn select_combined(
    broker: &dyn BrokerClient,
    cfg: &EngineConfig,
) -> Result<Vec<Symbol>, UniverseError> {
    let first_stage = select_volume_top(broker, cfg, cfg.universe_size * 3).await?;
    let mut second_stage = Vec::new();
    for symbol in first_stage {
        let Some(ratio) = atr_pct_for_symbol(broker, &symbol, cfg).await? else {
            continue;
        };
        if ratio >= cfg.universe_min_atr_pct && ratio <= cfg.universe_max_atr_pct {
            second_stage.push(symbol);
        }
    }
    second_stage.truncate(cfg.universe_size);
    Ok(second_stage)
}
