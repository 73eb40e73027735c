//! Per-symbol screening data (spec §4.10 safety filters), best-effort in the
//! same sense the original KIS client is: the REST quote response carries no
//! market-cap/suspension/management-issue fields, so those default to a
//! permissive "unknown" value rather than blocking every candidate.

use kte_broker::CurrentPrice;
use kte_config::EngineConfig;
use kte_domain::Symbol;

#[derive(Clone, Debug, PartialEq)]
pub struct CandidateSnapshot {
    pub symbol: Symbol,
    pub current_price: f64,
    pub open_price: f64,
    pub volume: f64,
    pub trade_value: f64,
    pub market_cap: f64,
    pub is_suspended: bool,
    pub is_management: bool,
}

impl CandidateSnapshot {
    pub fn from_quote(symbol: Symbol, quote: &CurrentPrice) -> Self {
        let current_price = quote.price.as_f64();
        let open_price = quote.open.as_f64();
        let volume = quote.volume as f64;
        CandidateSnapshot {
            symbol,
            current_price,
            open_price,
            volume,
            trade_value: current_price * volume,
            market_cap: 0.0,
            is_suspended: false,
            is_management: false,
        }
    }

    pub fn pct_from_open(&self) -> f64 {
        if self.open_price > 0.0 {
            (self.current_price - self.open_price) / self.open_price * 100.0
        } else {
            0.0
        }
    }

    /// `trade_value ≥ min_volume`, `market_cap ≥ min_market_cap` (when
    /// known), not suspended, not a management-issue name,
    /// `|pct_from_open| < 28%` (spec §4.10).
    pub fn passes_safety_filters(&self, cfg: &EngineConfig) -> bool {
        if self.trade_value < cfg.universe_min_volume {
            return false;
        }
        if self.market_cap > 0.0 && self.market_cap < cfg.universe_min_market_cap {
            return false;
        }
        if self.is_suspended {
            return false;
        }
        if cfg.universe_exclude_management && self.is_management {
            return false;
        }
        if self.pct_from_open().abs() >= 28.0 {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kte_domain::Money;

    fn quote(price: i64, open: i64, volume: i64) -> CurrentPrice {
        CurrentPrice {
            price: Money::from_major(price),
            open: Money::from_major(open),
            high: Money::from_major(price),
            low: Money::from_major(price),
            volume: volume as u64,
            change_rate: 0.0,
        }
    }

    #[test]
    fn low_trade_value_fails_the_volume_filter() {
        let snap = CandidateSnapshot::from_quote(Symbol::new("005930"), &quote(1, 1, 1));
        assert!(!snap.passes_safety_filters(&EngineConfig::default()));
    }

    #[test]
    fn large_move_from_open_fails_the_gap_filter() {
        let snap = CandidateSnapshot::from_quote(
            Symbol::new("005930"),
            &quote(100_000, 70_000, 20_000_000),
        );
        assert!(snap.pct_from_open().abs() >= 28.0);
        assert!(!snap.passes_safety_filters(&EngineConfig::default()));
    }

    #[test]
    fn liquid_unsuspended_name_within_move_range_passes() {
        let snap = CandidateSnapshot::from_quote(
            Symbol::new("005930"),
            &quote(70_000, 69_000, 20_000_000),
        );
        assert!(snap.passes_safety_filters(&EngineConfig::default()));
    }
}
