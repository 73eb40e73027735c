//! Per-symbol position + pending-exit store (C3, spec §4.3, §6 "Persisted
//! state layout"). One `positions_{symbol}.json` file per symbol holding
//! `{position, pending_exit, updated_at}`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use kte_domain::{PendingExit, Position, Symbol};
use serde::{Deserialize, Serialize};

use crate::atomic_file::{read_json, write_json_atomic};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct SymbolRecord {
    position: Option<Position>,
    pending_exit: Option<PendingExit>,
    updated_at: Option<DateTime<Utc>>,
}

pub struct PositionStore {
    root: PathBuf,
}

impl PositionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        PositionStore { root: root.into() }
    }

    fn path_for(&self, symbol: &Symbol) -> PathBuf {
        self.root.join(format!("positions_{}.json", symbol.as_str()))
    }

    fn read_record(&self, symbol: &Symbol) -> Result<SymbolRecord> {
        Ok(read_json(&self.path_for(symbol))?.unwrap_or_default())
    }

    fn write_record(&self, symbol: &Symbol, record: &SymbolRecord) -> Result<()> {
        write_json_atomic(&self.path_for(symbol), record)
    }

    pub fn load(&self, symbol: &Symbol) -> Result<Option<Position>> {
        Ok(self.read_record(symbol)?.position)
    }

    pub fn save(&self, symbol: &Symbol, position: &Position, now: DateTime<Utc>) -> Result<()> {
        let mut record = self.read_record(symbol)?;
        record.position = Some(position.clone());
        record.updated_at = Some(now);
        self.write_record(symbol, &record)
    }

    pub fn clear(&self, symbol: &Symbol, now: DateTime<Utc>) -> Result<()> {
        let mut record = self.read_record(symbol)?;
        record.position = None;
        record.updated_at = Some(now);
        self.write_record(symbol, &record)
    }

    /// Validates symbol match and the 72h staleness window (spec §4.3);
    /// discards (and clears on disk) a mismatched or stale record.
    pub fn load_pending_exit(&self, symbol: &Symbol, now: DateTime<Utc>) -> Result<Option<PendingExit>> {
        let record = self.read_record(symbol)?;
        match record.pending_exit {
            Some(pe) if &pe.symbol == symbol && !pe.is_stale(now, chrono::Duration::hours(72)) => {
                Ok(Some(pe))
            }
            Some(_) => {
                self.clear_pending_exit(symbol, now)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub fn save_pending_exit(&self, pending_exit: &PendingExit, now: DateTime<Utc>) -> Result<()> {
        let symbol = pending_exit.symbol.clone();
        let mut record = self.read_record(&symbol)?;
        record.pending_exit = Some(pending_exit.clone());
        record.updated_at = Some(now);
        self.write_record(&symbol, &record)
    }

    pub fn clear_pending_exit(&self, symbol: &Symbol, now: DateTime<Utc>) -> Result<()> {
        let mut record = self.read_record(symbol)?;
        record.pending_exit = None;
        record.updated_at = Some(now);
        self.write_record(symbol, &record)
    }
}

pub fn default_root(base_dir: impl AsRef<Path>) -> PathBuf {
    base_dir.as_ref().join("positions")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kte_domain::{ExitReason, Money, PositionState};

    fn sym() -> Symbol {
        Symbol::new("005930")
    }

    fn position() -> Position {
        Position::new(
            sym(),
            Money::from_major(70_000),
            10,
            chrono::NaiveDate::from_ymd_opt(2026, 7, 20).unwrap(),
            Money::from_major(67_000),
            Some(Money::from_major(74_500)),
            Money::from_major(1_500),
        )
        .unwrap()
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path());
        let now = Utc::now();
        store.save(&sym(), &position(), now).unwrap();
        let loaded = store.load(&sym()).unwrap().unwrap();
        assert_eq!(loaded.quantity, 10);
        assert_eq!(loaded.state, PositionState::Entered);
    }

    #[test]
    fn clear_removes_position_but_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path());
        let now = Utc::now();
        store.save(&sym(), &position(), now).unwrap();
        store.clear(&sym(), now).unwrap();
        assert!(store.load(&sym()).unwrap().is_none());
    }

    #[test]
    fn pending_exit_round_trips_when_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path());
        let now = Utc::now();
        let pe = PendingExit::new(sym(), ExitReason::AtrStop, "r1", now, "market closed", now);
        store.save_pending_exit(&pe, now).unwrap();
        let loaded = store.load_pending_exit(&sym(), now).unwrap().unwrap();
        assert_eq!(loaded.retry_key, pe.retry_key);
    }

    #[test]
    fn stale_pending_exit_is_discarded_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path());
        let now = Utc::now();
        let stale_time = now - chrono::Duration::hours(73);
        let pe = PendingExit::new(sym(), ExitReason::AtrStop, "r1", now, "market closed", stale_time);
        store.save_pending_exit(&pe, stale_time).unwrap();
        assert!(store.load_pending_exit(&sym(), now).unwrap().is_none());
        // Discarding also clears it on disk.
        assert!(store.load_pending_exit(&sym(), now).unwrap().is_none());
    }
}
