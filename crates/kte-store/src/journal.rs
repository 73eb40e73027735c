//! Order-state journal (C4, spec §4.4): one row per idempotency key, written
//! through on every submission/partial/cancel/terminal transition. A single
//! JSON file holds the whole table — durability is atomic write-temp+rename
//! of the full table, matching [`crate::atomic_file`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use kte_domain::{Mode, OrderState, Symbol};

use crate::atomic_file::{read_json, write_json_atomic};

pub struct OrderJournal {
    path: PathBuf,
    rows: Mutex<BTreeMap<String, OrderState>>,
}

impl OrderJournal {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rows: BTreeMap<String, OrderState> = read_json(&path)?.unwrap_or_default();
        Ok(OrderJournal {
            path,
            rows: Mutex::new(rows),
        })
    }

    fn persist(&self, rows: &BTreeMap<String, OrderState>) -> Result<()> {
        write_json_atomic(&self.path, rows)
    }

    /// Returns the existing row for `idempotency_key` if present (spec
    /// property 4: a duplicate submission returns last known state without a
    /// new broker call).
    pub fn get(&self, idempotency_key: &str) -> Option<OrderState> {
        self.rows.lock().unwrap().get(idempotency_key).cloned()
    }

    /// Inserts a brand-new row, write-through. Does not overwrite an
    /// existing row for the same key — callers must check `get` first.
    pub fn insert_pending(&self, order: OrderState) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        rows.insert(order.idempotency_key.clone(), order);
        self.persist(&rows)
    }

    /// Applies `update` to the row for `idempotency_key` and persists the
    /// whole table. `update` is expected to call `OrderState::transition`/
    /// `accrue_fill` itself.
    pub fn update_with<F>(&self, idempotency_key: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut OrderState),
    {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(idempotency_key) {
            update(row);
        }
        self.persist(&rows)
    }

    /// Rows with non-terminal status for `mode`, fed to the reconciler on
    /// startup (spec §4.4, §4.8).
    pub fn non_terminal_for_mode(&self, mode: Mode) -> Vec<OrderState> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.mode == mode && !o.status.is_terminal())
            .cloned()
            .collect()
    }

    /// All rows for `symbol`, any mode or status. Used by the position
    /// reconciler (spec §4.8) to look for journal evidence of an untracked
    /// broker holding before reconstructing a position from it.
    pub fn rows_for_symbol(&self, symbol: &Symbol) -> Vec<OrderState> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .filter(|o| &o.symbol == symbol)
            .cloned()
            .collect()
    }
}
