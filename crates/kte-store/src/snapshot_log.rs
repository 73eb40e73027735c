//! Periodic equity snapshots (SPEC_FULL.md §C.4): an append-only JSON Lines
//! file, read-only from the trading path (reporting only — never consulted
//! for trading decisions).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use kte_domain::Money;
use serde::{Deserialize, Serialize};

const MIN_CADENCE: chrono::Duration = chrono::Duration::minutes(5);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EquitySnapshot {
    pub at: DateTime<Utc>,
    pub cash: Money,
    pub total_equity: Money,
    pub total_pnl: Money,
}

pub struct SnapshotLog {
    path: PathBuf,
    last_written_at: Mutex<Option<DateTime<Utc>>>,
}

impl SnapshotLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SnapshotLog {
            path: path.into(),
            last_written_at: Mutex::new(None),
        }
    }

    /// Appends `snapshot` only if at least [`MIN_CADENCE`] has elapsed since
    /// the last write; returns whether it was written.
    pub fn maybe_append(&self, snapshot: &EquitySnapshot) -> Result<bool> {
        let mut last = self.last_written_at.lock().unwrap();
        if let Some(prev) = *last {
            if snapshot.at.signed_duration_since(prev) < MIN_CADENCE {
                return Ok(false);
            }
        }
        self.append_unconditionally(snapshot)?;
        *last = Some(snapshot.at);
        Ok(true)
    }

    fn append_unconditionally(&self, snapshot: &EquitySnapshot) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let line = serde_json::to_string(snapshot).context("serializing snapshot")?;
        writeln!(file, "{line}").context("appending snapshot line")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(at: DateTime<Utc>) -> EquitySnapshot {
        EquitySnapshot {
            at,
            cash: Money::from_major(1_000_000),
            total_equity: Money::from_major(10_000_000),
            total_pnl: Money::from_major(50_000),
        }
    }

    #[test]
    fn first_snapshot_always_writes() {
        let dir = tempfile::tempdir().unwrap();
        let log = SnapshotLog::new(dir.path().join("snapshots.jsonl"));
        assert!(log.maybe_append(&snapshot(Utc::now())).unwrap());
    }

    #[test]
    fn enforces_five_minute_minimum_cadence() {
        let dir = tempfile::tempdir().unwrap();
        let log = SnapshotLog::new(dir.path().join("snapshots.jsonl"));
        let t0 = Utc::now();
        assert!(log.maybe_append(&snapshot(t0)).unwrap());
        assert!(!log.maybe_append(&snapshot(t0 + chrono::Duration::minutes(1))).unwrap());
        assert!(log.maybe_append(&snapshot(t0 + chrono::Duration::minutes(6))).unwrap());
    }

    #[test]
    fn appends_valid_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.jsonl");
        let log = SnapshotLog::new(&path);
        let t0 = Utc::now();
        log.maybe_append(&snapshot(t0)).unwrap();
        log.maybe_append(&snapshot(t0 + chrono::Duration::minutes(10))).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let _: EquitySnapshot = serde_json::from_str(line).unwrap();
        }
    }
}
