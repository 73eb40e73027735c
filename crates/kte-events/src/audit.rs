//! Append-only JSONL audit trail with a SHA-256 hash chain per entry,
//! independent of notification delivery (SPEC_FULL §C.5, grounded on the
//! teacher's `mqk-audit` hash-chain writer). Tampering with or deleting a
//! line breaks `hash_prev` continuity for every entry after it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::event::Event;
use crate::sinks::AuditSink;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AuditRecord {
    pub seq: u64,
    pub ts_utc: DateTime<Utc>,
    pub kind: &'static str,
    pub payload: Event,
    pub hash_prev: Option<String>,
    pub hash_self: String,
}

struct AuditState {
    seq: u64,
    last_hash: Option<String>,
}

/// Writes one JSON line per event, threading a SHA-256 hash chain through
/// `hash_prev`/`hash_self` so a gap or edit in the file is detectable by
/// [`verify_chain`].
pub struct AuditWriter {
    path: PathBuf,
    state: Mutex<AuditState>,
}

impl AuditWriter {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create_dir_all {parent:?}"))?;
        }
        Ok(AuditWriter {
            path,
            state: Mutex::new(AuditState {
                seq: 0,
                last_hash: None,
            }),
        })
    }

    /// Resume an existing log: call with the tail record's `seq + 1` and
    /// `hash_self` so the chain continues rather than restarting at zero.
    pub fn resume_from(path: impl Into<PathBuf>, seq: u64, last_hash: Option<String>) -> Result<Self> {
        let writer = AuditWriter::new(path)?;
        {
            let mut state = writer.state.lock().unwrap();
            state.seq = seq;
            state.last_hash = last_hash;
        }
        Ok(writer)
    }

    fn append(&self, event: &Event) -> Result<AuditRecord> {
        let mut state = self.state.lock().unwrap();
        let seq = state.seq;
        let hash_prev = state.last_hash.clone();

        let mut record = AuditRecord {
            seq,
            ts_utc: Utc::now(),
            kind: event.kind(),
            payload: event.clone(),
            hash_prev: hash_prev.clone(),
            hash_self: String::new(),
        };
        record.hash_self = compute_hash(&record)?;

        let line = canonical_json_line(&record)?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open audit log {:?}", self.path))?;
        f.write_all(line.as_bytes())?;
        f.write_all(b"\n")?;

        state.seq += 1;
        state.last_hash = Some(record.hash_self.clone());
        Ok(record)
    }
}

#[async_trait]
impl AuditSink for AuditWriter {
    async fn record(&self, event: &Event) -> Result<()> {
        self.append(event)?;
        Ok(())
    }
}

fn compute_hash(record: &AuditRecord) -> Result<String> {
    let mut unsealed = record.clone();
    unsealed.hash_self = String::new();
    let canonical = canonical_json_line(&unsealed)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

fn canonical_json_line<T: serde::Serialize>(value: &T) -> Result<String> {
    let raw = serde_json::to_value(value)?;
    serde_json::to_string(&sort_keys(&raw)).context("audit record serialization failed")
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[&key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainVerification {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

/// Replays an audit log file and confirms every `hash_prev`/`hash_self`
/// link is intact. Used by the CLI's `verify` subcommand (spec §6).
pub fn verify_chain(path: impl AsRef<Path>) -> Result<ChainVerification> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_chain_str(&content)
}

pub fn verify_chain_str(content: &str) -> Result<ChainVerification> {
    let mut prev_hash: Option<String> = None;
    let mut lines = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: AuditRecord = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit record at line {}", i + 1))?;
        lines += 1;

        if record.hash_prev != prev_hash {
            return Ok(ChainVerification::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {prev_hash:?}, got {:?}",
                    record.hash_prev
                ),
            });
        }
        let recomputed = compute_hash(&record)?;
        if recomputed != record.hash_self {
            return Ok(ChainVerification::Broken {
                line: i + 1,
                reason: format!(
                    "hash_self mismatch: claimed {}, recomputed {recomputed}",
                    record.hash_self
                ),
            });
        }
        prev_hash = Some(record.hash_self.clone());
    }

    Ok(ChainVerification::Valid { lines })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kte_domain::Symbol;

    fn sample_event() -> Event {
        Event::OrderSubmitted {
            symbol: Symbol::new("005930"),
            order_no: "o1".to_string(),
        }
    }

    #[tokio::test]
    async fn appended_events_form_a_verifiable_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let writer = AuditWriter::new(&path).unwrap();
        writer.record(&sample_event()).await.unwrap();
        writer.record(&sample_event()).await.unwrap();
        writer.record(&sample_event()).await.unwrap();

        match verify_chain(&path).unwrap() {
            ChainVerification::Valid { lines } => assert_eq!(lines, 3),
            ChainVerification::Broken { line, reason } => {
                panic!("chain broken at line {line}: {reason}")
            }
        }
    }

    #[tokio::test]
    async fn tampered_line_breaks_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let writer = AuditWriter::new(&path).unwrap();
        writer.record(&sample_event()).await.unwrap();
        writer.record(&sample_event()).await.unwrap();

        let mut content = std::fs::read_to_string(&path).unwrap();
        content = content.replace("\"o1\"", "\"tampered\"");
        std::fs::write(&path, content).unwrap();

        match verify_chain(&path).unwrap() {
            ChainVerification::Broken { .. } => {}
            ChainVerification::Valid { .. } => panic!("expected tamper to be detected"),
        }
    }

    #[tokio::test]
    async fn resume_from_continues_the_chain_without_restarting_seq() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let first_hash = {
            let writer = AuditWriter::new(&path).unwrap();
            writer.record(&sample_event()).await.unwrap();
            writer.state.lock().unwrap().last_hash.clone().unwrap()
        };

        let resumed = AuditWriter::resume_from(&path, 1, Some(first_hash)).unwrap();
        resumed.record(&sample_event()).await.unwrap();

        match verify_chain(&path).unwrap() {
            ChainVerification::Valid { lines } => assert_eq!(lines, 2),
            ChainVerification::Broken { line, reason } => {
                panic!("chain broken at line {line}: {reason}")
            }
        }
    }
}
