//! Layered configuration for the trend-ATR engine: recognized options (spec
//! §6), layered YAML+env loading with a canonical-JSON content hash (grounded
//! on the teacher's `mqk-config::load_layered_yaml`), and the REAL-mode
//! double gate (spec §9).

pub mod secrets;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use kte_domain::{Mode, SelectionMethod};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Gap-protection reference price variants (spec §4.6 exit condition 1).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReference {
    PrevClose,
    EntryPrice,
    Stop,
}

impl Default for GapReference {
    fn default() -> Self {
        GapReference::EntryPrice
    }
}

/// The full set of recognized options (spec §6 config table). Every field has
/// a default matching the spec's stated defaults, so a config file only ever
/// needs to override what differs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub execution_mode: Mode,
    pub enable_real_trading: bool,
    pub kill_switch: bool,

    pub atr_period: usize,
    pub trend_ma_period: usize,
    pub adx_period: usize,
    pub atr_multiplier_sl: f64,
    pub atr_multiplier_tp: f64,
    pub max_loss_pct: f64,
    pub atr_spike_threshold: f64,
    pub adx_threshold: f64,

    pub allow_scale_in: bool,
    pub enable_trailing_stop: bool,
    pub trailing_stop_atr_multiplier: f64,
    pub trailing_stop_activation_pct: f64,

    pub enable_gap_protection: bool,
    pub max_gap_loss_pct: f64,
    pub gap_reference: GapReference,
    pub gap_epsilon_pct: f64,

    pub daily_max_loss_percent: f64,
    pub daily_max_trades: u32,
    pub max_consecutive_losses: u32,
    pub max_cumulative_drawdown_pct: f64,
    pub cumulative_drawdown_warning_pct: f64,

    pub order_execution_timeout_secs: u64,
    pub order_check_interval_secs: u64,
    pub emergency_timeout_multiplier: u64,

    pub pending_exit_backoff_minutes: i64,
    pub pending_exit_max_age_hours: i64,

    pub rate_limit_delay_secs: f64,

    pub default_execution_interval_secs: u64,
    pub near_stoploss_execution_interval_secs: u64,
    pub near_stoploss_threshold_pct: f64,
    pub closed_execution_interval_secs: u64,

    pub alert_near_stoploss_pct: f64,
    pub alert_near_takeprofit_pct: f64,

    pub order_quantity: u64,
    pub symbol_order_quantity: BTreeMap<String, u64>,

    pub enforce_single_instance: bool,
    pub enforce_market_hours: bool,

    pub max_positions: usize,

    pub universe_selection_method: SelectionMethod,
    pub universe_size: usize,
    pub universe_fixed_stocks: Vec<String>,
    pub universe_candidate_pool: Vec<String>,
    pub universe_min_volume: f64,
    pub universe_min_market_cap: f64,
    pub universe_min_atr_pct: f64,
    pub universe_max_atr_pct: f64,
    pub universe_volume_top_n: usize,
    pub universe_exclude_management: bool,
    pub universe_cache_refresh_enabled: bool,
    pub universe_cache_refresh_on_restart: bool,
    pub universe_cache_refresh_on_market_open: bool,
    pub universe_cache_refresh_interval_minutes: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            execution_mode: Mode::DryRun,
            enable_real_trading: false,
            kill_switch: false,

            atr_period: 14,
            trend_ma_period: 50,
            adx_period: 14,
            atr_multiplier_sl: 2.0,
            atr_multiplier_tp: 3.0,
            max_loss_pct: 5.0,
            atr_spike_threshold: 2.5,
            adx_threshold: 25.0,

            allow_scale_in: false,
            enable_trailing_stop: true,
            trailing_stop_atr_multiplier: 2.0,
            trailing_stop_activation_pct: 1.0,

            enable_gap_protection: true,
            max_gap_loss_pct: 2.0,
            gap_reference: GapReference::EntryPrice,
            gap_epsilon_pct: 0.001,

            daily_max_loss_percent: 2.0,
            daily_max_trades: 3,
            max_consecutive_losses: 2,
            max_cumulative_drawdown_pct: 15.0,
            cumulative_drawdown_warning_pct: 10.0,

            order_execution_timeout_secs: 45,
            order_check_interval_secs: 2,
            emergency_timeout_multiplier: 3,

            pending_exit_backoff_minutes: 5,
            pending_exit_max_age_hours: 72,

            rate_limit_delay_secs: 0.05,

            default_execution_interval_secs: 60,
            near_stoploss_execution_interval_secs: 15,
            near_stoploss_threshold_pct: 70.0,
            closed_execution_interval_secs: 300,

            alert_near_stoploss_pct: 80.0,
            alert_near_takeprofit_pct: 80.0,

            enforce_single_instance: true,
            enforce_market_hours: true,

            max_positions: 5,

            order_quantity: 1,
            symbol_order_quantity: BTreeMap::new(),

            universe_selection_method: SelectionMethod::Fixed,
            universe_size: 5,
            universe_fixed_stocks: Vec::new(),
            universe_candidate_pool: Vec::new(),
            universe_min_volume: 1_000_000_000.0,
            universe_min_market_cap: 1_000.0,
            universe_min_atr_pct: 1.0,
            universe_max_atr_pct: 8.0,
            universe_volume_top_n: 50,
            universe_exclude_management: true,
            universe_cache_refresh_enabled: false,
            universe_cache_refresh_on_restart: false,
            universe_cache_refresh_on_market_open: false,
            universe_cache_refresh_interval_minutes: 0,
        }
    }
}

/// A config loaded from one or more layered YAML files plus env overrides,
/// along with its canonical content hash for audit logging.
#[derive(Clone, Debug)]
pub struct LoadedConfig {
    pub config: EngineConfig,
    pub content_hash: String,
    /// The fully layer-merged document, before typed deserialization —
    /// lets a caller pull out sibling sections `EngineConfig` doesn't model
    /// itself, such as [`secrets::SecretRefs`].
    pub merged_json: Value,
}

/// Loads and deep-merges YAML documents in order (later files win per-key),
/// then deserializes the merged document into [`EngineConfig`]. Mirrors the
/// teacher's `load_layered_yaml`.
pub fn load_layered_yaml(paths: &[impl AsRef<Path>]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(serde_json::Map::new());
    for path in paths {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let doc: Value = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing YAML in {}", path.display()))?;
        deep_merge(&mut merged, doc);
    }
    let config: EngineConfig = serde_json::from_value(merged.clone())
        .context("deserializing merged config into EngineConfig")?;
    let content_hash = hash_value(&merged)?;
    Ok(LoadedConfig { config, content_hash, merged_json: merged })
}

/// Recursively merges `incoming` into `base`, with `incoming` winning on
/// scalar/array collisions. Objects merge key-by-key.
pub fn deep_merge(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(incoming_map)) => {
            for (k, v) in incoming_map {
                match base_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (base_slot, incoming_value) => {
            *base_slot = incoming_value;
        }
    }
}

/// Canonicalizes `value` to a key-sorted JSON string and returns its SHA-256
/// hex digest, so identical configs always hash identically regardless of
/// key order across layered files.
pub fn hash_value(value: &Value) -> Result<String> {
    let canonical = canonicalize_json(value);
    let bytes = serde_json::to_vec(&canonical).context("serializing canonical config")?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Recursively sorts object keys so structurally-identical JSON values always
/// serialize identically.
fn canonicalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize_json(v)))
                .collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_json).collect()),
        other => other.clone(),
    }
}

/// The REAL-mode double gate (spec §9 design note): promoting to REAL
/// requires *both* `enable_real_trading` in config/env AND an explicit CLI
/// confirmation flag. Any failure falls back to DRY_RUN rather than erroring,
/// so an operator can never be surprised into live trading by a stale flag.
pub fn resolve_execution_mode(cfg: &EngineConfig, cli_confirm_real_trading: bool) -> Mode {
    match cfg.execution_mode {
        Mode::Real if cfg.enable_real_trading && cli_confirm_real_trading => Mode::Real,
        Mode::Real => Mode::DryRun,
        other => other,
    }
}
