//! Command handlers for the `kte` binary. Shared config-loading helpers
//! live here; command-specific logic lives in the submodules.

pub mod backtest;
pub mod trade;
pub mod verify;

use anyhow::{Context, Result};
use kte_config::secrets::SecretRefs;
use kte_config::EngineConfig;
use kte_domain::{SelectionMethod, Symbol};

/// Loads the layered config and, when the caller passed explicit
/// `--symbol` flags, overrides the universe with a fixed selection of
/// exactly those symbols — matching how an operator expects `--symbol` to
/// behave regardless of what the config file's universe section says.
/// Also returns the `secrets:` section of the same merged document, since
/// [`SecretRefs`] is a sibling of [`EngineConfig`] rather than one of its
/// fields (a config file never embeds raw credentials, only env-var names).
pub fn load_config(config_paths: &[String], symbols: &[String]) -> Result<(EngineConfig, SecretRefs)> {
    let loaded = kte_config::load_layered_yaml(config_paths).context("loading layered config")?;
    let mut cfg = loaded.config;
    if !symbols.is_empty() {
        cfg.universe_selection_method = SelectionMethod::Fixed;
        cfg.universe_fixed_stocks = symbols.to_vec();
    }
    let secret_refs: SecretRefs = loaded
        .merged_json
        .get("secrets")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .context("parsing secrets section")?
        .unwrap_or_default();
    Ok((cfg, secret_refs))
}

pub fn to_symbols(raw: &[String]) -> Vec<Symbol> {
    raw.iter().map(|s| Symbol::new(s)).collect()
}
