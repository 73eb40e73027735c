//! Secrets resolution (grounded on the teacher's `mqk-config::secrets`):
//! config/env files store the *name* of an environment variable, never the
//! value, and [`ResolvedSecrets`] resolves each one exactly once at startup.
//! `Debug` is hand-implemented to redact every resolved value.

use std::fmt;

use anyhow::{anyhow, Result};
use kte_domain::Mode;
use serde::Deserialize;

const REDACTED: &str = "<REDACTED>";

/// The env-var *names* a config file may declare — never the secret values
/// themselves.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SecretRefs {
    pub paper_app_key_env: Option<String>,
    pub paper_app_secret_env: Option<String>,
    pub real_app_key_env: Option<String>,
    pub real_app_secret_env: Option<String>,
    pub notifier_webhook_url_env: Option<String>,
}

/// Secrets resolved for one run, keyed by the active [`Mode`]. PAPER and REAL
/// credentials are resolved into distinct fields so a client bound to PAPER
/// can never be handed a REAL key (spec §4.2: the broker client never
/// auto-upgrades mode).
#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    pub broker_app_key: String,
    pub broker_app_secret: String,
    pub notifier_webhook_url: Option<String>,
}

impl fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("broker_app_key", &REDACTED)
            .field("broker_app_secret", &REDACTED)
            .field(
                "notifier_webhook_url",
                &self.notifier_webhook_url.as_ref().map(|_| REDACTED),
            )
            .finish()
    }
}

fn read_env(var_name: &str) -> Result<String> {
    std::env::var(var_name).map_err(|_| anyhow!("missing required env var: {var_name}"))
}

/// Resolves secrets for `mode`. PAPER and DRY_RUN accept placeholder paper
/// credentials; REAL requires the real app key/secret to be present and
/// non-empty. The notifier webhook is optional in every mode.
pub fn resolve_secrets_for_mode(refs: &SecretRefs, mode: Mode) -> Result<ResolvedSecrets> {
    let (key_env, secret_env) = match mode {
        Mode::Real => (
            refs.real_app_key_env
                .as_deref()
                .ok_or_else(|| anyhow!("real_app_key_env is required for REAL mode"))?,
            refs.real_app_secret_env
                .as_deref()
                .ok_or_else(|| anyhow!("real_app_secret_env is required for REAL mode"))?,
        ),
        Mode::Paper | Mode::DryRun => (
            refs.paper_app_key_env
                .as_deref()
                .ok_or_else(|| anyhow!("paper_app_key_env is required for PAPER/DRY_RUN mode"))?,
            refs.paper_app_secret_env.as_deref().ok_or_else(|| {
                anyhow!("paper_app_secret_env is required for PAPER/DRY_RUN mode")
            })?,
        ),
    };

    let broker_app_key = read_env(key_env)?;
    let broker_app_secret = read_env(secret_env)?;
    if broker_app_key.is_empty() || broker_app_secret.is_empty() {
        return Err(anyhow!("resolved broker credentials must be non-empty"));
    }

    let notifier_webhook_url = match &refs.notifier_webhook_url_env {
        Some(var_name) => std::env::var(var_name).ok().filter(|v| !v.is_empty()),
        None => None,
    };

    Ok(ResolvedSecrets {
        broker_app_key,
        broker_app_secret,
        notifier_webhook_url,
    })
}
