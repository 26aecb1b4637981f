//! Configuration loading and telemetry factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use gsatprep_core::traits::{KeyValueStore, SystemClock};

use crate::backup::SummaryBackup;
use crate::sink::BackgroundSink;
use crate::transport::HttpTransport;

/// Remote analytics settings.
///
/// Note: Custom Debug impl masks the API key to prevent accidental exposure in logs.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Base URL; summaries are posted to `{endpoint}/sessions`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bearer token, may reference `${VAR}`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl std::fmt::Debug for TelemetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Top-level gsatprep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GsatConfig {
    /// Directory holding progress snapshots and history.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// Directory holding answer-key TOML files.
    #[serde(default = "default_keys_dir")]
    pub keys_dir: PathBuf,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./.gsat-store")
}
fn default_keys_dir() -> PathBuf {
    PathBuf::from("./keys")
}

impl Default for GsatConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            keys_dir: default_keys_dir(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `gsat.toml` in the current directory
/// 2. `~/.config/gsatprep/config.toml`
///
/// Environment variable override: `GSAT_STORE_DIR`.
pub fn load_config() -> Result<GsatConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<GsatConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("gsat.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<GsatConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => GsatConfig::default(),
    };

    if let Ok(dir) = std::env::var("GSAT_STORE_DIR") {
        if !dir.is_empty() {
            config.store_dir = PathBuf::from(dir);
        }
    }

    config.telemetry.endpoint = config.telemetry.endpoint.as_deref().map(resolve_env_vars);
    config.telemetry.api_key = config.telemetry.api_key.as_deref().map(resolve_env_vars);

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("gsatprep"))
}

/// Create the background telemetry sink, or `None` when telemetry is off.
///
/// Undelivered summaries are backed up in `store`. Must be called from
/// within a tokio runtime.
pub fn create_sink(
    config: &TelemetryConfig,
    store: Arc<dyn KeyValueStore>,
) -> Result<Option<Arc<BackgroundSink<HttpTransport>>>> {
    if !config.enabled {
        return Ok(None);
    }
    let Some(endpoint) = config.endpoint.as_deref().filter(|e| !e.trim().is_empty()) else {
        tracing::warn!("telemetry enabled but no endpoint configured");
        return Ok(None);
    };

    let transport = HttpTransport::new(endpoint, config.api_key.clone())?;
    let handle = Handle::try_current().context("telemetry needs a tokio runtime")?;
    let backup = SummaryBackup::new(store, Arc::new(SystemClock));
    Ok(Some(Arc::new(
        BackgroundSink::new(transport, handle).with_backup(backup),
    )))
}
