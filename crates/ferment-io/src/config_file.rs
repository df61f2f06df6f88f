//! JSON controller configuration with periodic wholesale reload.

use ferment_core::{ConfigSnapshot, PeriodicTask, SharedConfig};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub fn is_missing_file(&self) -> bool {
        matches!(self, ConfigError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Parses a JSON object of scalars. Numbers are kept as is, booleans become
/// 1/0, anything else is skipped with a warning.
pub fn parse_snapshot(raw: &str) -> Result<ConfigSnapshot, serde_json::Error> {
    let document: BTreeMap<String, Value> = serde_json::from_str(raw)?;
    Ok(document
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Number(n) => n.as_f64().map(|v| (key, v)),
            Value::Bool(b) => Some((key, if b { 1.0 } else { 0.0 })),
            other => {
                warn!(key = %key, value = %other, "Ignoring non-scalar config value");
                None
            }
        })
        .collect())
}

pub fn load_snapshot(path: &Path) -> Result<ConfigSnapshot, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_snapshot(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// A config file bound to the shared snapshot it feeds.
pub struct ConfigFile {
    path: PathBuf,
    shared: SharedConfig,
}

impl ConfigFile {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let snapshot = load_snapshot(&path)?;
        info!(path = %path.display(), keys = snapshot.len(), "Loaded config");
        Ok(Self {
            path,
            shared: SharedConfig::new(snapshot),
        })
    }

    /// Binds `path` without reading it, serving `fallback` until the first
    /// successful reload.
    pub fn with_fallback(path: impl Into<PathBuf>, fallback: ConfigSnapshot) -> Self {
        Self {
            path: path.into(),
            shared: SharedConfig::new(fallback),
        }
    }

    pub fn shared(&self) -> SharedConfig {
        self.shared.clone()
    }

    /// Replaces the shared snapshot with the file's current content. On
    /// failure the previous snapshot stays in place.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let snapshot = load_snapshot(&self.path)?;
        debug!(path = %self.path.display(), keys = snapshot.len(), "Reloaded config");
        self.shared.replace(snapshot);
        Ok(())
    }
}

impl PeriodicTask for ConfigFile {
    fn name(&self) -> &str {
        "config"
    }

    fn tick(&mut self) {
        match self.reload() {
            Ok(()) => {}
            Err(e) if e.is_missing_file() => debug!(error = %e, "Config file absent, keeping current values"),
            Err(e) => warn!(error = %e, "Config reload failed, keeping current values"),
        }
    }
}
