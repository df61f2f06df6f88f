//! Scalar key/value configuration as consumed by the control core.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Keyed numeric lookup. Absence is not an error; callers pick the policy.
pub trait ConfigSource: Send + Sync {
    fn get(&self, key: &str) -> Option<f64>;

    fn get_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).unwrap_or(default)
    }
}

/// Immutable set of values loaded in one go.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSnapshot {
    values: HashMap<String, f64>,
}

impl ConfigSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for ConfigSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl ConfigSource for ConfigSnapshot {
    fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }
}

/// Snapshot holder that is replaced wholesale on reload. Readers keep the
/// snapshot they already hold; nothing is ever merged.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    current: Arc<RwLock<Arc<ConfigSnapshot>>>,
}

impl SharedConfig {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn replace(&self, snapshot: ConfigSnapshot) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }
}

impl ConfigSource for SharedConfig {
    fn get(&self, key: &str) -> Option<f64> {
        self.snapshot().get(key)
    }
}
