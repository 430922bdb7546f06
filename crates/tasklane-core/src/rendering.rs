//! Environment and value state shared across a context lineage

use std::collections::HashMap;
use std::sync::RwLock;

/// Environment lookups and stored values used when tasks render their config
#[derive(Debug, Default)]
pub struct RenderingContext {
    env: RwLock<HashMap<String, String>>,
    values: RwLock<serde_yaml::Mapping>,
}

impl RenderingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded with an environment
    pub fn with_env(env: HashMap<String, String>) -> Self {
        Self {
            env: RwLock::new(env),
            values: RwLock::new(serde_yaml::Mapping::new()),
        }
    }

    /// Seed from the current process environment
    pub fn from_process_env() -> Self {
        Self::with_env(std::env::vars().collect())
    }

    /// Look up an environment variable
    pub fn env(&self, key: &str) -> Option<String> {
        self.env
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn set_env(&self, key: impl Into<String>, value: impl Into<String>) {
        self.env
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value.into());
    }

    /// Merge variables into the environment, overwriting existing ones
    pub fn extend_env<I>(&self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend(vars);
    }

    /// Snapshot of the environment
    pub fn env_snapshot(&self) -> HashMap<String, String> {
        self.env.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Look up a stored value
    pub fn value(&self, key: &str) -> Option<serde_yaml::Value> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn set_value(&self, key: impl Into<String>, value: serde_yaml::Value) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(serde_yaml::Value::String(key.into()), value);
    }
}
