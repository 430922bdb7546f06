//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::context::default_workers;

/// Main configuration for Tasklane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Version of the config schema
    #[serde(rename = "$schema")]
    pub schema: Option<String>,

    /// Global worker ceiling
    pub workers: usize,

    /// Cancel pending matrix entries on the first failure
    pub fail_fast: bool,

    /// Output coloring
    pub color: ColorMode,

    /// Cache directory handed to tools (relative to the config file)
    pub cache_dir: PathBuf,

    /// Environment variables added to the rendering context
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Shell configurations
    #[serde(default)]
    pub shells: Vec<ShellConfig>,

    /// Tool configurations, keyed by tool kind
    #[serde(default)]
    pub tools: BTreeMap<String, Vec<serde_yaml::Value>>,

    /// Task configurations, keyed by `<tool-kind>:<task-kind>`
    #[serde(default)]
    pub tasks: BTreeMap<String, Vec<serde_yaml::Value>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema: None,
            workers: default_workers(),
            fail_fast: true,
            color: ColorMode::default(),
            cache_dir: PathBuf::from(".tasklane/cache"),
            env: HashMap::new(),
            shells: Vec::new(),
            tools: BTreeMap::new(),
            tasks: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Number of configured tasks across all groups
    pub fn task_count(&self) -> usize {
        self.tasks.values().map(Vec::len).sum()
    }
}

/// When to color output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Color when writing to a terminal
    #[default]
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

/// A shell to register
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell name (e.g., "sh", "bash")
    pub name: String,

    /// Use as the default shell
    pub default: bool,

    /// Program to run instead of the name
    pub program: Option<String>,
}

/// Pull a string field out of a raw tool/task config
pub fn raw_str<'a>(raw: &'a serde_yaml::Value, field: &str) -> Option<&'a str> {
    raw.get(field).and_then(serde_yaml::Value::as_str)
}
