//! Tool, task, shell and renderer registries
//!
//! Registries are populated single-threaded through a [`RegistryBuilder`]
//! during config resolution and sealed with [`RegistryBuilder::freeze`]. The
//! frozen [`Registries`] has no mutating API, so it can be shared across
//! concurrently running task contexts without locking.
//!
//! [`FactoryRegistry`] maps `(capability, pattern)` to constructor functions;
//! config resolution queries it once per configured tool, task and shell.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::error::{ConfigError, LookupError, Result};
use crate::traits::{Renderer, Shell, Task, Tool};
use crate::types::{TaskKey, TaskKind, ToolKey};

/// Tools by key
#[derive(Default)]
pub struct ToolManager {
    tools: BTreeMap<ToolKey, Arc<dyn Tool>>,
}

impl ToolManager {
    pub fn get(&self, key: &ToolKey) -> Option<Arc<dyn Tool>> {
        let result = self.tools.get(key).cloned();
        debug!(tool = %key, found = result.is_some(), "tool registry lookup");
        result
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ToolKey> {
        self.tools.keys()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Tasks grouped by owning tool
#[derive(Default)]
pub struct TaskManager {
    tasks: BTreeMap<ToolKey, BTreeMap<TaskKey, Arc<dyn Task>>>,
}

impl TaskManager {
    pub fn get(&self, tool: &ToolKey, task: &TaskKey) -> Option<Arc<dyn Task>> {
        let result = self.tasks.get(tool).and_then(|t| t.get(task)).cloned();
        debug!(tool = %tool, task = %task, found = result.is_some(), "task registry lookup");
        result
    }

    /// Tasks of one tool in key order
    pub fn for_tool(&self, tool: &ToolKey) -> Vec<Arc<dyn Task>> {
        self.tasks
            .get(tool)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Task>> {
        self.tasks.values().flat_map(|t| t.values())
    }

    pub fn len(&self) -> usize {
        self.tasks.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shells by name, with an optional default
#[derive(Default)]
pub struct ShellManager {
    shells: Vec<Arc<dyn Shell>>,
    default: Option<String>,
}

impl ShellManager {
    /// Get a shell by name; `None` or an empty name selects the default
    pub fn get(&self, name: Option<&str>) -> Option<Arc<dyn Shell>> {
        let name = match name.filter(|n| !n.is_empty()) {
            Some(n) => n,
            None => return self.default_shell(),
        };
        let result = self.shells.iter().find(|s| s.name() == name).cloned();
        debug!(shell = name, found = result.is_some(), "shell registry lookup");
        result
    }

    /// The configured default, else the first registered shell
    pub fn default_shell(&self) -> Option<Arc<dyn Shell>> {
        match &self.default {
            Some(name) => self.shells.iter().find(|s| s.name() == name).cloned(),
            None => self.shells.first().cloned(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.shells.iter().map(|s| s.name()).collect()
    }
}

/// Renderers by name
#[derive(Default)]
pub struct RendererManager {
    renderers: Vec<Arc<dyn Renderer>>,
}

impl RendererManager {
    pub fn get(&self, name: &str) -> Option<Arc<dyn Renderer>> {
        let result = self.renderers.iter().find(|r| r.name() == name).cloned();
        debug!(renderer = name, found = result.is_some(), "renderer registry lookup");
        result
    }

    pub fn names(&self) -> Vec<&str> {
        self.renderers.iter().map(|r| r.name()).collect()
    }
}

/// Frozen registries, shared by every context derived from the root
#[derive(Default)]
pub struct Registries {
    tools: ToolManager,
    tasks: TaskManager,
    shells: ShellManager,
    renderers: RendererManager,
}

impl Registries {
    pub fn tools(&self) -> &ToolManager {
        &self.tools
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    pub fn shells(&self) -> &ShellManager {
        &self.shells
    }

    pub fn renderers(&self) -> &RendererManager {
        &self.renderers
    }
}

impl fmt::Debug for Registries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registries")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("tasks", &self.tasks.len())
            .field("shells", &self.shells.names())
            .field("renderers", &self.renderers.names())
            .finish()
    }
}

/// Mutable registries used during config resolution
#[derive(Default)]
pub struct RegistryBuilder {
    inner: Registries,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; keys must be unique
    pub fn add_tool(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let key = tool.key();
        if self.inner.tools.tools.contains_key(&key) {
            return Err(ConfigError::InvalidValue {
                field: format!("tools.{}", key.kind),
                message: format!("duplicate tool '{key}'"),
            }
            .into());
        }
        debug!(tool = %key, "registering tool");
        self.inner.tools.tools.insert(key, tool);
        Ok(())
    }

    /// Register a task under its owning tool; keys must be unique per tool
    pub fn add_task(&mut self, task: Arc<dyn Task>) -> Result<()> {
        let tool = task.tool_key();
        let key = task.key();
        let tasks = self.inner.tasks.tasks.entry(tool.clone()).or_default();
        if tasks.contains_key(&key) {
            return Err(ConfigError::InvalidValue {
                field: format!("tasks.{}:{}", tool.kind, key.kind),
                message: format!("duplicate task '{key}' for tool '{tool}'"),
            }
            .into());
        }
        debug!(tool = %tool, task = %key, "registering task");
        tasks.insert(key, task);
        Ok(())
    }

    /// Register a shell, replacing any shell with the same name
    pub fn add_shell(&mut self, shell: Arc<dyn Shell>, default: bool) {
        let name = shell.name().to_string();
        debug!(shell = %name, default, "registering shell");
        self.inner.shells.shells.retain(|s| s.name() != name);
        self.inner.shells.shells.push(shell);
        if default {
            self.inner.shells.default = Some(name);
        }
    }

    /// Register a renderer, replacing any renderer with the same name
    pub fn add_renderer(&mut self, renderer: Arc<dyn Renderer>) {
        let name = renderer.name().to_string();
        debug!(renderer = %name, "registering renderer");
        self.inner.renderers.renderers.retain(|r| r.name() != name);
        self.inner.renderers.renderers.push(renderer);
    }

    pub fn has_tool(&self, key: &ToolKey) -> bool {
        self.inner.tools.tools.contains_key(key)
    }

    /// Seal the registries; nothing can be registered afterwards
    pub fn freeze(self) -> Arc<Registries> {
        debug!(
            tools = self.inner.tools.len(),
            tasks = self.inner.tasks.len(),
            "registries frozen"
        );
        Arc::new(self.inner)
    }
}

/// What a factory constructs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Tool,
    Task,
    Shell,
    Renderer,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Task => "task",
            Self::Shell => "shell",
            Self::Renderer => "renderer",
        }
    }
}

/// Builds a tool from its key and raw config
pub type ToolFactory =
    Arc<dyn Fn(ToolKey, &serde_yaml::Value) -> Result<Box<dyn Tool>> + Send + Sync>;

/// Builds a task from its owning tool, task kind and raw config
pub type TaskFactory =
    Arc<dyn Fn(ToolKey, TaskKind, &serde_yaml::Value) -> Result<Arc<dyn Task>> + Send + Sync>;

/// Builds a shell from its name and raw config
pub type ShellFactory =
    Arc<dyn Fn(&str, &serde_yaml::Value) -> Result<Arc<dyn Shell>> + Send + Sync>;

/// Builds a renderer from its name and raw config
pub type RendererFactory =
    Arc<dyn Fn(&str, &serde_yaml::Value) -> Result<Arc<dyn Renderer>> + Send + Sync>;

struct Entry<F> {
    pattern: Regex,
    factory: F,
}

/// Pattern-keyed constructor table, populated at start-up
#[derive(Default)]
pub struct FactoryRegistry {
    tools: Vec<Entry<ToolFactory>>,
    tasks: Vec<Entry<TaskFactory>>,
    shells: Vec<Entry<ShellFactory>>,
    renderers: Vec<Entry<RendererFactory>>,
}

fn anchored(capability: Capability, pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
        ConfigError::InvalidValue {
            field: format!("{} factory pattern", capability.as_str()),
            message: e.to_string(),
        }
        .into()
    })
}

fn lookup<'a, F>(
    entries: &'a [Entry<F>],
    capability: Capability,
    key: &str,
) -> std::result::Result<&'a F, LookupError> {
    let found = entries.iter().find(|e| e.pattern.is_match(key));
    debug!(
        capability = capability.as_str(),
        key,
        found = found.is_some(),
        "factory lookup"
    );
    found
        .map(|e| &e.factory)
        .ok_or_else(|| LookupError::FactoryNotFound {
            capability: capability.as_str().to_string(),
            key: key.to_string(),
        })
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool factory for tool kinds matching `pattern`
    pub fn register_tool<F>(&mut self, pattern: &str, factory: F) -> Result<()>
    where
        F: Fn(ToolKey, &serde_yaml::Value) -> Result<Box<dyn Tool>> + Send + Sync + 'static,
    {
        self.tools.push(Entry {
            pattern: anchored(Capability::Tool, pattern)?,
            factory: Arc::new(factory),
        });
        Ok(())
    }

    /// Register a task factory for `<tool-kind>:<task-kind>` keys matching `pattern`
    pub fn register_task<F>(&mut self, pattern: &str, factory: F) -> Result<()>
    where
        F: Fn(ToolKey, TaskKind, &serde_yaml::Value) -> Result<Arc<dyn Task>>
            + Send
            + Sync
            + 'static,
    {
        self.tasks.push(Entry {
            pattern: anchored(Capability::Task, pattern)?,
            factory: Arc::new(factory),
        });
        Ok(())
    }

    /// Register a shell factory for shell names matching `pattern`
    pub fn register_shell<F>(&mut self, pattern: &str, factory: F) -> Result<()>
    where
        F: Fn(&str, &serde_yaml::Value) -> Result<Arc<dyn Shell>> + Send + Sync + 'static,
    {
        self.shells.push(Entry {
            pattern: anchored(Capability::Shell, pattern)?,
            factory: Arc::new(factory),
        });
        Ok(())
    }

    /// Register a renderer factory for renderer names matching `pattern`
    pub fn register_renderer<F>(&mut self, pattern: &str, factory: F) -> Result<()>
    where
        F: Fn(&str, &serde_yaml::Value) -> Result<Arc<dyn Renderer>> + Send + Sync + 'static,
    {
        self.renderers.push(Entry {
            pattern: anchored(Capability::Renderer, pattern)?,
            factory: Arc::new(factory),
        });
        Ok(())
    }

    pub fn has_tool(&self, kind: &str) -> bool {
        self.tools.iter().any(|e| e.pattern.is_match(kind))
    }

    pub fn create_tool(&self, key: ToolKey, config: &serde_yaml::Value) -> Result<Box<dyn Tool>> {
        let factory = lookup(&self.tools, Capability::Tool, key.kind.as_str())?;
        factory(key, config)
    }

    pub fn create_task(
        &self,
        tool: ToolKey,
        kind: TaskKind,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Task>> {
        let group = format!("{}:{}", tool.kind, kind);
        let factory = lookup(&self.tasks, Capability::Task, &group)?;
        factory(tool, kind, config)
    }

    pub fn create_shell(&self, name: &str, config: &serde_yaml::Value) -> Result<Arc<dyn Shell>> {
        let factory = lookup(&self.shells, Capability::Shell, name)?;
        factory(name, config)
    }

    pub fn create_renderer(
        &self,
        name: &str,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Renderer>> {
        let factory = lookup(&self.renderers, Capability::Renderer, name)?;
        factory(name, config)
    }
}
