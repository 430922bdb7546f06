//! Turn a loaded [`Config`] into populated registries

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{ConfigError, LookupError, Result};
use crate::registry::{FactoryRegistry, RegistryBuilder};
use crate::traits::{Task, Tool};
use crate::types::{TaskKind, ToolKey};

use super::types::{raw_str, Config};

/// Create shells, tools and tasks described by `config` and register them.
///
/// Tasks name their owning tool through an optional `tool` field. A task
/// whose tool is not declared under `tools` gets one created from the
/// matching factory with an empty config. Each tool is initialized with a
/// cache directory under `cache_dir` before its tasks are attached.
pub fn resolve_config(
    config: &Config,
    factories: &FactoryRegistry,
    mut builder: RegistryBuilder,
    cache_dir: &Path,
) -> Result<RegistryBuilder> {
    for shell in &config.shells {
        let raw = serde_yaml::to_value(shell).map_err(ConfigError::YamlError)?;
        let created = factories.create_shell(&shell.name, &raw)?;
        builder.add_shell(created, shell.default);
    }

    let mut tools: BTreeMap<ToolKey, Box<dyn Tool>> = BTreeMap::new();
    for (kind, raws) in &config.tools {
        let raws: Vec<serde_yaml::Value> = if raws.is_empty() {
            vec![serde_yaml::Value::Null]
        } else {
            raws.clone()
        };
        for raw in &raws {
            let key = ToolKey::new(kind.as_str(), raw_str(raw, "name").unwrap_or_default());
            if tools.contains_key(&key) {
                return Err(ConfigError::InvalidValue {
                    field: format!("tools.{kind}"),
                    message: format!("duplicate tool '{key}'"),
                }
                .into());
            }
            let tool = factories.create_tool(key.clone(), raw)?;
            tools.insert(key, tool);
        }
    }

    let mut tasks: BTreeMap<ToolKey, Vec<Arc<dyn Task>>> = BTreeMap::new();
    for (group, raws) in &config.tasks {
        let (tool_kind, task_kind) = group.split_once(':').ok_or_else(|| ConfigError::InvalidValue {
            field: format!("tasks.{group}"),
            message: "Task group must be '<tool-kind>:<task-kind>'".to_string(),
        })?;
        for raw in raws {
            let tool = ToolKey::new(tool_kind, raw_str(raw, "tool").unwrap_or_default());
            let task = factories.create_task(tool.clone(), TaskKind::from(task_kind), raw)?;
            debug!(tool = %tool, task = %task.key(), "task created");
            tasks.entry(tool).or_default().push(task);
        }
    }

    for key in tasks.keys() {
        if tools.contains_key(key) {
            continue;
        }
        if !factories.has_tool(key.kind.as_str()) {
            return Err(LookupError::ToolNotFound(key.to_string()).into());
        }
        debug!(tool = %key, "creating implicit tool");
        let tool = factories.create_tool(key.clone(), &serde_yaml::Value::Null)?;
        tools.insert(key.clone(), tool);
    }

    for (key, mut tool) in tools {
        let name = if key.name.is_empty() {
            "default"
        } else {
            key.name.as_str()
        };
        tool.init(&cache_dir.join(key.kind.as_str()).join(name))?;

        let owned = tasks.remove(&key).unwrap_or_default();
        tool.resolve_tasks(owned.clone())?;
        builder.add_tool(Arc::from(tool))?;
        for task in owned {
            builder.add_task(task)?;
        }
    }

    info!(tools = config.tools.len(), tasks = config.task_count(), "config resolved");
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::context::Context;
    use crate::error::TasklaneError;
    use crate::exec::{HookSpec, TaskExecSpec, TaskExecStage, TaskMatrixExecOptions};
    use crate::matrix::MatrixEntry;
    use crate::rendering::RenderingContext;
    use crate::traits::{Shell, ShellCommand};
    use crate::types::{TaskKey, TaskName, ToolKind, ToolName};

    struct StubTool {
        key: ToolKey,
        cache_dir: Arc<Mutex<Vec<PathBuf>>>,
        tasks: Vec<Arc<dyn Task>>,
    }

    #[async_trait]
    impl Tool for StubTool {
        fn kind(&self) -> &ToolKind {
            &self.key.kind
        }

        fn name(&self) -> &ToolName {
            &self.key.name
        }

        fn init(&mut self, cache_dir: &Path) -> Result<()> {
            self.cache_dir.lock().unwrap().push(cache_dir.to_path_buf());
            Ok(())
        }

        fn resolve_tasks(&mut self, tasks: Vec<Arc<dyn Task>>) -> Result<()> {
            self.tasks = tasks;
            Ok(())
        }

        fn task(&self, key: &TaskKey) -> Option<Arc<dyn Task>> {
            self.tasks.iter().find(|t| &t.key() == key).cloned()
        }

        fn tasks(&self) -> Vec<Arc<dyn Task>> {
            self.tasks.clone()
        }

        async fn run(&self, _ctx: &mut Context) -> Result<()> {
            Ok(())
        }
    }

    struct StubTask {
        tool: ToolKey,
        kind: TaskKind,
        name: TaskName,
    }

    impl Task for StubTask {
        fn tool_kind(&self) -> &ToolKind {
            &self.tool.kind
        }

        fn tool_name(&self) -> &ToolName {
            &self.tool.name
        }

        fn kind(&self) -> &TaskKind {
            &self.kind
        }

        fn name(&self) -> &TaskName {
            &self.name
        }

        fn matrix_specs(&self, _rc: &RenderingContext) -> Result<Vec<MatrixEntry>> {
            Ok(vec![MatrixEntry::new()])
        }

        fn exec_specs(
            &self,
            _ctx: &Context,
            _options: &TaskMatrixExecOptions,
        ) -> Result<Vec<TaskExecSpec>> {
            Ok(Vec::new())
        }

        fn hook_exec_specs(&self, _ctx: &Context, _stage: TaskExecStage) -> Result<Vec<HookSpec>> {
            Ok(Vec::new())
        }
    }

    struct StubShell(String);

    impl Shell for StubShell {
        fn name(&self) -> &str {
            &self.0
        }

        fn exec_spec(&self, command: &[String], _is_file_path: bool) -> Result<ShellCommand> {
            Ok(ShellCommand {
                env: Default::default(),
                command: command.to_vec(),
            })
        }
    }

    fn factories(inits: Arc<Mutex<Vec<PathBuf>>>) -> FactoryRegistry {
        let mut factories = FactoryRegistry::new();
        factories
            .register_tool("stub", move |key, _| {
                Ok(Box::new(StubTool {
                    key,
                    cache_dir: inits.clone(),
                    tasks: Vec::new(),
                }) as Box<dyn Tool>)
            })
            .unwrap();
        factories
            .register_task("stub:.*", |tool, kind, raw| {
                Ok(Arc::new(StubTask {
                    tool,
                    kind,
                    name: raw_str(raw, "name").unwrap_or_default().into(),
                }) as Arc<dyn Task>)
            })
            .unwrap();
        factories
            .register_shell(".*", |name, _| Ok(Arc::new(StubShell(name.to_string())) as Arc<dyn Shell>))
            .unwrap();
        factories
    }

    fn parse(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_resolve_tools_tasks_and_shells() {
        let inits = Arc::new(Mutex::new(Vec::new()));
        let config = parse(
            r#"
shells:
  - name: sh
  - name: bash
    default: true
tools:
  stub:
    - name: a
tasks:
  stub:build:
    - name: app
      tool: a
    - name: lib
"#,
        );

        let registries = resolve_config(
            &config,
            &factories(inits.clone()),
            RegistryBuilder::new(),
            Path::new("/cache"),
        )
        .unwrap()
        .freeze();

        assert_eq!(registries.tools().len(), 2);
        assert_eq!(registries.tasks().len(), 2);
        assert!(registries
            .tasks()
            .get(&ToolKey::new("stub", "a"), &TaskKey::new("build", "app"))
            .is_some());
        assert!(registries
            .tasks()
            .get(&ToolKey::new("stub", ""), &TaskKey::new("build", "lib"))
            .is_some());
        assert_eq!(registries.shells().get(None).unwrap().name(), "bash");

        let tool = registries.tools().get(&ToolKey::new("stub", "a")).unwrap();
        assert_eq!(tool.tasks().len(), 1);

        let mut inits = inits.lock().unwrap().clone();
        inits.sort();
        assert_eq!(
            inits,
            vec![
                PathBuf::from("/cache/stub/a"),
                PathBuf::from("/cache/stub/default")
            ]
        );
    }

    #[test]
    fn test_unknown_tool_kind() {
        let config = parse("tasks:\n  golang:build:\n    - name: app\n");
        let result = resolve_config(
            &config,
            &factories(Arc::default()),
            RegistryBuilder::new(),
            Path::new("/cache"),
        );
        assert!(matches!(
            result,
            Err(TasklaneError::Lookup(LookupError::FactoryNotFound { .. }))
        ));
    }

    #[test]
    fn test_duplicate_task_is_error() {
        let config = parse("tasks:\n  stub:build:\n    - name: app\n    - name: app\n");
        let result = resolve_config(
            &config,
            &factories(Arc::default()),
            RegistryBuilder::new(),
            Path::new("/cache"),
        );
        assert!(matches!(result, Err(TasklaneError::Config(_))));
    }
}
