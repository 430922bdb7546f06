//! Tasklane Tasks - Task orchestration engine
//!
//! This crate provides the lifecycle scheduler that fans tasks out over their
//! matrix, the exec-spec runner, a tokio process executor, and the built-in
//! shells, renderer and workflow tool.

pub mod process;
pub mod render;
pub mod reporter;
pub mod scheduler;
pub mod shell;
pub mod steps;
pub mod tool;
pub mod workflow;

use std::sync::Arc;

use tasklane_core::{FactoryRegistry, Renderer, Result, Shell, Task, Tool};

pub use process::TokioProcessExecutor;
pub use render::{builtin_renderers, EnvRenderer};
pub use reporter::{CollectingReporter, TaskEvent, TaskReporter, TaskReporterRegistry, TracingReporter};
pub use scheduler::{EntryOutcome, TaskScheduler};
pub use shell::{builtin_shells, PosixShell, SystemShell};
pub use steps::run_exec_specs;
pub use tool::{WorkflowTool, WORKFLOW_KIND};
pub use workflow::WorkflowTask;

/// Register factories for the built-in tool, task, shells and renderer
pub fn register_builtins(
    factories: &mut FactoryRegistry,
    reporter: Arc<dyn TaskReporter>,
) -> Result<()> {
    factories.register_tool(WORKFLOW_KIND, move |key, raw| {
        Ok(Box::new(WorkflowTool::from_config(key, raw, reporter.clone())?) as Box<dyn Tool>)
    })?;
    factories.register_task(&format!("{WORKFLOW_KIND}:run"), |tool, kind, raw| {
        Ok(Arc::new(WorkflowTask::from_config(tool, kind, raw)?) as Arc<dyn Task>)
    })?;
    factories.register_shell("sh", |name, _| Ok(Arc::new(SystemShell::new(name)) as Arc<dyn Shell>))?;
    factories.register_shell("[A-Za-z0-9_.-]+", |name, raw| {
        Ok(Arc::new(PosixShell::from_config(name, raw)) as Arc<dyn Shell>)
    })?;
    factories.register_renderer("env", |_, _| Ok(Arc::new(EnvRenderer) as Arc<dyn Renderer>))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use tasklane_core::config::resolve_config;
    use tasklane_core::{Config, RegistryBuilder, TaskKey, ToolKey};

    #[test]
    fn test_register_builtins_resolves_config() {
        let mut factories = FactoryRegistry::new();
        register_builtins(&mut factories, Arc::new(CollectingReporter::default())).unwrap();

        let config: Config = serde_yaml::from_str(
            r#"
shells:
  - name: sh
  - name: bash
    default: true
tasks:
  workflow:run:
    - name: build
      steps:
        - run: echo hi
    - name: notify
      tool: ci
      steps:
        - cmd: [echo, done]
"#,
        )
        .unwrap();

        let registries = resolve_config(
            &config,
            &factories,
            RegistryBuilder::new(),
            Path::new(".tasklane/cache"),
        )
        .unwrap()
        .freeze();

        assert_eq!(registries.tools().len(), 2);
        assert!(registries
            .tasks()
            .get(&ToolKey::new("workflow", "ci"), &TaskKey::new("run", "notify"))
            .is_some());
        assert_eq!(registries.shells().get(None).unwrap().name(), "bash");
        assert_eq!(registries.shells().get(Some("sh")).unwrap().name(), "sh");
    }

    #[test]
    fn test_unknown_task_kind() {
        let mut factories = FactoryRegistry::new();
        register_builtins(&mut factories, Arc::new(CollectingReporter::default())).unwrap();
        let raw: serde_yaml::Value = serde_yaml::from_str("name: a").unwrap();
        assert!(factories
            .create_task(ToolKey::new("workflow", ""), "deploy".into(), &raw)
            .is_err());
    }
}
