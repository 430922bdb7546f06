//! Workflow tool: owns config-declared tasks and drives them through the
//! scheduler

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use tasklane_core::error::{ConfigError, LookupError};
use tasklane_core::{Context, Result, Task, TaskKey, Tool, ToolKey, ToolKind, ToolName};

use crate::reporter::TaskReporter;
use crate::scheduler::{task_label, TaskScheduler};

/// Tool kind served by [`WorkflowTool`]
pub const WORKFLOW_KIND: &str = "workflow";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct WorkflowToolConfig {
    /// Consumed during config resolution to build the tool key
    #[serde(rename = "name")]
    _name: String,
    /// Overrides the color assigned to this tool's output
    color: Option<u8>,
}

/// Runs its tasks with a [`TaskScheduler`]
pub struct WorkflowTool {
    key: ToolKey,
    color: Option<u8>,
    cache_dir: Option<PathBuf>,
    tasks: BTreeMap<TaskKey, Arc<dyn Task>>,
    scheduler: TaskScheduler,
}

impl WorkflowTool {
    pub fn new(key: ToolKey, reporter: Arc<dyn TaskReporter>) -> Self {
        Self {
            key,
            color: None,
            cache_dir: None,
            tasks: BTreeMap::new(),
            scheduler: TaskScheduler::new(reporter),
        }
    }

    /// Build from a raw `tools.workflow` entry; `null` means defaults
    pub fn from_config(
        key: ToolKey,
        raw: &serde_yaml::Value,
        reporter: Arc<dyn TaskReporter>,
    ) -> Result<Self> {
        let config: WorkflowToolConfig = if raw.is_null() {
            WorkflowToolConfig::default()
        } else {
            serde_yaml::from_value(raw.clone()).map_err(|e| ConfigError::InvalidValue {
                field: format!("tools.{}", key.kind),
                message: e.to_string(),
            })?
        };
        let mut tool = Self::new(key, reporter);
        tool.color = config.color;
        Ok(tool)
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }
}

#[async_trait]
impl Tool for WorkflowTool {
    fn kind(&self) -> &ToolKind {
        &self.key.kind
    }

    fn name(&self) -> &ToolName {
        &self.key.name
    }

    fn init(&mut self, cache_dir: &Path) -> Result<()> {
        debug!(tool = %self.key, cache_dir = %cache_dir.display(), "workflow tool initialized");
        self.cache_dir = Some(cache_dir.to_path_buf());
        Ok(())
    }

    fn resolve_tasks(&mut self, tasks: Vec<Arc<dyn Task>>) -> Result<()> {
        for task in tasks {
            if task.tool_key() != self.key {
                return Err(ConfigError::InvalidValue {
                    field: format!("tasks.{}:{}", task.tool_kind(), task.kind()),
                    message: format!(
                        "task '{}' belongs to tool '{}', not '{}'",
                        task.key(),
                        task.tool_key(),
                        self.key
                    ),
                }
                .into());
            }
            self.tasks.insert(task.key(), task);
        }
        Ok(())
    }

    fn task(&self, key: &TaskKey) -> Option<Arc<dyn Task>> {
        self.tasks.get(key).cloned()
    }

    fn tasks(&self) -> Vec<Arc<dyn Task>> {
        self.tasks.values().cloned().collect()
    }

    async fn run(&self, ctx: &mut Context) -> Result<()> {
        let key = ctx
            .current_task_key()
            .cloned()
            .ok_or_else(|| tasklane_core::TasklaneError::other("no current task set"))?;
        let task = self.task(&key).ok_or_else(|| LookupError::TaskNotFound {
            tool: self.key.to_string(),
            task: key.to_string(),
        })?;

        let label = task_label(&*task);
        ctx.set_output_prefix(format!("{label} "));
        if ctx.color_output() {
            ctx.set_output_color(self.color.unwrap_or_else(|| color_for(&label)));
        }
        self.scheduler.run(ctx).await
    }
}

/// Stable ANSI color (1-6) for a label
pub fn color_for(label: &str) -> u8 {
    let hash = label
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
    (hash % 6) as u8 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    use tasklane_core::{RegistryBuilder, RunOptions, TaskExecState};

    use crate::reporter::CollectingReporter;
    use crate::steps::tests::ScriptedExecutor;
    use crate::workflow::WorkflowTask;

    fn workflow_task(tool: &ToolKey, yaml: &str) -> Arc<dyn Task> {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        Arc::new(WorkflowTask::from_config(tool.clone(), "run".into(), &raw).unwrap())
    }

    #[test]
    fn test_color_for_is_stable() {
        assert_eq!(color_for("workflow:run:build"), color_for("workflow:run:build"));
        for label in ["a", "b", "workflow:run:test", ""] {
            assert!((1..=6).contains(&color_for(label)));
        }
    }

    #[test]
    fn test_resolve_tasks_rejects_foreign_task() {
        let reporter = Arc::new(CollectingReporter::default());
        let mut tool = WorkflowTool::new(ToolKey::new("workflow", ""), reporter);
        let foreign = workflow_task(&ToolKey::new("workflow", "other"), "name: a");
        assert!(tool.resolve_tasks(vec![foreign]).is_err());
    }

    #[test]
    fn test_from_config() {
        let reporter: Arc<dyn TaskReporter> = Arc::new(CollectingReporter::default());
        let raw: serde_yaml::Value = serde_yaml::from_str("name: ci\ncolor: 4").unwrap();
        let tool = WorkflowTool::from_config(ToolKey::new("workflow", "ci"), &raw, reporter.clone())
            .unwrap();
        assert_eq!(tool.color, Some(4));

        let raw: serde_yaml::Value = serde_yaml::from_str("bogus: 1").unwrap();
        assert!(WorkflowTool::from_config(ToolKey::new("workflow", ""), &raw, reporter).is_err());
    }

    #[tokio::test]
    async fn test_run_sets_prefix_and_runs_steps() {
        let reporter = Arc::new(CollectingReporter::default());
        let key = ToolKey::new("workflow", "");
        let mut tool = WorkflowTool::new(key.clone(), reporter.clone());
        let task = workflow_task(
            &key,
            "name: build\nmatrix:\n  os: [linux]\nsteps:\n  - cmd: [echo, hi]\n",
        );
        tool.resolve_tasks(vec![task.clone()]).unwrap();

        let mut builder = RegistryBuilder::new();
        builder.add_tool(Arc::new(tool)).unwrap();
        builder.add_task(task).unwrap();
        let executor = Arc::new(ScriptedExecutor::default());
        let options = RunOptions {
            color_output: true,
            ..Default::default()
        };
        let mut ctx = Context::new(builder.freeze(), executor.clone(), options);

        ctx.run_task(&key, &TaskKey::new("run", "build")).await.unwrap();

        assert_eq!(ctx.state(), TaskExecState::Succeeded);
        assert_eq!(ctx.output_prefix(), Some("workflow:run:build "));
        assert_eq!(ctx.output_color(), Some(color_for("workflow:run:build")));

        let requests = executor.requests.lock().unwrap();
        assert_eq!(requests[0].command, vec!["echo", "hi"]);
        assert_eq!(requests[0].label, "workflow:run:build ");
        assert_eq!(
            requests[0].env.get("MATRIX_OS").map(String::as_str),
            Some("linux")
        );
    }

    #[tokio::test]
    async fn test_run_unknown_task() {
        let key = ToolKey::new("workflow", "");
        let tool = WorkflowTool::new(key.clone(), Arc::new(CollectingReporter::default()));
        let mut builder = RegistryBuilder::new();
        builder.add_tool(Arc::new(tool)).unwrap();
        let mut ctx = Context::new(
            builder.freeze(),
            Arc::new(ScriptedExecutor::default()),
            RunOptions::default(),
        );

        let result = ctx.run_task(&key, &TaskKey::new("run", "missing")).await;
        assert!(matches!(
            result,
            Err(tasklane_core::TasklaneError::Lookup(LookupError::TaskNotFound { .. }))
        ));
    }
}
