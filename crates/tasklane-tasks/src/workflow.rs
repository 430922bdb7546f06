//! Config-declared workflow tasks
//!
//! A workflow task is a list of steps plus optional hooks keyed by stage
//! name. Every step becomes one exec spec; each matrix entry's axis values are
//! suggested to its steps as `MATRIX_<AXIS>` variables.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use tasklane_core::error::ConfigError;
use tasklane_core::{
    Context, HookSpec, MatrixEntry, MatrixSpec, RenderingContext, Result, Task, TaskExecSpec,
    TaskExecStage, TaskKind, TaskMatrixExecOptions, TaskName, ToolKey, ToolKind, ToolName,
};

/// One step of a workflow task or hook
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StepConfig {
    /// Inline script run through a shell
    pub run: Option<String>,
    /// Command line run directly
    pub cmd: Option<Vec<String>>,
    /// Task reference (hooks only)
    pub task: Option<String>,
    /// Shell for `run`; defaults to the task shell
    pub shell: Option<String>,
    pub chdir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub stdin: Option<String>,
    /// Publish trimmed stdout under this replace key
    pub capture_stdout: Option<String>,
    /// Publish trimmed stderr under this replace key
    pub capture_stderr: Option<String>,
    pub ignore_error: bool,
}

/// Raw workflow task config
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkflowTaskConfig {
    pub name: String,
    /// Owning tool name; consumed during config resolution
    pub tool: Option<String>,
    pub description: Option<String>,
    pub matrix: MatrixSpec,
    /// Forced on every step
    pub env: BTreeMap<String, String>,
    /// Default shell for `run` steps
    pub shell: Option<String>,
    /// Default working directory for steps
    pub chdir: Option<PathBuf>,
    pub steps: Vec<StepConfig>,
    pub hooks: BTreeMap<String, Vec<StepConfig>>,
}

/// A task whose steps come from config
#[derive(Debug)]
pub struct WorkflowTask {
    tool: ToolKey,
    kind: TaskKind,
    name: TaskName,
    config: WorkflowTaskConfig,
    hooks: BTreeMap<TaskExecStage, Vec<StepConfig>>,
}

impl WorkflowTask {
    /// Build from a raw `tasks.<tool-kind>:<task-kind>` entry
    pub fn from_config(tool: ToolKey, kind: TaskKind, raw: &serde_yaml::Value) -> Result<Self> {
        let field = format!("tasks.{}:{}", tool.kind, kind);
        let config: WorkflowTaskConfig =
            serde_yaml::from_value(raw.clone()).map_err(|e| ConfigError::InvalidValue {
                field: field.clone(),
                message: e.to_string(),
            })?;
        Self::new(tool, kind, config, &field)
    }

    fn new(tool: ToolKey, kind: TaskKind, config: WorkflowTaskConfig, field: &str) -> Result<Self> {
        if config.name.trim().is_empty() {
            return Err(invalid(field, "Task name cannot be empty"));
        }
        let field = format!("{field}.{}", config.name);

        for step in &config.steps {
            if step.task.is_some() {
                return Err(invalid(&field, "Task references are only allowed in hooks"));
            }
            check_step(step, false, &field)?;
        }

        let mut hooks = BTreeMap::new();
        for (stage, steps) in &config.hooks {
            let stage = TaskExecStage::parse(stage)
                .map_err(|e| invalid(&format!("{field}.hooks"), &e.to_string()))?;
            for step in steps {
                check_step(step, true, &format!("{field}.hooks.{stage}"))?;
            }
            hooks.insert(stage, steps.clone());
        }

        Ok(Self {
            tool,
            kind,
            name: TaskName::new(config.name.clone()),
            config,
            hooks,
        })
    }

    fn step_spec(
        &self,
        ctx: &Context,
        step: &StepConfig,
        entry: Option<&MatrixEntry>,
    ) -> Result<TaskExecSpec> {
        let mut spec = match (&step.run, &step.cmd) {
            (Some(script), _) => TaskExecSpec::shell(
                script.clone(),
                step.shell.clone().or_else(|| self.config.shell.clone()),
            ),
            (None, Some(cmd)) => TaskExecSpec::new(
                cmd.iter()
                    .map(|arg| render(ctx, arg))
                    .collect::<Result<Vec<_>>>()?,
            ),
            (None, None) => return Err(invalid(&self.name.to_string(), "Step has nothing to run")),
        };

        if let Some(dir) = step.chdir.as_ref().or(self.config.chdir.as_ref()) {
            spec = spec.with_chdir(render(ctx, &dir.to_string_lossy())?);
        }
        if let Some(entry) = entry {
            for (key, value) in entry.env_vars() {
                spec = spec.with_env_suggest(key, value);
            }
        }
        for (key, value) in self.config.env.iter().chain(step.env.iter()) {
            spec = spec.with_env_override(key.clone(), value.clone());
        }
        if let Some(stdin) = &step.stdin {
            spec = spec.with_stdin(stdin.clone().into_bytes());
        }
        if let Some(key) = &step.capture_stdout {
            spec = spec.with_stdout_as_replace(key.clone()).with_fix_stdout(trim_output);
        }
        if let Some(key) = &step.capture_stderr {
            spec = spec.with_stderr_as_replace(key.clone()).with_fix_stderr(trim_output);
        }
        Ok(spec.with_ignore_error(step.ignore_error))
    }
}

impl Task for WorkflowTask {
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

    fn description(&self) -> Option<&str> {
        self.config.description.as_deref()
    }

    fn matrix_specs(&self, _rc: &RenderingContext) -> Result<Vec<MatrixEntry>> {
        Ok(self.config.matrix.expand())
    }

    fn exec_specs(
        &self,
        ctx: &Context,
        options: &TaskMatrixExecOptions,
    ) -> Result<Vec<TaskExecSpec>> {
        self.config
            .steps
            .iter()
            .map(|step| self.step_spec(ctx, step, Some(&options.entry)))
            .collect()
    }

    fn hook_exec_specs(&self, ctx: &Context, stage: TaskExecStage) -> Result<Vec<HookSpec>> {
        let Some(steps) = self.hooks.get(&stage) else {
            return Ok(Vec::new());
        };
        steps
            .iter()
            .map(|step| match &step.task {
                Some(reference) => HookSpec::task_call(reference, self.tool.name.as_str()),
                None => self
                    .step_spec(ctx, step, ctx.matrix_entry())
                    .map(HookSpec::Exec),
            })
            .collect()
    }
}

fn check_step(step: &StepConfig, allow_task: bool, field: &str) -> Result<()> {
    let actions = [step.run.is_some(), step.cmd.is_some(), step.task.is_some()]
        .iter()
        .filter(|set| **set)
        .count();
    if actions != 1 {
        let expected = if allow_task {
            "Step needs exactly one of 'run', 'cmd' or 'task'"
        } else {
            "Step needs exactly one of 'run' or 'cmd'"
        };
        return Err(invalid(field, expected));
    }
    if step.cmd.as_ref().is_some_and(|c| c.is_empty()) {
        return Err(invalid(field, "'cmd' cannot be empty"));
    }
    if let Some(reference) = &step.task {
        tasklane_core::parse_task_reference(reference, "")?;
    }
    Ok(())
}

fn invalid(field: &str, message: &str) -> tasklane_core::TasklaneError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Render with the `env` renderer when one is registered
fn render(ctx: &Context, input: &str) -> Result<String> {
    if ctx.registries().renderers().get("env").is_some() {
        ctx.render("env", input)
    } else {
        Ok(input.to_string())
    }
}

fn trim_output(data: Vec<u8>) -> Result<Vec<u8>> {
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    let mut data = data;
    data.truncate(end);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tasklane_core::{RegistryBuilder, RunOptions};

    use crate::render::EnvRenderer;
    use crate::steps::tests::ScriptedExecutor;

    fn task(yaml: &str) -> Result<WorkflowTask> {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        WorkflowTask::from_config(ToolKey::new("workflow", "ci"), "run".into(), &raw)
    }

    fn ctx() -> Context {
        let mut builder = RegistryBuilder::new();
        builder.add_renderer(Arc::new(EnvRenderer));
        let ctx = Context::new(
            builder.freeze(),
            Arc::new(ScriptedExecutor::default()),
            RunOptions::default(),
        );
        ctx.rendering().set_env("TARGET", "release");
        ctx
    }

    const BUILD: &str = r#"
name: build
matrix:
  os: [linux, darwin]
  arch: [amd64]
env:
  CGO_ENABLED: "0"
steps:
  - run: echo building
  - cmd: [go, build, "-o", "out/${TARGET}"]
    capture_stdout: "<BIN>"
    env:
      GOFLAGS: -mod=vendor
hooks:
  before:
    - run: echo start
  after:failure:
    - task: "workflow:run(notify, {os: [linux]})"
"#;

    #[test]
    fn test_matrix_expansion() {
        let task = task(BUILD).unwrap();
        let entries = task.matrix_specs(&RenderingContext::new()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].get("arch"), Some("amd64"));
        assert_eq!(entries[0].get("os"), Some("linux"));
        assert_eq!(entries[1].get("os"), Some("darwin"));
    }

    #[test]
    fn test_exec_specs() {
        let task = task(BUILD).unwrap();
        let ctx = ctx();
        let entry = MatrixEntry::new().with("os", "linux").with("arch", "amd64");
        let specs = task
            .exec_specs(&ctx, &TaskMatrixExecOptions::new(0, 2, entry))
            .unwrap();

        assert_eq!(specs.len(), 2);
        assert!(specs[0].use_shell);
        assert_eq!(specs[0].command, vec!["echo building"]);
        assert_eq!(
            specs[0].env_suggest.get("MATRIX_OS").map(String::as_str),
            Some("linux")
        );
        assert_eq!(
            specs[0].env_override.get("CGO_ENABLED").map(String::as_str),
            Some("0")
        );

        assert!(!specs[1].use_shell);
        assert_eq!(specs[1].command, vec!["go", "build", "-o", "out/release"]);
        assert_eq!(specs[1].stdout_as_replace.as_deref(), Some("<BIN>"));
        assert_eq!(
            specs[1].env_override.get("GOFLAGS").map(String::as_str),
            Some("-mod=vendor")
        );
    }

    #[test]
    fn test_hook_specs() {
        let task = task(BUILD).unwrap();
        let ctx = ctx();

        let before = task.hook_exec_specs(&ctx, TaskExecStage::Before).unwrap();
        assert!(matches!(&before[..], [HookSpec::Exec(spec)] if spec.command == vec!["echo start"]));

        let failure = task
            .hook_exec_specs(&ctx, TaskExecStage::AfterFailure)
            .unwrap();
        match &failure[..] {
            [HookSpec::TaskCall(reference)] => {
                assert_eq!(reference.tool_name.as_str(), "ci");
                assert_eq!(reference.task_name.as_str(), "notify");
                assert!(!reference.matrix_filter.is_empty());
            }
            other => panic!("unexpected hooks: {other:?}"),
        }

        assert!(task
            .hook_exec_specs(&ctx, TaskExecStage::After)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_invalid_configs() {
        assert!(task("name: ''").is_err());
        assert!(task("name: a\nsteps:\n  - {}\n").is_err());
        assert!(task("name: a\nsteps:\n  - run: x\n    cmd: [y]\n").is_err());
        assert!(task("name: a\nsteps:\n  - task: workflow:run(b)\n").is_err());
        assert!(task("name: a\nsteps:\n  - cmd: []\n").is_err());
        assert!(task("name: a\nsteps:\n  - run: x\n    bogus: 1\n").is_err());
        assert!(task("name: a\nhooks:\n  pre-build:\n    - run: x\n").is_err());
        assert!(task("name: a\nhooks:\n  after:\n    - task: not-a-reference\n").is_err());
    }

    #[test]
    fn test_trim_output() {
        assert_eq!(trim_output(b"abc \n\n".to_vec()).unwrap(), b"abc");
        assert_eq!(trim_output(b"\n".to_vec()).unwrap(), b"");
    }
}
