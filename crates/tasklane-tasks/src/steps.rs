//! Runs an ordered list of exec specs within one context
//!
//! Captured output flows forward through a [`ReplaceMap`]: a step with
//! `stdout_as_replace` / `stderr_as_replace` publishes its (optionally fixed)
//! output under a key, and every later step in the same list has that key
//! substituted in its command arguments.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use tracing::{debug, warn};

use tasklane_core::error::{ExecError, LookupError};
use tasklane_core::exec::FixReplaceFn;
use tasklane_core::{
    AlterExec, AlterStreams, Context, ProcessRequest, ReplaceMap, Result, TaskExecSpec,
    TasklaneError,
};

use crate::reporter::{TaskEvent, TaskReporter};

/// Run `specs` in order, stopping at the first failure not marked
/// `ignore_error`. Cancellation always stops the list.
pub async fn run_exec_specs(
    ctx: &Context,
    specs: Vec<TaskExecSpec>,
    reporter: &dyn TaskReporter,
) -> Result<()> {
    let mut queue: VecDeque<TaskExecSpec> = specs.into();
    let mut replace = ReplaceMap::new();

    while let Some(spec) = queue.pop_front() {
        if ctx.is_cancelled() {
            return Err(TasklaneError::Cancelled);
        }

        let command = match &spec.alter_exec {
            None => spec.command.clone(),
            Some(alter) => {
                let altered = {
                    let mut stdout = Vec::new();
                    let mut stderr = Vec::new();
                    let result = {
                        let mut streams = AlterStreams {
                            stdin: spec.stdin.as_deref(),
                            stdout: &mut stdout,
                            stderr: &mut stderr,
                        };
                        alter(&replace, &mut streams)
                    };
                    forward(ctx, reporter, &stdout, false);
                    forward(ctx, reporter, &stderr, true);
                    result
                };
                match altered {
                    Ok(AlterExec::Skip) => {
                        debug!(command = %spec.display_command(), "step skipped by alter");
                        continue;
                    }
                    Ok(AlterExec::Command(command)) => command,
                    Ok(AlterExec::Specs(specs)) => {
                        debug!(
                            discarded = queue.len(),
                            replacement = specs.len(),
                            "step list replaced by alter"
                        );
                        queue = specs.into();
                        continue;
                    }
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        let e = TasklaneError::from(ExecError::Alter(e.to_string()));
                        if spec.ignore_error {
                            warn!(error = %e, "ignoring failed alter");
                            continue;
                        }
                        return Err(e);
                    }
                }
            }
        };

        match run_step(ctx, &spec, command, &mut replace, reporter).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) if spec.ignore_error => {
                warn!(command = %spec.display_command(), error = %e, "ignoring failed step");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

async fn run_step(
    ctx: &Context,
    spec: &TaskExecSpec,
    command: Vec<String>,
    replace: &mut ReplaceMap,
    reporter: &dyn TaskReporter,
) -> Result<()> {
    let mut command = replace.apply(&command);
    if command.first().map_or(true, |c| c.is_empty()) {
        return Err(ExecError::EmptyCommand.into());
    }

    let mut env = step_env(ctx, spec);
    if spec.use_shell {
        let name = spec.shell_name.as_deref();
        let shell = ctx.registries().shells().get(name).ok_or_else(|| {
            LookupError::ShellNotFound(name.filter(|n| !n.is_empty()).unwrap_or("default").to_string())
        })?;
        let shell_command = shell.exec_spec(&command, false)?;
        command = shell_command.command;
        env.extend(shell_command.env);
    }

    let command_line = spec_display(spec, &command);
    let label = ctx.output_prefix().unwrap_or_default().to_string();
    reporter.report(&TaskEvent::StepStarted {
        label: label.clone(),
        command: command_line.clone(),
    });

    let request = ProcessRequest {
        command,
        env,
        chdir: resolve_chdir(ctx.options().work_dir.as_deref(), spec.chdir.as_deref()),
        stdin: spec.stdin.clone(),
        label,
        color: ctx.output_color(),
    };
    let output = ctx
        .executor()
        .execute(request, ctx.cancellation_token())
        .await?;

    if !output.success {
        return Err(ExecError::ExitStatus {
            command: command_line,
            code: output.exit_code,
        }
        .into());
    }

    capture(
        replace,
        spec.stdout_as_replace.as_deref(),
        spec.fix_stdout_for_replace.as_ref(),
        output.stdout,
    )?;
    capture(
        replace,
        spec.stderr_as_replace.as_deref(),
        spec.fix_stderr_for_replace.as_ref(),
        output.stderr,
    )?;
    Ok(())
}

fn capture(
    replace: &mut ReplaceMap,
    key: Option<&str>,
    fix: Option<&FixReplaceFn>,
    data: Vec<u8>,
) -> Result<()> {
    let Some(key) = key else {
        return Ok(());
    };
    let value = match fix {
        Some(fix) => fix(data).map_err(|e| ExecError::Replace {
            name: key.to_string(),
            reason: e.to_string(),
        })?,
        None => data,
    };
    debug!(key, bytes = value.len(), "replace value captured");
    replace.insert(key, value);
    Ok(())
}

fn spec_display(spec: &TaskExecSpec, command: &[String]) -> String {
    if spec.use_shell {
        spec.display_command()
    } else {
        command.join(" ")
    }
}

fn resolve_chdir(work_dir: Option<&Path>, chdir: Option<&Path>) -> Option<std::path::PathBuf> {
    match (work_dir, chdir) {
        (_, Some(dir)) if dir.is_absolute() => Some(dir.to_path_buf()),
        (Some(base), Some(dir)) => Some(base.join(dir)),
        (None, Some(dir)) => Some(dir.to_path_buf()),
        (Some(base), None) => Some(base.to_path_buf()),
        (None, None) => None,
    }
}

/// Surface text written by an alter function through the reporter
fn forward(ctx: &Context, reporter: &dyn TaskReporter, data: &[u8], is_stderr: bool) {
    if data.is_empty() {
        return;
    }
    let label = ctx.output_prefix().unwrap_or_default();
    for line in String::from_utf8_lossy(data).lines() {
        reporter.report(&TaskEvent::Output {
            label: label.to_string(),
            line: line.to_string(),
            is_stderr,
            color: ctx.output_color(),
        });
    }
}

/// Environment a step runs with: the context env, suggestions for unset
/// variables, then overrides
pub fn step_env(ctx: &Context, spec: &TaskExecSpec) -> HashMap<String, String> {
    let mut env = ctx.rendering().env_snapshot();
    for (key, value) in &spec.env_suggest {
        if !env.contains_key(key) && std::env::var_os(key).is_none() {
            env.insert(key.clone(), value.clone());
        }
    }
    env.extend(spec.env_override.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}
