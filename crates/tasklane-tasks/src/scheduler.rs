//! Task scheduler: runs one task through its lifecycle stages
//!
//! Stage order for a task with N surviving matrix entries:
//! `before → before:matrix → [entry exec specs → after:matrix:success |
//! after:matrix:failure]×N → after:matrix → after:success | after:failure →
//! after`.
//!
//! Entries are dispatched in enumeration order. A semaphore permit is taken
//! before each entry is spawned, so at most `claim_workers(N)` entries run at
//! once. With fail-fast enabled, a failing entry cancels the matrix group:
//! entries still waiting for a permit are recorded as canceled and running
//! processes are killed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use tasklane_core::error::TaskError;
use tasklane_core::{
    Context, HookSpec, MatrixEntry, Result, Task, TaskExecSpec, TaskExecStage, TaskExecState,
    TaskMatrixExecOptions, TasklaneError,
};

use crate::reporter::{TaskEvent, TaskReporter};
use crate::steps::run_exec_specs;

/// Outcome of one matrix entry
#[derive(Debug)]
pub struct EntryOutcome {
    pub id: String,
    pub state: TaskExecState,
    pub duration: Duration,
    pub error: Option<TasklaneError>,
}

impl EntryOutcome {
    fn canceled(id: String) -> Self {
        Self {
            id,
            state: TaskExecState::Canceled,
            duration: Duration::ZERO,
            error: None,
        }
    }
}

/// Drives the lifecycle of the context's current task
pub struct TaskScheduler {
    reporter: Arc<dyn TaskReporter>,
}

impl TaskScheduler {
    /// Create a new scheduler
    pub fn new(reporter: Arc<dyn TaskReporter>) -> Self {
        Self { reporter }
    }

    /// Run the current task of `ctx` through every stage.
    ///
    /// Returns [`TaskError::Failed`] carrying the first meaningful error when
    /// any entry or hook stage failed. Errors from `matrix_specs` surface
    /// before any stage runs.
    pub async fn run(&self, ctx: &mut Context) -> Result<()> {
        let task = ctx.current_task()?;
        let label = task_label(&*task);
        let start = Instant::now();

        ctx.set_state(TaskExecState::Working);
        let entries = match task.matrix_specs(ctx.rendering()) {
            Ok(entries) => ctx.matrix_filter().apply(entries),
            Err(e) => {
                ctx.set_state(TaskExecState::Failed);
                return Err(e);
            }
        };
        let total = entries.len();
        info!(task = %label, entries = total, "task started");
        self.reporter.report(&TaskEvent::TaskStarted {
            task: label.clone(),
            entries: total,
        });

        let mut first_error: Option<TasklaneError> = None;
        let mut setup_failed = false;

        for stage in [TaskExecStage::Before, TaskExecStage::BeforeMatrix] {
            if let Err(e) = run_stage(ctx, &*task, stage, &*self.reporter, &label).await {
                record(&mut first_error, e);
                setup_failed = true;
                break;
            }
        }

        let outcomes = if setup_failed {
            entries
                .into_iter()
                .enumerate()
                .map(|(seq, entry)| {
                    let id = TaskMatrixExecOptions::new(seq, total, entry).id();
                    self.reporter.report(&TaskEvent::EntrySkipped {
                        task: label.clone(),
                        entry: id.clone(),
                        reason: "setup stage failed".to_string(),
                    });
                    EntryOutcome::canceled(id)
                })
                .collect()
        } else {
            self.run_matrix(ctx, &task, entries, &label).await?
        };

        for outcome in &outcomes {
            if let Some(e) = &outcome.error {
                debug!(entry = %outcome.id, error = %e, "entry error");
            }
        }
        let failed = outcomes
            .iter()
            .filter(|o| o.state == TaskExecState::Failed)
            .count();
        let succeeded = outcomes.iter().filter(|o| o.state.is_success()).count();
        let canceled = outcomes
            .iter()
            .filter(|o| o.state == TaskExecState::Canceled)
            .count();
        for outcome in outcomes {
            if let Some(e) = outcome.error {
                record(&mut first_error, e);
            }
        }

        if let Err(e) =
            run_stage(ctx, &*task, TaskExecStage::AfterMatrix, &*self.reporter, &label).await
        {
            record(&mut first_error, e);
        }

        let success = first_error.is_none() && succeeded == total && !ctx.is_cancelled();
        ctx.set_state(if success {
            TaskExecState::Succeeded
        } else if ctx.is_cancelled() {
            TaskExecState::Canceled
        } else {
            TaskExecState::Failed
        });

        let outcome_stage = if success {
            TaskExecStage::AfterSuccess
        } else {
            TaskExecStage::AfterFailure
        };
        for stage in [outcome_stage, TaskExecStage::After] {
            if let Err(e) = run_stage(ctx, &*task, stage, &*self.reporter, &label).await {
                if success && ctx.state() == TaskExecState::Succeeded {
                    ctx.set_state(TaskExecState::Failed);
                }
                record(&mut first_error, e);
            }
        }

        self.reporter.report(&TaskEvent::TaskCompleted {
            task: label.clone(),
            total,
            succeeded,
            failed,
            canceled,
            duration: start.elapsed(),
        });

        match first_error {
            None if success => {
                info!(task = %label, "task succeeded");
                Ok(())
            }
            None => Err(TaskError::Failed {
                task: label,
                failed,
                total,
                source: ctx.is_cancelled().then(|| Box::new(TasklaneError::Cancelled)),
            }
            .into()),
            Some(e) => {
                warn!(task = %label, failed, total, "task failed");
                Err(TaskError::Failed {
                    task: label,
                    failed,
                    total,
                    source: Some(Box::new(e)),
                }
                .into())
            }
        }
    }

    async fn run_matrix(
        &self,
        ctx: &Context,
        task: &Arc<dyn Task>,
        entries: Vec<MatrixEntry>,
        label: &str,
    ) -> Result<Vec<EntryOutcome>> {
        let total = entries.len();
        let group = ctx.derive_new();
        let workers = ctx.claim_workers(total).max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let base_prefix = ctx
            .output_prefix()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{label} "));
        debug!(task = %label, entries = total, workers, "dispatching matrix entries");

        let mut handles = Vec::with_capacity(total);
        for (seq, entry) in entries.into_iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| TasklaneError::other("worker semaphore closed"))?;

            let mut options = TaskMatrixExecOptions::new(seq, total, entry.clone());
            options.work_dir = ctx.options().work_dir.clone();
            let id = options.id();

            if group.is_cancelled() {
                self.reporter.report(&TaskEvent::EntrySkipped {
                    task: label.to_string(),
                    entry: id.clone(),
                    reason: "canceled".to_string(),
                });
                handles.push((id, None));
                continue;
            }

            let mut entry_ctx = group.derive_new();
            entry_ctx.set_current_task(task.tool_key(), task.key());
            entry_ctx.set_matrix_filter(ctx.matrix_filter().clone());
            entry_ctx.set_output_prefix(if total > 1 {
                format!("{} {} ", base_prefix.trim_end(), entry)
            } else {
                base_prefix.clone()
            });
            if let Some(color) = ctx.output_color() {
                entry_ctx.set_output_color(color);
            }
            entry_ctx.set_matrix_entry(entry);

            let task = Arc::clone(task);
            let reporter = Arc::clone(&self.reporter);
            let group_token = group.cancellation_token();
            let fail_fast = ctx.fail_fast();
            let label = label.to_string();

            let handle = tokio::spawn(async move {
                let outcome = run_entry(&mut entry_ctx, &*task, &options, &*reporter, &label).await;
                if outcome.state == TaskExecState::Failed && fail_fast {
                    info!(task = %label, entry = %outcome.id, "fail-fast: canceling remaining entries");
                    group_token.cancel();
                }
                drop(permit);
                outcome
            });
            handles.push((id, Some(handle)));
        }

        let mut outcomes = Vec::with_capacity(total);
        for (id, handle) in handles {
            let Some(handle) = handle else {
                outcomes.push(EntryOutcome::canceled(id));
                continue;
            };
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => outcomes.push(EntryOutcome {
                    id,
                    state: TaskExecState::Failed,
                    duration: Duration::ZERO,
                    error: Some(TasklaneError::other(format!("Matrix entry panicked: {e}"))),
                }),
            }
        }
        Ok(outcomes)
    }
}

/// Exec specs of one entry, then its success/failure hook stage
async fn run_entry(
    ctx: &mut Context,
    task: &dyn Task,
    options: &TaskMatrixExecOptions,
    reporter: &dyn TaskReporter,
    label: &str,
) -> EntryOutcome {
    let start = Instant::now();
    let id = options.id();
    ctx.set_state(TaskExecState::Working);
    reporter.report(&TaskEvent::EntryStarted {
        task: label.to_string(),
        entry: id.clone(),
    });

    let mut result = match task.exec_specs(ctx, options) {
        Ok(specs) => run_exec_specs(ctx, specs, reporter).await,
        Err(e) => Err(e),
    };

    if !ctx.is_cancelled() {
        let stage = if result.is_ok() {
            TaskExecStage::AfterMatrixSuccess
        } else {
            TaskExecStage::AfterMatrixFailure
        };
        if let Err(e) = run_stage(ctx, task, stage, reporter, label).await {
            match &result {
                Ok(()) => result = Err(e),
                Err(_) => warn!(entry = %id, error = %e, "entry failure hook failed"),
            }
        }
    }

    let state = match &result {
        Ok(()) => TaskExecState::Succeeded,
        Err(e) if e.is_cancelled() => TaskExecState::Canceled,
        Err(_) => TaskExecState::Failed,
    };
    ctx.set_state(state);

    let duration = start.elapsed();
    match &result {
        Ok(()) => reporter.report(&TaskEvent::EntryCompleted {
            task: label.to_string(),
            entry: id.clone(),
            duration,
        }),
        Err(e) if e.is_cancelled() => reporter.report(&TaskEvent::EntrySkipped {
            task: label.to_string(),
            entry: id.clone(),
            reason: "canceled while running".to_string(),
        }),
        Err(e) => reporter.report(&TaskEvent::EntryFailed {
            task: label.to_string(),
            entry: id.clone(),
            duration,
            error: e.to_string(),
        }),
    }

    EntryOutcome {
        id,
        state,
        duration,
        error: result.err(),
    }
}

/// Run the hooks a task declares for `stage`
async fn run_stage(
    ctx: &Context,
    task: &dyn Task,
    stage: TaskExecStage,
    reporter: &dyn TaskReporter,
    label: &str,
) -> Result<()> {
    let hook_failed = |e: TasklaneError| -> TasklaneError {
        TaskError::HookFailed {
            task: label.to_string(),
            stage: stage.as_str().to_string(),
            source: Box::new(e),
        }
        .into()
    };

    let hooks = task.hook_exec_specs(ctx, stage).map_err(hook_failed)?;
    if hooks.is_empty() {
        return Ok(());
    }

    debug!(task = %label, stage = %stage, hooks = hooks.len(), "running hook stage");
    reporter.report(&TaskEvent::StageStarted {
        task: label.to_string(),
        stage,
        steps: hooks.len(),
    });
    run_hooks(ctx, hooks, reporter).await.map_err(hook_failed)
}

/// Consecutive exec hooks share one step list (and its replace values); a
/// task call runs the referenced task in a derived context
async fn run_hooks(ctx: &Context, hooks: Vec<HookSpec>, reporter: &dyn TaskReporter) -> Result<()> {
    let mut pending: Vec<TaskExecSpec> = Vec::new();
    for hook in hooks {
        match hook {
            HookSpec::Exec(spec) => pending.push(spec),
            HookSpec::TaskCall(reference) => {
                if !pending.is_empty() {
                    run_exec_specs(ctx, std::mem::take(&mut pending), reporter).await?;
                }
                if ctx.is_cancelled() {
                    return Err(TasklaneError::Cancelled);
                }
                debug!(reference = %reference, "hook task call");
                let mut child = ctx.derive_new();
                child.set_matrix_filter(reference.matrix_filter.clone());
                child
                    .run_task(&reference.tool_key(), &reference.task_key())
                    .await?;
            }
        }
    }
    if !pending.is_empty() {
        run_exec_specs(ctx, pending, reporter).await?;
    }
    Ok(())
}

/// Keep the first error, preferring a real failure over a cancellation
fn record(slot: &mut Option<TasklaneError>, error: TasklaneError) {
    match slot {
        None => *slot = Some(error),
        Some(existing) if existing.is_cancelled() && !error.is_cancelled() => *slot = Some(error),
        Some(_) => {}
    }
}

/// `kind[:name]:task-kind:task-name` for display
pub fn task_label(task: &dyn Task) -> String {
    if task.tool_name().is_empty() {
        format!("{}:{}", task.tool_kind(), task.key())
    } else {
        format!("{}:{}:{}", task.tool_kind(), task.tool_name(), task.key())
    }
}
