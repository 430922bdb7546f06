//! Task execution reporting

use std::sync::Arc;
use std::time::Duration;

use tasklane_core::TaskExecStage;

/// Events emitted during task execution
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A task run is starting
    TaskStarted {
        task: String,
        entries: usize,
    },
    /// A lifecycle hook stage is starting
    StageStarted {
        task: String,
        stage: TaskExecStage,
        steps: usize,
    },
    /// A matrix entry is starting
    EntryStarted {
        task: String,
        entry: String,
    },
    /// A step is about to spawn a process
    StepStarted {
        label: String,
        command: String,
    },
    /// A process produced output
    Output {
        label: String,
        line: String,
        is_stderr: bool,
        color: Option<u8>,
    },
    /// A matrix entry completed successfully
    EntryCompleted {
        task: String,
        entry: String,
        duration: Duration,
    },
    /// A matrix entry failed
    EntryFailed {
        task: String,
        entry: String,
        duration: Duration,
        error: String,
    },
    /// A matrix entry never ran
    EntrySkipped {
        task: String,
        entry: String,
        reason: String,
    },
    /// A task run finished
    TaskCompleted {
        task: String,
        total: usize,
        succeeded: usize,
        failed: usize,
        canceled: usize,
        duration: Duration,
    },
}

/// Trait for reporting task execution progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Simple reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::TaskStarted { task, entries } => {
                tracing::info!("Starting {} ({} matrix entries)", task, entries);
            }
            TaskEvent::StageStarted { task, stage, steps } => {
                tracing::info!("{} stage {} ({} steps)", task, stage, steps);
            }
            TaskEvent::EntryStarted { task, entry } => {
                tracing::info!("{} entry {} starting", task, entry);
            }
            TaskEvent::StepStarted { label, command } => {
                tracing::debug!("{}$ {}", label, command);
            }
            TaskEvent::Output {
                label,
                line,
                is_stderr,
                ..
            } => {
                if *is_stderr {
                    tracing::warn!("{}{}", label, line);
                } else {
                    tracing::debug!("{}{}", label, line);
                }
            }
            TaskEvent::EntryCompleted {
                task,
                entry,
                duration,
            } => {
                tracing::info!(
                    "{} entry {} completed in {:.1}s",
                    task,
                    entry,
                    duration.as_secs_f64()
                );
            }
            TaskEvent::EntryFailed {
                task,
                entry,
                duration,
                error,
            } => {
                tracing::error!(
                    "{} entry {} failed after {:.1}s: {}",
                    task,
                    entry,
                    duration.as_secs_f64(),
                    error
                );
            }
            TaskEvent::EntrySkipped {
                task,
                entry,
                reason,
            } => {
                tracing::info!("{} entry {} skipped: {}", task, entry, reason);
            }
            TaskEvent::TaskCompleted {
                task,
                total,
                succeeded,
                failed,
                canceled,
                duration,
            } => {
                tracing::info!(
                    "{} complete: {}/{} succeeded, {} failed, {} canceled ({:.1}s)",
                    task,
                    succeeded,
                    total,
                    failed,
                    canceled,
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: std::sync::Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Output lines collected so far, in arrival order
    pub fn output_lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TaskEvent::Output { line, .. } => Some(line),
                _ => None,
            })
            .collect()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

/// Registry of task reporters
pub struct TaskReporterRegistry {
    reporters: Vec<Arc<dyn TaskReporter>>,
}

impl TaskReporterRegistry {
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn register<R: TaskReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    pub fn register_shared(&mut self, reporter: Arc<dyn TaskReporter>) {
        self.reporters.push(reporter);
    }

    pub fn all(&self) -> &[Arc<dyn TaskReporter>] {
        &self.reporters
    }

    /// Broadcast an event to all registered reporters
    pub fn broadcast(&self, event: &TaskEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

impl TaskReporter for TaskReporterRegistry {
    fn report(&self, event: &TaskEvent) {
        self.broadcast(event);
    }
}

impl Default for TaskReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
