//! Execution context handed to every tool and task
//!
//! A [`Context`] is an explicit composition of:
//! - a cancellation token for the run lifetime
//! - the frozen registries, run options and process executor (shared by `Arc`)
//! - the rendering state shared across the derivation lineage
//! - execution state private to one task invocation
//!
//! [`Context::derive_new`] is the unit of isolation: the scheduler derives one
//! child per top-level task run and one per matrix entry, so concurrently
//! running entries never race on current-task bookkeeping.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{LookupError, Result};
use crate::exec::TaskExecState;
use crate::matrix::{MatrixEntry, MatrixFilter};
use crate::registry::Registries;
use crate::rendering::RenderingContext;
use crate::traits::{ProcessExecutor, Task};
use crate::types::{TaskKey, ToolKey};

/// Process-wide run options
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Global worker ceiling
    pub workers: usize,
    /// Cancel sibling work on the first failure
    pub fail_fast: bool,
    /// Whether output may be colored
    pub color_output: bool,
    /// Working directory of the run
    pub work_dir: Option<PathBuf>,
    /// Cache directory handed to tools
    pub cache_dir: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            fail_fast: true,
            color_output: false,
            work_dir: None,
            cache_dir: PathBuf::from(".tasklane/cache"),
        }
    }
}

/// Available parallelism, falling back to 4
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

struct Shared {
    registries: Arc<Registries>,
    options: RunOptions,
    executor: Arc<dyn ProcessExecutor>,
}

/// Execution state private to one task invocation
#[derive(Debug, Clone, Default)]
pub struct ExecState {
    tool: Option<ToolKey>,
    task: Option<TaskKey>,
    matrix_filter: MatrixFilter,
    matrix_entry: Option<MatrixEntry>,
    output_prefix: Option<String>,
    output_color: Option<u8>,
    state: TaskExecState,
}

/// Handle to configuration state, environment and run control
pub struct Context {
    cancel: CancellationToken,
    shared: Arc<Shared>,
    rendering: Arc<RenderingContext>,
    exec: ExecState,
}

impl Context {
    /// Create a root context bound to a fresh root lifetime
    pub fn new(
        registries: Arc<Registries>,
        executor: Arc<dyn ProcessExecutor>,
        options: RunOptions,
    ) -> Self {
        Self::with_cancellation(registries, executor, options, CancellationToken::new())
    }

    /// Create a root context bound to an existing lifetime
    pub fn with_cancellation(
        registries: Arc<Registries>,
        executor: Arc<dyn ProcessExecutor>,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cancel,
            shared: Arc::new(Shared {
                registries,
                options,
                executor,
            }),
            rendering: Arc::new(RenderingContext::new()),
            exec: ExecState::default(),
        }
    }

    /// Replace the rendering state of a root context
    pub fn with_rendering(mut self, rendering: Arc<RenderingContext>) -> Self {
        self.rendering = rendering;
        self
    }

    /// Child context: own cancel scope, shared registries and rendering
    /// state, blank execution state
    pub fn derive_new(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            shared: Arc::clone(&self.shared),
            rendering: Arc::clone(&self.rendering),
            exec: ExecState::default(),
        }
    }

    /// Look up the tool and run `task` with it in this context
    pub async fn run_task(&mut self, tool: &ToolKey, task: &TaskKey) -> Result<()> {
        let handle = self
            .shared
            .registries
            .tools()
            .get(tool)
            .ok_or_else(|| LookupError::ToolNotFound(tool.to_string()))?;

        info!(tool = %tool, task = %task, "running task");
        self.set_current_task(tool.clone(), task.clone());
        handle.run(self).await
    }

    /// Resolve the current task from the registries
    pub fn current_task(&self) -> Result<Arc<dyn Task>> {
        let (tool, task) = match (&self.exec.tool, &self.exec.task) {
            (Some(tool), Some(task)) => (tool, task),
            _ => return Err(crate::TasklaneError::other("no current task set")),
        };
        self.shared
            .registries
            .tasks()
            .get(tool, task)
            .ok_or_else(|| {
                LookupError::TaskNotFound {
                    tool: tool.to_string(),
                    task: task.to_string(),
                }
                .into()
            })
    }

    pub fn set_current_task(&mut self, tool: ToolKey, task: TaskKey) {
        debug!(tool = %tool, task = %task, "current task set");
        self.exec.tool = Some(tool);
        self.exec.task = Some(task);
    }

    pub fn current_tool_key(&self) -> Option<&ToolKey> {
        self.exec.tool.as_ref()
    }

    pub fn current_task_key(&self) -> Option<&TaskKey> {
        self.exec.task.as_ref()
    }

    pub fn matrix_filter(&self) -> &MatrixFilter {
        &self.exec.matrix_filter
    }

    pub fn set_matrix_filter(&mut self, filter: MatrixFilter) {
        self.exec.matrix_filter = filter;
    }

    /// Matrix entry this context executes, if it is a per-entry context
    pub fn matrix_entry(&self) -> Option<&MatrixEntry> {
        self.exec.matrix_entry.as_ref()
    }

    pub fn set_matrix_entry(&mut self, entry: MatrixEntry) {
        self.exec.matrix_entry = Some(entry);
    }

    pub fn output_prefix(&self) -> Option<&str> {
        self.exec.output_prefix.as_deref()
    }

    /// Assign the output prefix once; later calls are ignored
    pub fn set_output_prefix(&mut self, prefix: impl Into<String>) -> bool {
        if self.exec.output_prefix.is_some() {
            return false;
        }
        self.exec.output_prefix = Some(prefix.into());
        true
    }

    pub fn output_color(&self) -> Option<u8> {
        self.exec.output_color
    }

    /// Assign the output color once; later calls are ignored
    pub fn set_output_color(&mut self, color: u8) -> bool {
        if self.exec.output_color.is_some() {
            return false;
        }
        self.exec.output_color = Some(color);
        true
    }

    pub fn state(&self) -> TaskExecState {
        self.exec.state
    }

    pub fn set_state(&mut self, state: TaskExecState) {
        self.exec.state = state;
    }

    pub fn exec_state(&self) -> &ExecState {
        &self.exec
    }

    pub fn fail_fast(&self) -> bool {
        self.shared.options.fail_fast
    }

    pub fn color_output(&self) -> bool {
        self.shared.options.color_output
    }

    pub fn workers(&self) -> usize {
        self.shared.options.workers
    }

    /// Clamp a requested parallelism to the global worker ceiling
    pub fn claim_workers(&self, n: usize) -> usize {
        n.min(self.shared.options.workers)
    }

    pub fn options(&self) -> &RunOptions {
        &self.shared.options
    }

    pub fn registries(&self) -> &Registries {
        &self.shared.registries
    }

    pub fn executor(&self) -> Arc<dyn ProcessExecutor> {
        Arc::clone(&self.shared.executor)
    }

    pub fn rendering(&self) -> &RenderingContext {
        &self.rendering
    }

    /// Render text with a registered renderer
    pub fn render(&self, renderer: &str, input: &str) -> Result<String> {
        let renderer = self
            .shared
            .registries
            .renderers()
            .get(renderer)
            .ok_or_else(|| LookupError::RendererNotFound(renderer.to_string()))?;
        renderer.render(&self.rendering, input)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel this context and everything derived from it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("options", &self.shared.options)
            .field("exec", &self.exec)
            .finish()
    }
}
