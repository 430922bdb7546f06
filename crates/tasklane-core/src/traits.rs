//! Core traits implemented by tools, tasks and execution collaborators
//!
//! Tools and tasks are created during config resolution and are read-only
//! once execution begins. Every method must be safe to call from several
//! concurrently running task contexts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::error::Result;
use crate::exec::{HookSpec, TaskExecSpec, TaskExecStage, TaskMatrixExecOptions};
use crate::matrix::MatrixEntry;
use crate::rendering::RenderingContext;
use crate::types::{TaskKey, TaskKind, TaskName, ToolKey, ToolKind, ToolName};

/// A capability exposing a set of tasks
#[async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> &ToolKind;

    fn name(&self) -> &ToolName;

    fn key(&self) -> ToolKey {
        ToolKey {
            kind: self.kind().clone(),
            name: self.name().clone(),
        }
    }

    /// Prepare the tool; called once during config resolution
    fn init(&mut self, cache_dir: &Path) -> Result<()>;

    /// Attach the tasks resolved for this tool
    fn resolve_tasks(&mut self, tasks: Vec<Arc<dyn Task>>) -> Result<()>;

    /// Look up one of this tool's tasks
    fn task(&self, key: &TaskKey) -> Option<Arc<dyn Task>>;

    /// All tasks of this tool
    fn tasks(&self) -> Vec<Arc<dyn Task>>;

    /// Run the context's current task
    async fn run(&self, ctx: &mut Context) -> Result<()>;
}

/// A named unit of work belonging to a tool
pub trait Task: Send + Sync {
    fn tool_kind(&self) -> &ToolKind;

    fn tool_name(&self) -> &ToolName;

    fn kind(&self) -> &TaskKind;

    fn name(&self) -> &TaskName;

    /// One-line summary shown by listings
    fn description(&self) -> Option<&str> {
        None
    }

    fn key(&self) -> TaskKey {
        TaskKey {
            kind: self.kind().clone(),
            name: self.name().clone(),
        }
    }

    fn tool_key(&self) -> ToolKey {
        ToolKey {
            kind: self.tool_kind().clone(),
            name: self.tool_name().clone(),
        }
    }

    /// Matrix entries this task fans out into, in deterministic order
    fn matrix_specs(&self, rc: &RenderingContext) -> Result<Vec<MatrixEntry>>;

    /// Steps for one matrix entry
    fn exec_specs(
        &self,
        ctx: &Context,
        options: &TaskMatrixExecOptions,
    ) -> Result<Vec<TaskExecSpec>>;

    /// Hook steps for a lifecycle stage
    fn hook_exec_specs(&self, ctx: &Context, stage: TaskExecStage) -> Result<Vec<HookSpec>>;
}

/// Concrete invocation produced by a shell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellCommand {
    pub env: HashMap<String, String>,
    pub command: Vec<String>,
}

/// Turns a logical command into a concrete process invocation
pub trait Shell: Send + Sync {
    fn name(&self) -> &str;

    /// `command` is either an inline script (joined by spaces) or, when
    /// `is_file_path` is set, a script path followed by its arguments
    fn exec_spec(&self, command: &[String], is_file_path: bool) -> Result<ShellCommand>;
}

/// Renders text against a rendering context
pub trait Renderer: Send + Sync {
    fn name(&self) -> &str;

    fn render(&self, rc: &RenderingContext, input: &str) -> Result<String>;
}

/// A fully resolved process invocation
#[derive(Debug, Clone, Default)]
pub struct ProcessRequest {
    pub command: Vec<String>,
    /// Variables set on top of the inherited process environment
    pub env: HashMap<String, String>,
    pub chdir: Option<PathBuf>,
    pub stdin: Option<Vec<u8>>,
    /// Output prefix of the invoking context
    pub label: String,
    /// Output color of the invoking context
    pub color: Option<u8>,
}

/// Result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Runs a command with the given env/dir/streams and waits for it
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    /// Returns `TasklaneError::Cancelled` when `cancel` fires first
    async fn execute(
        &self,
        request: ProcessRequest,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput>;
}
