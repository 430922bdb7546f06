//! Tasklane Core - Core types, registries and execution context
//!
//! This crate provides:
//! - Tool/task keys and the task reference parser
//! - Matrix expansion and filtering
//! - Exec specs and the lifecycle stage model
//! - Frozen registries and factory-driven config resolution
//! - The execution [`Context`] with hierarchical cancellation

pub mod config;
pub mod context;
pub mod error;
pub mod exec;
pub mod matrix;
pub mod reference;
pub mod registry;
pub mod rendering;
pub mod traits;
pub mod types;

pub use config::Config;
pub use context::{Context, ExecState, RunOptions};
pub use error::{Result, TasklaneError};
pub use exec::{
    AlterExec, AlterStreams, HookSpec, ReplaceMap, TaskExecSpec, TaskExecStage, TaskExecState,
    TaskMatrixExecOptions,
};
pub use matrix::{MatrixEntry, MatrixFilter, MatrixSpec};
pub use reference::{parse_task_reference, TaskReference};
pub use registry::{FactoryRegistry, Registries, RegistryBuilder};
pub use rendering::RenderingContext;
pub use traits::{
    ProcessExecutor, ProcessOutput, ProcessRequest, Renderer, Shell, ShellCommand, Task, Tool,
};
pub use types::{TaskKey, TaskKind, TaskName, ToolKey, ToolKind, ToolName};
