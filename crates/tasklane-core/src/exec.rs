//! Exec model - steps, lifecycle stages and run states
//!
//! A task turns each matrix entry into an ordered list of [`TaskExecSpec`]s and
//! may attach hooks at every [`TaskExecStage`]:
//! - before: Before anything else
//! - before:matrix: Before the first matrix entry
//! - after:matrix:success: After a matrix entry succeeded
//! - after:matrix:failure: After a matrix entry failed
//! - after:matrix: After all matrix entries finished
//! - after:success: After the whole run succeeded
//! - after:failure: After the whole run failed
//! - after: Always, last

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{ParseError, Result};
use crate::matrix::MatrixEntry;
use crate::reference::{parse_task_reference, TaskReference};

/// Lifecycle position of a task run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskExecStage {
    Before,
    BeforeMatrix,
    AfterMatrixSuccess,
    AfterMatrixFailure,
    AfterMatrix,
    AfterSuccess,
    AfterFailure,
    After,
}

impl TaskExecStage {
    /// Get the stage name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::BeforeMatrix => "before:matrix",
            Self::AfterMatrixSuccess => "after:matrix:success",
            Self::AfterMatrixFailure => "after:matrix:failure",
            Self::AfterMatrix => "after:matrix",
            Self::AfterSuccess => "after:success",
            Self::AfterFailure => "after:failure",
            Self::After => "after",
        }
    }

    /// Parse stage from string
    pub fn parse(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| ParseError::UnknownStage(s.to_string()).into())
    }

    /// Get all stages in order
    pub fn all() -> &'static [TaskExecStage] {
        &[
            Self::Before,
            Self::BeforeMatrix,
            Self::AfterMatrixSuccess,
            Self::AfterMatrixFailure,
            Self::AfterMatrix,
            Self::AfterSuccess,
            Self::AfterFailure,
            Self::After,
        ]
    }

    /// Whether this stage runs once per matrix entry
    pub fn is_per_entry(&self) -> bool {
        matches!(self, Self::AfterMatrixSuccess | Self::AfterMatrixFailure)
    }
}

impl fmt::Display for TaskExecStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable run status of one task invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TaskExecState {
    #[default]
    Pending,
    NotStarted,
    Working,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskExecState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Replace values captured from earlier steps, keyed by placeholder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceMap(BTreeMap<String, Vec<u8>>);

impl ReplaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Substitute every known placeholder in every argument
    pub fn apply(&self, command: &[String]) -> Vec<String> {
        command
            .iter()
            .map(|arg| {
                self.0.iter().fold(arg.clone(), |acc, (key, value)| {
                    if acc.contains(key.as_str()) {
                        acc.replace(key.as_str(), &String::from_utf8_lossy(value))
                    } else {
                        acc
                    }
                })
            })
            .collect()
    }
}

/// Transforms captured output before it becomes a replace value
pub type FixReplaceFn = Arc<dyn Fn(Vec<u8>) -> Result<Vec<u8>> + Send + Sync>;

/// Decides at runtime what a step actually runs
pub type AlterExecFn =
    Arc<dyn Fn(&ReplaceMap, &mut AlterStreams<'_>) -> Result<AlterExec> + Send + Sync>;

/// Streams handed to an alter function
pub struct AlterStreams<'a> {
    pub stdin: Option<&'a [u8]>,
    pub stdout: &'a mut (dyn Write + Send),
    pub stderr: &'a mut (dyn Write + Send),
}

/// What an alter function wants to run instead of the original command
pub enum AlterExec {
    /// Nothing runs for this step
    Skip,
    /// Run this command line in place of the spec's command
    Command(Vec<String>),
    /// Run these specs in place of the rest of the list
    Specs(Vec<TaskExecSpec>),
}

impl fmt::Debug for AlterExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => f.write_str("Skip"),
            Self::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            Self::Specs(specs) => f.debug_tuple("Specs").field(&specs.len()).finish(),
        }
    }
}

/// One executable step plus control metadata
#[derive(Clone, Default)]
pub struct TaskExecSpec {
    /// Command line to run
    pub command: Vec<String>,
    /// Working directory override
    pub chdir: Option<PathBuf>,
    /// Applied only where the variable is not already set
    pub env_suggest: HashMap<String, String>,
    /// Always applied
    pub env_override: HashMap<String, String>,
    /// Data written to the process stdin
    pub stdin: Option<Vec<u8>>,
    /// A failure does not abort the remaining steps
    pub ignore_error: bool,
    /// Route the command through a registered shell
    pub use_shell: bool,
    /// Shell to route through; empty means the default shell
    pub shell_name: Option<String>,
    /// Captured stdout becomes this replace key
    pub stdout_as_replace: Option<String>,
    pub fix_stdout_for_replace: Option<FixReplaceFn>,
    /// Captured stderr becomes this replace key
    pub stderr_as_replace: Option<String>,
    pub fix_stderr_for_replace: Option<FixReplaceFn>,
    /// Runtime override of what this step runs
    pub alter_exec: Option<AlterExecFn>,
}

impl fmt::Debug for TaskExecSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskExecSpec")
            .field("command", &self.command)
            .field("chdir", &self.chdir)
            .field("env_suggest", &self.env_suggest)
            .field("env_override", &self.env_override)
            .field("ignore_error", &self.ignore_error)
            .field("use_shell", &self.use_shell)
            .field("shell_name", &self.shell_name)
            .field("stdout_as_replace", &self.stdout_as_replace)
            .field("stderr_as_replace", &self.stderr_as_replace)
            .field("alter_exec", &self.alter_exec.is_some())
            .finish()
    }
}

impl TaskExecSpec {
    /// Create a new spec running a command directly
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Create a new spec running a script through a shell
    pub fn shell(script: impl Into<String>, shell_name: Option<String>) -> Self {
        Self {
            command: vec![script.into()],
            use_shell: true,
            shell_name,
            ..Default::default()
        }
    }

    /// Set the working directory
    pub fn with_chdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.chdir = Some(dir.into());
        self
    }

    /// Suggest an environment variable
    pub fn with_env_suggest(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_suggest.insert(key.into(), value.into());
        self
    }

    /// Force an environment variable
    pub fn with_env_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_override.insert(key.into(), value.into());
        self
    }

    pub fn with_stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn with_ignore_error(mut self, ignore: bool) -> Self {
        self.ignore_error = ignore;
        self
    }

    /// Capture stdout as a replace value
    pub fn with_stdout_as_replace(mut self, key: impl Into<String>) -> Self {
        self.stdout_as_replace = Some(key.into());
        self
    }

    pub fn with_fix_stdout<F>(mut self, fix: F) -> Self
    where
        F: Fn(Vec<u8>) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.fix_stdout_for_replace = Some(Arc::new(fix));
        self
    }

    /// Capture stderr as a replace value
    pub fn with_stderr_as_replace(mut self, key: impl Into<String>) -> Self {
        self.stderr_as_replace = Some(key.into());
        self
    }

    pub fn with_fix_stderr<F>(mut self, fix: F) -> Self
    where
        F: Fn(Vec<u8>) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.fix_stderr_for_replace = Some(Arc::new(fix));
        self
    }

    pub fn with_alter_exec<F>(mut self, alter: F) -> Self
    where
        F: Fn(&ReplaceMap, &mut AlterStreams<'_>) -> Result<AlterExec> + Send + Sync + 'static,
    {
        self.alter_exec = Some(Arc::new(alter));
        self
    }

    /// Command line for display purposes
    pub fn display_command(&self) -> String {
        self.command.join(" ")
    }
}

/// A hook step: either a raw exec spec or a call into another task
#[derive(Debug, Clone)]
pub enum HookSpec {
    Exec(TaskExecSpec),
    TaskCall(TaskReference),
}

impl HookSpec {
    /// Parse a task call, defaulting the tool name to the current tool's
    pub fn task_call(reference: &str, default_tool_name: &str) -> Result<Self> {
        parse_task_reference(reference, default_tool_name).map(Self::TaskCall)
    }
}

impl From<TaskExecSpec> for HookSpec {
    fn from(spec: TaskExecSpec) -> Self {
        Self::Exec(spec)
    }
}

/// Per-entry options handed to `Task::exec_specs`
#[derive(Debug, Clone, Default)]
pub struct TaskMatrixExecOptions {
    /// Position of the entry in the enumeration (0-based)
    pub seq: usize,
    /// Number of surviving entries
    pub total: usize,
    /// The entry itself
    pub entry: MatrixEntry,
    /// Whether steps should default to the shell
    pub use_shell: bool,
    /// Default shell name
    pub shell_name: Option<String>,
    /// Working directory of the run
    pub work_dir: Option<PathBuf>,
}

impl TaskMatrixExecOptions {
    pub fn new(seq: usize, total: usize, entry: MatrixEntry) -> Self {
        Self {
            seq,
            total,
            entry,
            ..Default::default()
        }
    }

    pub fn is_first(&self) -> bool {
        self.seq == 0
    }

    pub fn is_last(&self) -> bool {
        self.seq + 1 == self.total
    }

    /// Stable id of the entry within the run, e.g. `#2 [os: linux]`
    pub fn id(&self) -> String {
        format!("#{} {}", self.seq + 1, self.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_roundtrip() {
        for stage in TaskExecStage::all() {
            let parsed = TaskExecStage::parse(stage.as_str()).unwrap();
            assert_eq!(parsed, *stage);
        }
        assert!(TaskExecStage::parse("pre-build").is_err());
    }

    #[test]
    fn test_stage_order() {
        let all = TaskExecStage::all();
        assert_eq!(all.len(), 8);
        assert!(all.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(all[0], TaskExecStage::Before);
        assert_eq!(all[7], TaskExecStage::After);
    }

    #[test]
    fn test_replace_map_apply() {
        let mut replace = ReplaceMap::new();
        replace.insert("<DIGEST>", b"sha256:abc".to_vec());
        replace.insert("<TAG>", b"v1".to_vec());

        let cmd = replace.apply(&[
            "push".to_string(),
            "img:<TAG>@<DIGEST>".to_string(),
            "plain".to_string(),
        ]);
        assert_eq!(cmd, vec!["push", "img:v1@sha256:abc", "plain"]);
    }

    #[test]
    fn test_spec_builder() {
        let spec = TaskExecSpec::new(["go", "build"])
            .with_chdir("/src")
            .with_env_suggest("GOOS", "linux")
            .with_env_override("CGO_ENABLED", "0")
            .with_ignore_error(true)
            .with_stdout_as_replace("<OUT>");

        assert_eq!(spec.display_command(), "go build");
        assert_eq!(spec.chdir, Some(PathBuf::from("/src")));
        assert_eq!(spec.env_suggest.get("GOOS"), Some(&"linux".to_string()));
        assert_eq!(spec.env_override.get("CGO_ENABLED"), Some(&"0".to_string()));
        assert!(spec.ignore_error);
        assert!(!spec.use_shell);
        assert_eq!(spec.stdout_as_replace.as_deref(), Some("<OUT>"));
    }

    #[test]
    fn test_shell_spec() {
        let spec = TaskExecSpec::shell("echo hi", None);
        assert!(spec.use_shell);
        assert_eq!(spec.command, vec!["echo hi"]);
    }

    #[test]
    fn test_hook_task_call() {
        match HookSpec::task_call("workflow:run(notify)", "ci").unwrap() {
            HookSpec::TaskCall(r) => {
                assert_eq!(r.tool_name.as_str(), "ci");
                assert_eq!(r.task_name.as_str(), "notify");
            }
            HookSpec::Exec(_) => panic!("expected task call"),
        }
    }

    #[test]
    fn test_matrix_exec_options() {
        let opts = TaskMatrixExecOptions::new(1, 2, MatrixEntry::new().with("os", "linux"));
        assert!(!opts.is_first());
        assert!(opts.is_last());
        assert_eq!(opts.id(), "#2 [os: linux]");
    }
}
