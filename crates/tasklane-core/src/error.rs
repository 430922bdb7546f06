//! Error types for Tasklane

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using TasklaneError
pub type Result<T> = std::result::Result<T, TasklaneError>;

/// Main error type for Tasklane operations
#[derive(Debug, Error)]
pub enum TasklaneError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Registry lookup errors
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// Reference, filter and flag parsing errors
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Errors raised while running a single exec spec
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Errors raised by a task run as a whole
    #[error(transparent)]
    Task(#[from] TaskError),

    /// The run lifetime was cancelled before or while the work ran
    #[error("Operation cancelled")]
    Cancelled,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Lookup errors, surfaced immediately and never retried
#[derive(Debug, Error)]
pub enum LookupError {
    /// No tool registered under the key
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// No task registered under the key for the tool
    #[error("Task not found: {task} (tool {tool})")]
    TaskNotFound { tool: String, task: String },

    /// No shell registered under the name
    #[error("Shell not found: {0}")]
    ShellNotFound(String),

    /// No renderer registered under the name
    #[error("Renderer not found: {0}")]
    RendererNotFound(String),

    /// No factory pattern matched the config key
    #[error("No {capability} factory matches '{key}'")]
    FactoryNotFound { capability: String, key: String },
}

/// Parse errors
#[derive(Debug, Error)]
pub enum ParseError {
    /// Reference has no `(`
    #[error("Missing task call in reference '{0}'")]
    MissingTaskCall(String),

    /// Reference prefix does not have two or three segments
    #[error("Invalid task reference prefix '{input}': expected 2 or 3 ':'-separated segments, got {segments}")]
    InvalidPrefix { input: String, segments: usize },

    /// Task call is not closed properly
    #[error("Unbalanced parentheses in task reference '{0}'")]
    UnbalancedParens(String),

    /// Task call body has no task name
    #[error("Missing task name in reference '{0}'")]
    MissingTaskName(String),

    /// Matrix filter is not a mapping of axis to values
    #[error("Invalid matrix filter '{input}': {reason}")]
    InvalidMatrixFilter { input: String, reason: String },

    /// `-m` flag is not `axis=value`
    #[error("Invalid matrix argument '{0}': expected <axis>=<value>")]
    InvalidMatrixArg(String),

    /// Unknown lifecycle stage name
    #[error("Unknown task exec stage '{0}'")]
    UnknownStage(String),
}

/// Errors raised by a single exec spec
#[derive(Debug, Error)]
pub enum ExecError {
    /// The resolved command line is empty
    #[error("Empty command")]
    EmptyCommand,

    /// Process could not be started
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Process exited unsuccessfully
    #[error("Command '{command}' exited with {}", code.map(|c| format!("code {c}")).unwrap_or_else(|| "a signal".to_string()))]
    ExitStatus { command: String, code: Option<i32> },

    /// A replace fix-up function rejected the captured output
    #[error("Failed to prepare replace value '{name}': {reason}")]
    Replace { name: String, reason: String },

    /// An alter function failed
    #[error("Failed to alter exec spec: {0}")]
    Alter(String),
}

/// Errors raised by a task run as a whole
#[derive(Debug, Error)]
pub enum TaskError {
    /// One or more matrix entries (or hook stages) failed
    #[error("Task {task} failed: {failed}/{total} matrix entries failed")]
    Failed {
        task: String,
        failed: usize,
        total: usize,
        #[source]
        source: Option<Box<TasklaneError>>,
    },

    /// A lifecycle hook stage failed
    #[error("Hook stage '{stage}' of task {task} failed: {source}")]
    HookFailed {
        task: String,
        stage: String,
        #[source]
        source: Box<TasklaneError>,
    },
}

impl TasklaneError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error (or the error it wraps) is a cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Task(TaskError::HookFailed { source, .. }) => source.is_cancelled(),
            Self::Task(TaskError::Failed {
                source: Some(source),
                ..
            }) => source.is_cancelled(),
            _ => false,
        }
    }

    /// Exit code of the spawned process at the root of this error, if any
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exec(ExecError::ExitStatus { code, .. }) => *code,
            Self::Task(TaskError::HookFailed { source, .. }) => source.exit_code(),
            Self::Task(TaskError::Failed {
                source: Some(source),
                ..
            }) => source.exit_code(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_through_wrappers() {
        let err = TasklaneError::from(TaskError::Failed {
            task: "workflow:run".to_string(),
            failed: 1,
            total: 2,
            source: Some(Box::new(TasklaneError::from(TaskError::HookFailed {
                task: "workflow:run".to_string(),
                stage: "before".to_string(),
                source: Box::new(
                    ExecError::ExitStatus {
                        command: "false".to_string(),
                        code: Some(3),
                    }
                    .into(),
                ),
            }))),
        });

        assert_eq!(err.exit_code(), Some(3));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_is_distinguished() {
        let err = TasklaneError::from(TaskError::HookFailed {
            task: "workflow:run".to_string(),
            stage: "after".to_string(),
            source: Box::new(TasklaneError::Cancelled),
        });
        assert!(err.is_cancelled());
        assert_eq!(err.exit_code(), None);
    }

    #[test]
    fn test_lookup_error_message() {
        let err = TasklaneError::from(LookupError::ToolNotFound("golang:".to_string()));
        assert_eq!(err.to_string(), "Tool not found: golang:");
    }

    #[test]
    fn test_exit_status_message() {
        let err = ExecError::ExitStatus {
            command: "make".to_string(),
            code: None,
        };
        assert_eq!(err.to_string(), "Command 'make' exited with a signal");
    }
}
