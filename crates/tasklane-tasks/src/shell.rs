//! Built-in shells

use std::collections::HashMap;
use std::sync::Arc;

use tasklane_core::config::raw_str;
use tasklane_core::{Result, Shell, ShellCommand};

/// The platform shell: `sh -c` on unix, `cmd /C` on windows
#[derive(Debug, Clone)]
pub struct SystemShell {
    name: String,
}

impl SystemShell {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for SystemShell {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl Shell for SystemShell {
    fn name(&self) -> &str {
        &self.name
    }

    fn exec_spec(&self, command: &[String], is_file_path: bool) -> Result<ShellCommand> {
        let (program, flag) = if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        Ok(ShellCommand {
            env: HashMap::new(),
            command: build(program, flag, command, is_file_path),
        })
    }
}

/// A POSIX-style shell invoked by program name (`bash`, `zsh`, ...)
#[derive(Debug, Clone)]
pub struct PosixShell {
    name: String,
    program: String,
}

impl PosixShell {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
        }
    }

    /// Build from a shell config entry; `program` defaults to the name
    pub fn from_config(name: &str, raw: &serde_yaml::Value) -> Self {
        let program = raw_str(raw, "program")
            .filter(|p| !p.is_empty())
            .unwrap_or(name);
        Self::new(name, program)
    }
}

impl Shell for PosixShell {
    fn name(&self) -> &str {
        &self.name
    }

    fn exec_spec(&self, command: &[String], is_file_path: bool) -> Result<ShellCommand> {
        Ok(ShellCommand {
            env: HashMap::new(),
            command: build(&self.program, "-c", command, is_file_path),
        })
    }
}

fn build(program: &str, flag: &str, command: &[String], is_file_path: bool) -> Vec<String> {
    let mut out = vec![program.to_string()];
    if is_file_path {
        out.extend(command.iter().cloned());
    } else {
        out.push(flag.to_string());
        out.push(command.join(" "));
    }
    out
}

/// Shells registered when no shell is configured
pub fn builtin_shells() -> Vec<Arc<dyn Shell>> {
    vec![Arc::new(SystemShell::default())]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_posix_inline_command() {
        let shell = PosixShell::new("bash", "bash");
        let spec = shell.exec_spec(&args(&["echo", "hi"]), false).unwrap();
        assert_eq!(spec.command, args(&["bash", "-c", "echo hi"]));
        assert!(spec.env.is_empty());
    }

    #[test]
    fn test_posix_file_path() {
        let shell = PosixShell::new("bash", "/bin/bash");
        let spec = shell
            .exec_spec(&args(&["./scripts/build.sh", "release"]), true)
            .unwrap();
        assert_eq!(
            spec.command,
            args(&["/bin/bash", "./scripts/build.sh", "release"])
        );
    }

    #[test]
    fn test_posix_from_config() {
        let raw: serde_yaml::Value = serde_yaml::from_str("name: b\nprogram: /usr/bin/bash").unwrap();
        let shell = PosixShell::from_config("b", &raw);
        assert_eq!(shell.name(), "b");
        let spec = shell.exec_spec(&args(&["true"]), false).unwrap();
        assert_eq!(spec.command[0], "/usr/bin/bash");

        let shell = PosixShell::from_config("zsh", &serde_yaml::Value::Null);
        let spec = shell.exec_spec(&args(&["true"]), false).unwrap();
        assert_eq!(spec.command[0], "zsh");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_shell() {
        let shell = SystemShell::default();
        assert_eq!(shell.name(), "sh");
        let spec = shell.exec_spec(&args(&["echo $HOME"]), false).unwrap();
        assert_eq!(spec.command, args(&["sh", "-c", "echo $HOME"]));
    }
}
