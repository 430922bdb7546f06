//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::exec::TaskExecStage;

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!(
        tools = config.tools.len(),
        task_groups = config.tasks.len(),
        shells = config.shells.len(),
        "validating config"
    );
    validate_workers(config)?;
    validate_shells(config)?;
    validate_tools(config)?;
    validate_tasks(config)?;
    debug!("config validation passed");
    Ok(())
}

fn validate_workers(config: &Config) -> Result<()> {
    if config.workers == 0 {
        return Err(ConfigError::InvalidValue {
            field: "workers".to_string(),
            message: "Must be at least 1".to_string(),
        }
        .into());
    }
    Ok(())
}

fn validate_shells(config: &Config) -> Result<()> {
    for (i, shell) in config.shells.iter().enumerate() {
        if shell.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("shells[{i}].name"),
                message: "Shell name cannot be empty".to_string(),
            }
            .into());
        }
    }

    let defaults: Vec<&str> = config
        .shells
        .iter()
        .filter(|s| s.default)
        .map(|s| s.name.as_str())
        .collect();
    if defaults.len() > 1 {
        return Err(ConfigError::InvalidValue {
            field: "shells".to_string(),
            message: format!("Only one default shell allowed, found: {}", defaults.join(", ")),
        }
        .into());
    }

    Ok(())
}

fn validate_tools(config: &Config) -> Result<()> {
    for (kind, tools) in &config.tools {
        if kind.trim().is_empty() || kind.contains(':') {
            return Err(ConfigError::InvalidValue {
                field: format!("tools.{kind}"),
                message: "Tool kind must be non-empty and must not contain ':'".to_string(),
            }
            .into());
        }
        for (i, raw) in tools.iter().enumerate() {
            if !raw.is_mapping() && !raw.is_null() {
                return Err(ConfigError::InvalidValue {
                    field: format!("tools.{kind}[{i}]"),
                    message: "Tool config must be a mapping".to_string(),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn validate_tasks(config: &Config) -> Result<()> {
    for (group, tasks) in &config.tasks {
        let valid = group
            .split_once(':')
            .is_some_and(|(tool, task)| !tool.is_empty() && !task.is_empty() && !task.contains(':'));
        if !valid {
            return Err(ConfigError::InvalidValue {
                field: format!("tasks.{group}"),
                message: "Task group must be '<tool-kind>:<task-kind>'".to_string(),
            }
            .into());
        }

        for (i, raw) in tasks.iter().enumerate() {
            if !raw.is_mapping() {
                return Err(ConfigError::InvalidValue {
                    field: format!("tasks.{group}[{i}]"),
                    message: "Task config must be a mapping".to_string(),
                }
                .into());
            }
            validate_hook_stages(group, i, raw)?;
        }
    }
    Ok(())
}

fn validate_hook_stages(group: &str, index: usize, raw: &serde_yaml::Value) -> Result<()> {
    let Some(hooks) = raw.get("hooks").and_then(serde_yaml::Value::as_mapping) else {
        return Ok(());
    };
    for key in hooks.keys() {
        let stage = key.as_str().unwrap_or_default();
        if TaskExecStage::parse(stage).is_err() {
            return Err(ConfigError::InvalidValue {
                field: format!("tasks.{group}[{index}].hooks"),
                message: format!("Unknown hook stage '{stage}'"),
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ShellConfig;

    fn task(name: &str) -> serde_yaml::Value {
        serde_yaml::from_str(&format!("name: {name}")).unwrap()
    }

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_workers() {
        let config = Config {
            workers: 0,
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_multiple_default_shells() {
        let mut config = Config::default();
        config.shells = vec![
            ShellConfig {
                name: "sh".to_string(),
                default: true,
                program: None,
            },
            ShellConfig {
                name: "bash".to_string(),
                default: true,
                program: None,
            },
        ];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_shell_name() {
        let mut config = Config::default();
        config.shells = vec![ShellConfig::default()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_task_group_keys() {
        let mut config = Config::default();
        config.tasks.insert("workflow:run".to_string(), vec![task("a")]);
        assert!(validate_config(&config).is_ok());

        for bad in ["workflow", ":run", "workflow:", "a:b:c"] {
            let mut config = Config::default();
            config.tasks.insert(bad.to_string(), vec![task("a")]);
            assert!(validate_config(&config).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_task_must_be_mapping() {
        let mut config = Config::default();
        config
            .tasks
            .insert("workflow:run".to_string(), vec![serde_yaml::Value::from("x")]);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_hook_stage_names() {
        let mut config = Config::default();
        let ok: serde_yaml::Value =
            serde_yaml::from_str("name: a\nhooks:\n  before: []\n  after:matrix:failure: []\n")
                .unwrap();
        config.tasks.insert("workflow:run".to_string(), vec![ok]);
        assert!(validate_config(&config).is_ok());

        let bad: serde_yaml::Value =
            serde_yaml::from_str("name: a\nhooks:\n  pre-build: []\n").unwrap();
        config.tasks.insert("workflow:run".to_string(), vec![bad]);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_tool_kind() {
        let mut config = Config::default();
        config.tools.insert("".to_string(), vec![]);
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config
            .tools
            .insert("workflow".to_string(), vec![serde_yaml::Value::Null]);
        assert!(validate_config(&config).is_ok());
    }
}
