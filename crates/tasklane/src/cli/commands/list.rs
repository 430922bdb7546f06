//! List command

use std::sync::Arc;

use clap::Args;
use console::style;
use serde::Serialize;

use tasklane_core::Registries;
use tasklane_tasks::scheduler::task_label;
use tasklane_tasks::TracingReporter;

use crate::cli::output::header;
use crate::cli::workspace::Workspace;
use crate::cli::{Cli, OutputFormat};

/// List configured tools and tasks
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Output format
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct ToolListing {
    kind: String,
    name: String,
    tasks: Vec<TaskListing>,
}

#[derive(Debug, Serialize)]
struct TaskListing {
    kind: String,
    name: String,
    reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

fn listings(registries: &Registries) -> Vec<ToolListing> {
    let mut tools: Vec<ToolListing> = registries
        .tools()
        .all()
        .map(|tool| {
            let mut tasks: Vec<TaskListing> = registries
                .tasks()
                .for_tool(&tool.key())
                .iter()
                .map(|task| TaskListing {
                    kind: task.kind().to_string(),
                    name: task.name().to_string(),
                    reference: task_label(task.as_ref()),
                    description: task.description().map(str::to_string),
                })
                .collect();
            tasks.sort_by(|a, b| a.reference.cmp(&b.reference));
            ToolListing {
                kind: tool.kind().to_string(),
                name: tool.name().to_string(),
                tasks,
            }
        })
        .collect();
    tools.sort_by(|a, b| (&a.kind, &a.name).cmp(&(&b.kind, &b.name)));
    tools
}

impl ListCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let workspace = Workspace::load(&cwd, cli.config.as_deref(), Arc::new(TracingReporter))?;
        console::set_colors_enabled(cli.color_enabled(workspace.config.color));
        let tools = listings(&workspace.registries);

        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "config_path": workspace
                        .config_path
                        .as_ref()
                        .map(|p| p.to_string_lossy().to_string()),
                    "tools": tools,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                if tools.is_empty() {
                    println!("{}", style("No tools configured").yellow());
                    return Ok(());
                }
                for tool in &tools {
                    let name = if tool.name.is_empty() {
                        tool.kind.clone()
                    } else {
                        format!("{}:{}", tool.kind, tool.name)
                    };
                    println!("{}", header(&name));
                    for task in &tool.tasks {
                        match &task.description {
                            Some(description) => println!(
                                "  {}  {}",
                                style(&task.reference).cyan(),
                                style(description).dim()
                            ),
                            None => println!("  {}", style(&task.reference).cyan()),
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_listings_sorted_by_tool_and_task() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("tasklane.yaml"),
            r#"
tasks:
  workflow:run:
    - name: test
    - name: build
      description: Compile everything
    - name: deploy
      tool: prod
"#,
        )
        .unwrap();
        let workspace = Workspace::load(temp.path(), None, Arc::new(TracingReporter)).unwrap();

        let tools = listings(&workspace.registries);

        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "");
        let refs: Vec<&str> = tools[0].tasks.iter().map(|t| t.reference.as_str()).collect();
        assert_eq!(refs, vec!["workflow:run:build", "workflow:run:test"]);
        assert_eq!(tools[0].tasks[0].description.as_deref(), Some("Compile everything"));
        assert_eq!(tools[1].tasks[0].reference, "workflow:prod:run:deploy");
    }
}
