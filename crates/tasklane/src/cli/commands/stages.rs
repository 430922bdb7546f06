//! Stages command

use clap::Args;
use console::style;

use tasklane_core::TaskExecStage;

use crate::cli::Cli;

/// Print lifecycle stage names in execution order
#[derive(Debug, Args)]
pub struct StagesCommand {}

impl StagesCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        for stage in TaskExecStage::all() {
            if cli.verbose {
                let scope = if stage.is_per_entry() {
                    "per matrix entry"
                } else {
                    "once per task"
                };
                println!("{:<16} {}", stage.as_str(), style(scope).dim());
            } else {
                println!("{stage}");
            }
        }
        Ok(())
    }
}
