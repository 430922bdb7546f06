//! CLI definition and command handling

pub mod commands;
pub mod output;
mod workspace;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use tasklane_core::config::ColorMode;

use commands::{ListCommand, RunCommand, StagesCommand};

/// Tasklane - run tasks across a matrix with lifecycle hooks
#[derive(Debug, Parser)]
#[command(name = "tasklane")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Config file (default: search upwards for tasklane.yaml)
    #[arg(short, long, global = true, env = "TASKLANE_CONFIG")]
    pub config: Option<PathBuf>,

    /// When to color output (overrides the config file)
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorArg>,

    #[command(subcommand)]
    pub command: Commands,
}

/// `--color` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ColorArg {
    Auto,
    Always,
    Never,
}

impl From<ColorArg> for ColorMode {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => ColorMode::Auto,
            ColorArg::Always => ColorMode::Always,
            ColorArg::Never => ColorMode::Never,
        }
    }
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a task across its matrix
    Run(RunCommand),

    /// List configured tools and tasks
    List(ListCommand),

    /// Print lifecycle stage names in execution order
    Stages(StagesCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(&self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match &self.command {
            Commands::Run(cmd) => cmd.execute(self),
            Commands::List(cmd) => cmd.execute(self),
            Commands::Stages(cmd) => cmd.execute(self),
        }
    }

    /// Resolve the effective color mode against the terminal
    pub fn color_enabled(&self, configured: ColorMode) -> bool {
        let mode = self.color.map(ColorMode::from).unwrap_or(configured);
        match mode {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => console::colors_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_flags() {
        let cli = Cli::try_parse_from([
            "tasklane", "-C", "proj", "run", "-j", "2", "--fail-fast", "false", "-m", "os=linux",
            "workflow:run(build)",
        ])
        .unwrap();
        assert_eq!(cli.directory, Some(PathBuf::from("proj")));
        let Commands::Run(run) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(run.workers, Some(2));
        assert_eq!(run.fail_fast, Some(false));
        assert_eq!(run.matrix, vec!["os=linux"]);
        assert_eq!(run.args, vec!["workflow:run(build)"]);
    }

    #[test]
    fn test_color_flag_overrides_config() {
        let cli = Cli::try_parse_from(["tasklane", "--color", "never", "stages"]).unwrap();
        assert!(!cli.color_enabled(ColorMode::Always));
        let cli = Cli::try_parse_from(["tasklane", "--color", "always", "stages"]).unwrap();
        assert!(cli.color_enabled(ColorMode::Never));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["tasklane", "-v", "-q", "stages"]).is_err());
    }
}
