//! Run command - run one task across its matrix

use std::path::Path;
use std::sync::Arc;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tasklane_core::{
    parse_task_reference, Context, MatrixFilter, RunOptions, TaskReference,
};
use tasklane_tasks::{TaskReporter, TokioProcessExecutor, TracingReporter};

use crate::cli::output::ConsoleReporter;
use crate::cli::workspace::Workspace;
use crate::cli::Cli;

/// Run a task across its matrix
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Maximum concurrent matrix entries (default: config `workers`)
    #[arg(short = 'j', long = "workers")]
    pub workers: Option<usize>,

    /// Cancel pending entries on the first failure (default: config `fail_fast`)
    #[arg(long, value_name = "BOOL", action = clap::ArgAction::Set)]
    pub fail_fast: Option<bool>,

    /// Only run matrix entries with axis=value (can be repeated; narrows the
    /// reference's own filter)
    #[arg(short, long = "matrix", value_name = "AXIS=VALUE")]
    pub matrix: Vec<String>,

    /// A task reference (`workflow:run(build)`), or
    /// `<tool-kind> [<tool-name>] <task-kind> <task-name>`
    #[arg(required = true, num_args = 1..=4)]
    pub args: Vec<String>,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        self.run_in(&cwd, cli).await
    }

    async fn run_in(&self, cwd: &Path, cli: &Cli) -> anyhow::Result<()> {
        let reference = self.reference()?;
        let filter = self.matrix_filter(&reference)?;

        let reporter: Arc<dyn TaskReporter> = if cli.quiet {
            Arc::new(TracingReporter)
        } else {
            Arc::new(ConsoleReporter::new(cli.verbose))
        };

        let workspace = Workspace::load(cwd, cli.config.as_deref(), reporter.clone())?;

        let color_output = cli.color_enabled(workspace.config.color);
        console::set_colors_enabled(color_output);

        let workers = self.workers.unwrap_or(workspace.config.workers);
        if workers == 0 {
            anyhow::bail!("--workers must be at least 1");
        }
        let options = RunOptions {
            workers,
            fail_fast: self.fail_fast.unwrap_or(workspace.config.fail_fast),
            color_output,
            work_dir: Some(cwd.to_path_buf()),
            cache_dir: workspace.cache_dir(),
        };

        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling run");
                interrupt.cancel();
            }
        });

        let executor = Arc::new(TokioProcessExecutor::new(reporter));
        let mut ctx = Context::with_cancellation(
            Arc::clone(&workspace.registries),
            executor,
            options,
            cancel,
        )
        .with_rendering(workspace.rendering());
        ctx.set_matrix_filter(filter);

        info!(reference = %reference, "run requested");
        ctx.run_task(&reference.tool_key(), &reference.task_key())
            .await?;
        Ok(())
    }

    /// The reference's filter narrowed by the `-m` flags
    fn matrix_filter(&self, reference: &TaskReference) -> anyhow::Result<MatrixFilter> {
        let mut filter = reference.matrix_filter.clone();
        filter.narrow(MatrixFilter::from_args(&self.matrix)?);
        Ok(filter)
    }

    /// Build the task reference from the positional arguments
    fn reference(&self) -> anyhow::Result<TaskReference> {
        let reference = match self.args.as_slice() {
            [reference] => parse_task_reference(reference, "")?,
            [tool_kind, task_kind, task_name] => TaskReference {
                tool_kind: tool_kind.as_str().into(),
                task_kind: task_kind.as_str().into(),
                task_name: task_name.as_str().into(),
                ..Default::default()
            },
            [tool_kind, tool_name, task_kind, task_name] => TaskReference {
                tool_kind: tool_kind.as_str().into(),
                tool_name: tool_name.as_str().into(),
                task_kind: task_kind.as_str().into(),
                task_name: task_name.as_str().into(),
                ..Default::default()
            },
            args => anyhow::bail!(
                "expected a task reference or 3-4 task arguments, got {} arguments",
                args.len()
            ),
        };
        Ok(reference)
    }
}
