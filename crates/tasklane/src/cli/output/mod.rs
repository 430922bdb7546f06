//! Output formatting utilities

use console::{style, Color, Style};

use tasklane_tasks::{TaskEvent, TaskReporter};

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Create a styled header
pub fn header(text: &str) -> String {
    style(text).bold().to_string()
}

/// Style for an output label with an assigned ANSI color index
pub fn label_style(color: Option<u8>) -> Style {
    match color {
        Some(index) => Style::new().fg(Color::Color256(index)),
        None => Style::new().dim(),
    }
}

/// Console reporter with live, prefixed output
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::TaskStarted { task, entries } => {
                println!(
                    "{} {} {}",
                    style("→").blue(),
                    style(task).bold(),
                    style(format!(
                        "({} matrix entr{})",
                        entries,
                        if *entries == 1 { "y" } else { "ies" }
                    ))
                    .dim()
                );
            }
            TaskEvent::StageStarted { task, stage, steps } => {
                if self.verbose {
                    println!(
                        "  {} {} {} ({} steps)",
                        style("─").dim(),
                        task,
                        style(stage).cyan(),
                        steps
                    );
                }
            }
            TaskEvent::EntryStarted { task, entry } => {
                println!("  {} {} {}", style("▸").dim(), style(task).bold(), entry);
            }
            TaskEvent::StepStarted { label, command } => {
                if self.verbose {
                    println!("    {}{}", style(label).dim(), style(format!("$ {command}")).dim());
                }
            }
            TaskEvent::Output {
                label,
                line,
                is_stderr,
                color,
            } => {
                let prefix = label_style(*color).apply_to(label);
                if *is_stderr {
                    eprintln!("{prefix}{line}");
                } else {
                    println!("{prefix}{line}");
                }
            }
            TaskEvent::EntryCompleted {
                task,
                entry,
                duration,
            } => {
                println!(
                    "  {} {} {} {}",
                    style("✓").green(),
                    style(task).green(),
                    entry,
                    style(format!("{:.1}s", duration.as_secs_f64())).dim()
                );
            }
            TaskEvent::EntryFailed {
                task,
                entry,
                duration,
                error,
            } => {
                println!(
                    "  {} {} {} {} {}",
                    style("✗").red(),
                    style(task).red(),
                    entry,
                    style(format!("{:.1}s", duration.as_secs_f64())).dim(),
                    style(error).red().dim()
                );
            }
            TaskEvent::EntrySkipped {
                task,
                entry,
                reason,
            } => {
                println!(
                    "  {} {} {} {}",
                    style("○").yellow(),
                    style(task).yellow(),
                    entry,
                    style(format!("({reason})")).dim()
                );
            }
            TaskEvent::TaskCompleted {
                task,
                total,
                succeeded,
                failed,
                canceled,
                duration,
            } => {
                println!(
                    "{} {} {}/{} succeeded, {} failed, {} canceled ({:.1}s)",
                    if *failed == 0 && *canceled == 0 {
                        style("✓").green().bold()
                    } else {
                        style("✗").red().bold()
                    },
                    task,
                    succeeded,
                    total,
                    failed,
                    canceled,
                    duration.as_secs_f64()
                );
            }
        }
    }
}
