//! CLI commands

mod list;
mod run;
mod stages;

pub use list::ListCommand;
pub use run::RunCommand;
pub use stages::StagesCommand;
