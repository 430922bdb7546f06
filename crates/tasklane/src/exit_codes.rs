//! Exit codes for the CLI

use tasklane_core::TasklaneError;

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const FAILURE: i32 = 1;

/// Interrupted (Ctrl-C)
pub const INTERRUPTED: i32 = 130;

/// Exit code for a failed command.
///
/// A failed child process passes its own exit code through; a cancelled run
/// exits with [`INTERRUPTED`].
pub fn for_error(err: &anyhow::Error) -> i32 {
    let Some(err) = err.downcast_ref::<TasklaneError>() else {
        return FAILURE;
    };
    if err.is_cancelled() {
        return INTERRUPTED;
    }
    match err.exit_code() {
        Some(code) if code != SUCCESS => code,
        _ => FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasklane_core::error::{ExecError, TaskError};

    #[test]
    fn test_process_exit_code_passes_through() {
        let err = anyhow::Error::from(TasklaneError::from(TaskError::Failed {
            task: "workflow:run:build".to_string(),
            failed: 1,
            total: 1,
            source: Some(Box::new(
                ExecError::ExitStatus {
                    command: "make".to_string(),
                    code: Some(2),
                }
                .into(),
            )),
        }));
        assert_eq!(for_error(&err), 2);
    }

    #[test]
    fn test_cancelled_run_is_interrupted() {
        let err = anyhow::Error::from(TasklaneError::from(TaskError::Failed {
            task: "workflow:run:build".to_string(),
            failed: 0,
            total: 3,
            source: Some(Box::new(TasklaneError::Cancelled)),
        }));
        assert_eq!(for_error(&err), INTERRUPTED);
    }

    #[test]
    fn test_other_errors_are_generic_failures() {
        assert_eq!(for_error(&anyhow::anyhow!("boom")), FAILURE);
        let signal = anyhow::Error::from(TasklaneError::from(ExecError::ExitStatus {
            command: "sleep".to_string(),
            code: None,
        }));
        assert_eq!(for_error(&signal), FAILURE);
    }
}
